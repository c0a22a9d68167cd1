pub mod cp;
pub mod ln;
pub mod ls;
pub mod mkdir;
pub mod rm;

pub use cp::cp;
pub use ln::ln;
pub use ls::ls;
pub use mkdir::mkdir;
pub use rm::rm;

use thiserror::Error;

use crate::ext2::Ext2Error;

/// A core error tagged with the path the command was working on.
#[derive(Debug, Error)]
#[error("{path}: {source}")]
pub struct CommandError {
    pub path: String,
    pub source: Ext2Error,
}

impl CommandError {
    pub fn new(path: impl Into<String>, source: Ext2Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }

    pub fn errno(&self) -> i32 {
        self.source.errno()
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

pub trait ResultExt<T> {
    fn at(self, path: &str) -> CommandResult<T>;
}

impl<T> ResultExt<T> for Result<T, Ext2Error> {
    fn at(self, path: &str) -> CommandResult<T> {
        self.map_err(|e| CommandError::new(path, e))
    }
}

/// Shorthand for a bare core error at `path`.
pub(crate) fn fail<T>(path: &str, err: Ext2Error) -> CommandResult<T> {
    Err(CommandError::new(path, err))
}
