use std::path::Path;
use std::process::ExitCode;

use crate::commands::{CommandError, CommandResult};
use crate::ext2::Ext2Fs;

/// Process exit status for an errno value.
pub fn exit_code(errno: i32) -> ExitCode {
    ExitCode::from(errno.clamp(1, 255) as u8)
}

pub fn report(prog: &str, err: &CommandError) -> ExitCode {
    eprintln!("{}: {}", prog, err);
    exit_code(err.errno())
}

fn open(image: &Path) -> Result<Ext2Fs, CommandError> {
    Ext2Fs::open(image).map_err(|e| CommandError::new(image.display().to_string(), e))
}

/// Opens `image`, runs `op` on it and writes the image back only when `op`
/// succeeded.
pub fn run<F>(prog: &str, image: &Path, op: F) -> ExitCode
where
    F: FnOnce(&mut Ext2Fs) -> CommandResult<()>,
{
    let mut fs = match open(image) {
        Ok(fs) => fs,
        Err(e) => return report(prog, &e),
    };

    if let Err(e) = op(&mut fs) {
        log::warn!("[{}] failed, image left untouched", prog);
        return report(prog, &e);
    }

    match fs.save() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(prog, &CommandError::new(image.display().to_string(), e)),
    }
}

/// Read-only variant of [`run`]; the image file is never written.
pub fn inspect<F>(prog: &str, image: &Path, op: F) -> ExitCode
where
    F: FnOnce(&Ext2Fs) -> CommandResult<()>,
{
    let fs = match open(image) {
        Ok(fs) => fs,
        Err(e) => return report(prog, &e),
    };
    match op(&fs) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(prog, &e),
    }
}
