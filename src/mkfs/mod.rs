pub mod format;
pub mod layout;
pub mod params;

pub use format::{mkfs, MkfsError, MkfsReport};
pub use params::MkfsParams;
