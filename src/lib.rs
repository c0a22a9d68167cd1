//! User-space editing of single-group ext2 disk images.
//!
//! [`ext2`] holds the on-disk layer (block access, allocation, directory
//! entries, path lookup), [`commands`] the `cp`/`ln`/`ls`/`mkdir`/`rm`
//! handlers built on it, and [`mkfs`] a formatter for fresh images.

pub mod cli;
pub mod commands;
pub mod ext2;
pub mod logger;
pub mod mkfs;

pub use commands::{CommandError, CommandResult};
pub use ext2::{Ext2Error, Ext2Fs};
