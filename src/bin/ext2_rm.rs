//! ext2_rm - remove a file or link from an ext2 image

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miku_ext2::{cli, commands, logger};

#[derive(Parser)]
#[command(name = "ext2_rm")]
#[command(about = "Remove a file or link from an ext2 disk image")]
struct Args {
    /// ext2 disk image
    image: PathBuf,

    /// Absolute path to remove
    path: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init();
    cli::run("ext2_rm", &args.image, |fs| commands::rm(fs, &args.path))
}
