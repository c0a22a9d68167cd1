//! ext2_mkdir - create a directory inside an ext2 image

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miku_ext2::{cli, commands, logger};

#[derive(Parser)]
#[command(name = "ext2_mkdir")]
#[command(about = "Create a directory inside an ext2 disk image")]
struct Args {
    /// ext2 disk image
    image: PathBuf,

    /// Absolute path of the new directory
    path: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init();
    cli::run("ext2_mkdir", &args.image, |fs| {
        commands::mkdir(fs, &args.path).map(|_| ())
    })
}
