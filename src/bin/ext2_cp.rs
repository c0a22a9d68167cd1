//! ext2_cp - copy a host file into an ext2 image
//!
//! Usage:
//!   ext2_cp disk.img ./notes.txt /docs/notes.txt
//!   ext2_cp disk.img ./notes.txt /docs          # lands at /docs/notes.txt

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miku_ext2::{cli, commands, logger};

#[derive(Parser)]
#[command(name = "ext2_cp")]
#[command(about = "Copy a host file into an ext2 disk image")]
struct Args {
    /// ext2 disk image
    image: PathBuf,

    /// File on the host
    source: PathBuf,

    /// Absolute destination path inside the image
    dest: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init();
    cli::run("ext2_cp", &args.image, |fs| {
        commands::cp(fs, &args.source, &args.dest).map(|_| ())
    })
}
