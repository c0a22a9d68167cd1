//! ext2_ls - list a path inside an ext2 image

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miku_ext2::{cli, commands, logger};

#[derive(Parser)]
#[command(name = "ext2_ls")]
#[command(about = "List a file or directory inside an ext2 disk image")]
struct Args {
    /// Include `.` and `..`
    #[arg(short = 'a')]
    all: bool,

    /// ext2 disk image
    image: PathBuf,

    /// Absolute path inside the image
    path: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init();
    cli::inspect("ext2_ls", &args.image, |fs| {
        for name in commands::ls(fs, &args.path, args.all)? {
            println!("{}", name);
        }
        Ok(())
    })
}
