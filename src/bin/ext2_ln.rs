//! ext2_ln - create a hard or symbolic link inside an ext2 image

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miku_ext2::{cli, commands, logger};

#[derive(Parser)]
#[command(name = "ext2_ln")]
#[command(about = "Link two paths inside an ext2 disk image")]
struct Args {
    /// Make a symbolic link instead of a hard link
    #[arg(short = 's')]
    symbolic: bool,

    /// ext2 disk image
    image: PathBuf,

    /// Existing file the link points at
    source: String,

    /// Path of the new link
    dest: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init();
    cli::run("ext2_ln", &args.image, |fs| {
        commands::ln(fs, &args.source, &args.dest, args.symbolic).map(|_| ())
    })
}
