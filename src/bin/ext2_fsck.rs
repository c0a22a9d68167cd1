//! ext2_fsck - read-only consistency check of an ext2 image

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miku_ext2::commands::CommandError;
use miku_ext2::ext2::fsck;
use miku_ext2::{cli, logger, Ext2Fs};

/// Exit status when the image has problems, as with e2fsck.
const FSCK_UNCORRECTED: u8 = 4;

#[derive(Parser)]
#[command(name = "ext2_fsck")]
#[command(about = "Check an ext2 disk image for inconsistencies")]
struct Args {
    /// ext2 disk image
    image: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init();
    let path = args.image.display().to_string();

    let report = match Ext2Fs::open(&args.image).and_then(|fs| fsck::check(&fs)) {
        Ok(report) => report,
        Err(e) => return cli::report("ext2_fsck", &CommandError::new(path, e)),
    };

    for issue in &report.issues {
        println!("{}: {}", path, issue);
    }
    println!(
        "{}: {} inodes, {} blocks, {} directories, {}",
        path,
        report.inodes_seen,
        report.blocks_seen,
        report.directories,
        if report.is_clean() { "clean" } else { "NOT clean" }
    );

    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(FSCK_UNCORRECTED)
    }
}
