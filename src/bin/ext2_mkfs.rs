//! ext2_mkfs - write a fresh single-group ext2 image
//!
//! Usage:
//!   ext2_mkfs disk.img                      # 128 blocks, 32 inodes
//!   ext2_mkfs disk.img -b 1024 -i 128 -L data

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miku_ext2::ext2::EINVAL;
use miku_ext2::mkfs::{mkfs, MkfsParams};
use miku_ext2::{cli, logger};

#[derive(Parser)]
#[command(name = "ext2_mkfs")]
#[command(about = "Create a single-group ext2 disk image")]
struct Args {
    /// Output disk image file
    image: PathBuf,

    /// Size in 1 KiB blocks
    #[arg(short, long, default_value_t = 128)]
    blocks: u32,

    /// Number of inodes (multiple of 8)
    #[arg(short, long, default_value_t = 32)]
    inodes: u32,

    /// Volume label (at most 16 bytes are kept)
    #[arg(short = 'L', long, default_value = "miku")]
    label: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logger::init();

    let params = MkfsParams::new(args.blocks, args.inodes).with_label(&args.label);
    let (image, report) = match mkfs(&params) {
        Ok(done) => done,
        Err(e) => {
            eprintln!("ext2_mkfs: {}", e);
            return cli::exit_code(EINVAL);
        }
    };

    if let Err(e) = image.save_as(&args.image) {
        eprintln!("ext2_mkfs: {}: {}", args.image.display(), e);
        return cli::exit_code(e.errno());
    }

    println!(
        "{}: {} blocks of {} bytes, {} inodes of {} bytes",
        args.image.display(),
        report.total_blocks,
        report.block_size,
        report.total_inodes,
        report.inode_size
    );
    println!(
        "  inode table: {} blocks, free: {} blocks, {} inodes",
        report.inode_table_blocks, report.free_blocks, report.free_inodes
    );
    ExitCode::SUCCESS
}
