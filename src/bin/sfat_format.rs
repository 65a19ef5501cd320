//! `sfat-format`: the standalone formatter tool (spec.md §6).
//!
//! Produces a valid initial SFAT image on a block device: sector size 512,
//! 4 sectors per cluster, 10 reserved sectors, 2 FAT copies. `clusters` and
//! `fat_length` are derived from the device's size, matching the original
//! `myfat/app/format.cpp` (see SPEC_FULL.md §3).

use clap::Parser;
use simplefat::block::{BlockDevice, FileDevice};
use simplefat::format;

const SECTOR_SIZE: u16 = 512;
const SEC_PER_CLUS: u8 = 4;
const RESERVED: u16 = 10;
const FATS: u8 = 2;

/// Format a block device as an SFAT volume.
#[derive(Parser, Debug)]
#[command(name = "sfat-format", about = "Format a block device as an SFAT volume")]
struct Args {
    /// Path to the block device (or a pre-sized regular file) to format.
    #[arg(default_value = "/dev/loop1")]
    device: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args.device) {
        eprintln!("sfat-format: {}: {}", args.device, e);
        std::process::exit(1);
    }
}

fn run(device_path: &str) -> simplefat::Result<()> {
    let mut device = FileDevice::open(device_path, SECTOR_SIZE as u32)?;
    let sectors = device.block_count() as u32;

    let layout = format::plan_layout(sectors, SECTOR_SIZE, SEC_PER_CLUS, RESERVED, FATS)?;
    log::info!(
        "formatting {}: {} sectors, {} clusters, {} sectors/fat, {} fats",
        device_path,
        layout.sectors,
        layout.clusters,
        layout.fat_length,
        layout.fats,
    );

    format::format_volume(&mut device, layout)?;
    log::info!("format of {} complete", device_path);
    Ok(())
}
