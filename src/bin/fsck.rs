use std::{fs::File, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rfs::{
    rfs::Rfs,
    storage::{Device, FileBackedStorage},
};

#[derive(Parser)]
struct Args {
    /// RFS disk image
    disk_file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let disk_file = File::options()
        .read(true)
        .open(&args.disk_file)
        .context("unable to open disk file")?;
    let storage = FileBackedStorage::new(disk_file)?;

    let mut rfs = Rfs::mount(Device::new(0, args.disk_file.display().to_string(), storage))?;
    rfs.check_filesystem()?;
    info!("{}: clean", args.disk_file.display());

    Ok(())
}
