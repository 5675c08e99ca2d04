use std::ffi::CString;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fuser::MountOption;
use log::error;

use rfs::{
    disk_format::{block::BLOCK_SIZE, inode::InodeType, layout::TOTAL_BLOCKS},
    error::{error_kind, ErrorKind},
    fuse::RfsFs,
    registry::DeviceRegistry,
    rfs::{Rfs, ROOT_INODE},
    storage::{BlockStorage, FileBackedStorage},
    vnode::{Vnode, VnodeOps, Whence},
};

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or resize a disk image and lay down an empty file system
    Format {
        /// RFS disk image
        disk_file: PathBuf,
    },
    /// Serve the file system over FUSE until unmounted
    Mount {
        /// RFS disk image
        disk_file: PathBuf,
        /// FUSE mountpoint
        mountpoint: PathBuf,
    },
    /// List a directory
    Ls {
        /// RFS disk image
        disk_file: PathBuf,
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file to stdout
    Cat {
        /// RFS disk image
        disk_file: PathBuf,
        path: String,
    },
    /// Copy a host file into a new file, or onto the end of an existing one with `--append`
    Put {
        /// RFS disk image
        disk_file: PathBuf,
        host_file: PathBuf,
        path: String,
        #[arg(long)]
        append: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    run(args.command).map_err(|err| {
        if error_kind(&err).is_some_and(ErrorKind::is_fatal) {
            error!("the file system is unusable: {err:#}");
        }
        err
    })
}

fn run(command: Command) -> Result<()> {
    let mut registry = DeviceRegistry::new();

    match command {
        Command::Format { disk_file } => {
            let file = File::options()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&disk_file)
                .context("unable to open disk file in read-write mode")?;
            file.set_len((TOTAL_BLOCKS * BLOCK_SIZE) as u64)
                .context("resizing disk file")?;

            let id = registry.register(image_name(&disk_file), FileBackedStorage::new(file)?)?;
            registry.format(id)
        }
        Command::Mount {
            disk_file,
            mountpoint,
        } => {
            let rfs = mount(&mut registry, &disk_file)?;
            let options = [MountOption::FSName("rfs".to_string())];

            fuser::mount2(RfsFs::new(rfs), mountpoint, &options).context("serving FUSE mount")
        }
        Command::Ls { disk_file, path } => {
            let mut rfs = mount(&mut registry, &disk_file)?;
            list(&mut rfs, &path)?;
            registry.unmount(rfs)
        }
        Command::Cat { disk_file, path } => {
            let mut rfs = mount(&mut registry, &disk_file)?;
            cat(&mut rfs, &path, &mut io::stdout())?;
            registry.unmount(rfs)
        }
        Command::Put {
            disk_file,
            host_file,
            path,
            append,
        } => {
            let data = std::fs::read(&host_file)
                .with_context(|| format!("reading {}", host_file.display()))?;

            let mut rfs = mount(&mut registry, &disk_file)?;
            put(&mut rfs, &path, &data, append)?;
            registry.unmount(rfs)
        }
    }
}

fn mount(
    registry: &mut DeviceRegistry<FileBackedStorage>,
    disk_file: &Path,
) -> Result<Rfs<FileBackedStorage>> {
    let file = File::options()
        .read(true)
        .write(true)
        .open(disk_file)
        .context("unable to open disk file in read-write mode")?;

    let id = registry.register(image_name(disk_file), FileBackedStorage::new(file)?)?;
    registry.mount(id)
}

fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Walks `path` from the root, one lookup per component.
fn resolve<S: BlockStorage>(rfs: &mut Rfs<S>, path: &str) -> Result<Vnode> {
    let mut vnode = rfs.vnode(ROOT_INODE)?;

    for component in path.split('/').filter(|component| !component.is_empty()) {
        let name = CString::new(component)?;
        vnode = rfs
            .lookup(&vnode, &name)?
            .ok_or(ErrorKind::NotFound)
            .with_context(|| format!("{path}: no such file or directory"))?;
    }

    Ok(vnode)
}

fn list<S: BlockStorage>(rfs: &mut Rfs<S>, path: &str) -> Result<()> {
    let dir = resolve(rfs, path)?;

    for entry in rfs.read_directory(&dir)? {
        let vnode = rfs.vnode(entry.inum as u32)?;
        let stat = rfs.stat(&vnode)?;
        let suffix = if stat.type_ == InodeType::Directory {
            "/"
        } else {
            ""
        };

        println!("{:>3} {:>6} {}{suffix}", stat.inum, stat.size, entry.name);
    }

    Ok(())
}

fn cat<S: BlockStorage>(rfs: &mut Rfs<S>, path: &str, out: &mut impl Write) -> Result<()> {
    let file = resolve(rfs, path)?;
    if file.is_dir() {
        return Err(anyhow::Error::new(ErrorKind::IsADirectory).context(format!("cat {path}")));
    }

    let mut data = vec![0; file.size];
    let mut offset = 0;
    let len = rfs.read(&file, &mut data, &mut offset)?;

    out.write_all(&data[..len])?;
    Ok(())
}

fn put<S: BlockStorage>(rfs: &mut Rfs<S>, path: &str, data: &[u8], append: bool) -> Result<()> {
    let (parent_path, name) = path.rsplit_once('/').unwrap_or(("", path));
    let name = CString::new(name)?;

    let mut parent = resolve(rfs, parent_path)?;
    let mut file = match rfs.lookup(&parent, &name)? {
        Some(file) if append => file,
        _ => rfs.create(&mut parent, &name)?,
    };

    let mut offset = 0;
    rfs.lseek(&file, file.size as isize, Whence::Set, &mut offset)?;
    rfs.write(&mut file, data, &mut offset)?;
    rfs.write_back(&file)
}
