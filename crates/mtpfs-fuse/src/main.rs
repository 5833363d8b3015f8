#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mtpfs_core::{MemoryDevice, MtpFs, ParentRef, StorageId};
use mtpfs_fuse::{MountConfig, MtpFuse, StorageSpec, spawn_mount};

/// Mount a media device as a filesystem
#[derive(Parser)]
#[command(name = "mtpfs")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Emulated device with two storage areas
    mtpfs /mnt/phone --storage Internal:4096 --storage Card:32768

    # Seed the first storage area from a local directory
    mtpfs /mnt/phone --storage Internal --import ~/Music
")]
struct Cli {
    /// Directory to mount on
    mountpoint: PathBuf,

    /// Storage area of the emulated device as NAME[:CAPACITY_MB] (repeatable)
    #[arg(long = "storage", value_name = "NAME[:CAPACITY_MB]")]
    storages: Vec<StorageSpec>,

    /// Copy a local directory tree into the first storage area before mounting
    #[arg(long, value_name = "DIR")]
    import: Option<PathBuf>,

    /// Owner reported for every entry (defaults to the current user)
    #[arg(long)]
    uid: Option<u32>,

    /// Group reported for every entry (defaults to the current group)
    #[arg(long)]
    gid: Option<u32>,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Attribute cache TTL in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 1000, env = "MTPFS_ATTR_TTL_MS")]
    attr_ttl_ms: u64,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let device = build_device(&cli)?;
    let fs = MtpFs::new(device).context("Failed to open device session")?;

    let mut config = MountConfig::default()
        .attr_ttl(Duration::from_millis(cli.attr_ttl_ms))
        .allow_other(cli.allow_other);
    let (uid, gid) = (cli.uid.unwrap_or(config.uid), cli.gid.unwrap_or(config.gid));
    config = config.owner(uid, gid);

    let handle = spawn_mount(MtpFuse::new(Arc::new(fs), config), &cli.mountpoint)
        .with_context(|| format!("Failed to mount at {}", cli.mountpoint.display()))?;
    eprintln!("Mounted at {} (Ctrl+C to unmount)", handle.mountpoint().display());

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to set signal handler")?;
    let _ = rx.recv();

    eprintln!("\nUnmounting...");
    handle.unmount();
    Ok(())
}

fn build_device(cli: &Cli) -> Result<MemoryDevice> {
    let default_storage = [StorageSpec {
        name: "Internal".to_string(),
        capacity_bytes: mtpfs_fuse::config::DEFAULT_CAPACITY_MB << 20,
    }];
    let storages = if cli.storages.is_empty() {
        &default_storage[..]
    } else {
        &cli.storages[..]
    };

    let mut device = MemoryDevice::new();
    let mut first = None;
    for (index, spec) in storages.iter().enumerate() {
        if storages[..index].iter().any(|s| s.name == spec.name) {
            bail!("Storage area '{}' given twice", spec.name);
        }
        let id = device.add_storage(&spec.name, spec.capacity_bytes);
        first.get_or_insert(id);
    }

    if let (Some(dir), Some(storage)) = (&cli.import, first) {
        let count = import_tree(&mut device, storage, ParentRef::StorageRoot, dir)
            .with_context(|| format!("Failed to import {}", dir.display()))?;
        tracing::info!(files = count, source = %dir.display(), "Imported local files");
    }
    Ok(device)
}

/// Copies `dir` into the device below `parent`. Returns the number of files.
fn import_tree(device: &mut MemoryDevice, storage: StorageId, parent: ParentRef, dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 name");
            continue;
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let folder = device.add_folder(storage, parent, &name);
            count += import_tree(device, storage, ParentRef::Folder(folder), &entry.path())?;
        } else if file_type.is_file() {
            let data = fs::read(entry.path())?;
            device.add_file(storage, parent, &name, &data);
            count += 1;
        }
    }
    Ok(count)
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
