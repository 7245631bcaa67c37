use std::{fs, path::PathBuf, process::ExitCode};

use clap::Parser;
use flatfs::{
    fuse::FlatfsFuse,
    snapshot,
    transform::{Identity, RandomXor, ReadTransform},
    FlatFs, FlatfsConfig, FlatfsResult,
};
use fuser::MountOption;
use log::{error, info};

/// Mount a flat, path-keyed in-memory filesystem.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory to mount on
    mountpoint: PathBuf,
    /// JSON file with capacity and size bounds
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory the snapshot is written to on unmount
    #[arg(long, default_value = ".")]
    snapshot_dir: PathBuf,
    /// Start from the snapshot in --snapshot-dir when one exists
    #[arg(long)]
    restore: bool,
    /// Return file content as stored instead of xor-ing each read
    #[arg(long)]
    no_transform: bool,
    #[arg(long)]
    allow_other: bool,
}

fn load_fs(args: &Args) -> FlatfsResult<FlatFs> {
    let config = match &args.config {
        Some(path) => FlatfsConfig::from_json(&fs::read_to_string(path)?)?,
        None => FlatfsConfig::default(),
    };
    let transform: Box<dyn ReadTransform> = if args.no_transform {
        Box::new(Identity)
    } else {
        Box::new(RandomXor::new())
    };

    if args.restore && snapshot::exists_in_dir(&args.snapshot_dir) {
        info!("restoring snapshot from {}", args.snapshot_dir.display());
        return snapshot::restore_from_dir(config, &args.snapshot_dir, transform);
    }
    FlatFs::with_transform(config, transform)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let fs = match load_fs(&args) {
        Ok(fs) => fs,
        Err(e) => {
            error!("cannot start filesystem: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut options = vec![MountOption::FSName("flatfs".to_string())];
    if args.allow_other {
        options.push(MountOption::AllowOther);
    }

    info!("mounting on {}", args.mountpoint.display());
    let host = FlatfsFuse::new(fs, Some(args.snapshot_dir.clone()));
    if let Err(e) = fuser::mount2(host, &args.mountpoint, &options) {
        error!("mount failed: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
