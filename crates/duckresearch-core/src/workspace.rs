//! Scratch folders used by the browsing tools.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

/// Empty each folder and, if `create` is set, recreate it.
///
/// Failures are logged per folder and never abort the remaining folders.
pub fn reset_dirs(folders: &[PathBuf], create: bool) {
    for folder in folders {
        if let Err(err) = reset_dir(folder, create) {
            error!(folder = %folder.display(), error = %err, "failed to reset folder");
        }
    }
}

fn reset_dir(folder: &Path, create: bool) -> std::io::Result<()> {
    if folder.exists() {
        fs::remove_dir_all(folder)?;
        info!(folder = %folder.display(), "folder emptied");
    }
    if create {
        fs::create_dir_all(folder)?;
        info!(folder = %folder.display(), "folder recreated");
    }
    Ok(())
}

/// Total size in bytes of all files below `folder`; zero if it does not exist.
pub fn folder_size(folder: &Path) -> u64 {
    if !folder.exists() {
        return 0;
    }
    WalkDir::new(folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Human readable size such as `1.23 MB`.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}
