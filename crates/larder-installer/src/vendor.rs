//! Copying installed packages into a project directory.

use crate::ignore::IgnoreRules;
use larder_core::{CachedPackage, Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const STAGING_PREFIX: &str = ".larder-vendor-";
const BACKUP_PREFIX: &str = ".larder-vendor-old-";

/// Copy every package to `<dest>/<name>/`, replacing `dest` as a whole.
///
/// Files matching `ignore` are left out. The new tree is assembled in a
/// sibling staging directory and only swapped in once complete, so a
/// failed copy leaves `dest` untouched.
pub(crate) async fn vendor(
    packages: &[CachedPackage],
    dest: &Path,
    ignore: &IgnoreRules,
) -> Result<()> {
    let sources: Vec<(String, PathBuf)> = packages
        .iter()
        .map(|p| (p.name.clone(), p.path.clone()))
        .collect();
    let target = dest.to_path_buf();
    let ignore = ignore.clone();
    tokio::task::spawn_blocking(move || vendor_blocking(&sources, &target, &ignore))
        .await
        .map_err(|e| Error::io(dest, io::Error::other(e)))?
}

fn vendor_blocking(sources: &[(String, PathBuf)], dest: &Path, ignore: &IgnoreRules) -> Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| Error::io(&parent, e))?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&parent)
        .map_err(|e| Error::io(&parent, e))?;
    for (name, source) in sources {
        copy_tree(source, &staging.path().join(name), ignore)?;
    }

    if dest.exists() {
        let backup = tempfile::Builder::new()
            .prefix(BACKUP_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| Error::io(&parent, e))?;
        let old = backup.path().join("previous");
        fs::rename(dest, &old).map_err(|e| Error::io(dest, e))?;
        if let Err(e) = fs::rename(staging.path(), dest) {
            if let Err(restore) = fs::rename(&old, dest) {
                warn!(path = %dest.display(), error = %restore, "failed to restore vendor directory");
            }
            return Err(Error::io(dest, e));
        }
        debug!(path = %dest.display(), "replaced vendor directory");
    } else {
        fs::rename(staging.path(), dest).map_err(|e| Error::io(dest, e))?;
    }

    info!(path = %dest.display(), packages = sources.len(), "vendored packages");
    Ok(())
}

fn copy_tree(source: &Path, dest: &Path, ignore: &IgnoreRules) -> Result<()> {
    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.file_name() != ".git"
                && e
                    .path()
                    .strip_prefix(source)
                    .map_or(true, |rel| rel.as_os_str().is_empty() || !ignore.is_ignored(rel))
        });
    for entry in walker {
        let entry = entry.map_err(|e| Error::io(source, e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(|e| Error::io(&target, e))?;
        }
    }
    Ok(())
}
