//! Streaming tar.gz extraction.

use async_compression::tokio::bufread::GzipDecoder;
use futures_util::TryStreamExt;
use larder_core::{Error, PackageDescriptor, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tokio_tar::Archive as TarArchive;
use tracing::{debug, trace};

/// Extract a gzipped tarball into `dest`.
///
/// Entries are confined to `dest`: absolute paths and `..` components are
/// rejected, links and special files are skipped. Returns the number of
/// regular files written.
pub async fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive)
        .await
        .map_err(|e| Error::io(archive, e))?;
    fs::create_dir_all(dest)
        .await
        .map_err(|e| Error::io(dest, e))?;

    let decoder = GzipDecoder::new(BufReader::new(file));
    let mut tar = TarArchive::new(decoder);
    let mut entries = tar.entries().map_err(|e| archive_error(archive, &e))?;

    let mut files_extracted = 0;
    while let Some(mut entry) = entries
        .try_next()
        .await
        .map_err(|e| archive_error(archive, &e))?
    {
        let raw = entry
            .path()
            .map_err(|e| archive_error(archive, &e))?
            .into_owned();
        let relative = confine(&raw).ok_or_else(|| Error::Io {
            path: archive.to_path_buf(),
            message: format!("archive entry escapes destination: {}", raw.display()),
        })?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let out_path = dest.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&out_path)
                .await
                .map_err(|e| Error::io(&out_path, e))?;
        } else if entry_type.is_file() {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::io(parent, e))?;
            }
            entry
                .unpack(&out_path)
                .await
                .map_err(|e| archive_error(archive, &e))?;
            files_extracted += 1;
            trace!(file = %out_path.display(), "extracted file");
        } else {
            trace!(entry = %raw.display(), "skipping non-regular archive entry");
        }
    }

    debug!(archive = %archive.display(), files = files_extracted, "extraction complete");
    Ok(files_extracted)
}

/// Locate the package root in an extracted archive: either `dir` itself or
/// its single top-level directory.
pub(crate) async fn package_root(dir: &Path) -> Option<PathBuf> {
    if PackageDescriptor::present_in(dir) {
        return Some(dir.to_path_buf());
    }
    let mut read_dir = fs::read_dir(dir).await.ok()?;
    let mut entries = Vec::new();
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        entries.push(entry);
        if entries.len() > 1 {
            return None;
        }
    }
    let only = entries.pop()?;
    let path = only.path();
    (only.file_type().await.ok()?.is_dir() && PackageDescriptor::present_in(&path)).then_some(path)
}

/// Normalize an entry path, refusing anything that could leave the destination.
fn confine(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn archive_error(archive: &Path, err: &std::io::Error) -> Error {
    Error::Io {
        path: archive.to_path_buf(),
        message: format!("corrupt archive: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{descriptor, tarball};
    use larder_core::DESCRIPTOR_FILE;
    use tempfile::TempDir;
    use pretty_assertions::assert_eq;

    #[test]
    fn confine_rejects_escapes() {
        assert_eq!(confine(Path::new("a/./b")), Some(PathBuf::from("a/b")));
        assert_eq!(confine(Path::new("../etc/passwd")), None);
        assert_eq!(confine(Path::new("/etc/passwd")), None);
    }

    #[tokio::test]
    async fn extracts_and_finds_single_root() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("nginx.tar.gz");
        let meta = descriptor("nginx", "1.0.0");
        std::fs::write(
            &archive,
            tarball(
                "nginx",
                &[(DESCRIPTOR_FILE, meta.as_str()), ("recipes/default.rb", "")],
            ),
        )
        .unwrap();

        let out = dir.path().join("out");
        assert_eq!(extract_tar_gz(&archive, &out).await.unwrap(), 2);
        assert_eq!(package_root(&out).await, Some(out.join("nginx")));
        assert!(out.join("nginx/recipes/default.rb").is_file());
    }

    #[tokio::test]
    async fn root_level_descriptor_is_its_own_root() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("flat.tar.gz");
        let meta = descriptor("flat", "1.0.0");
        std::fs::write(&archive, tarball("", &[(DESCRIPTOR_FILE, meta.as_str())])).unwrap();

        let out = dir.path().join("out");
        extract_tar_gz(&archive, &out).await.unwrap();
        assert_eq!(package_root(&out).await, Some(out.clone()));
    }

    #[tokio::test]
    async fn garbage_is_an_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("junk.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();
        assert!(extract_tar_gz(&archive, &dir.path().join("out")).await.is_err());
    }
}
