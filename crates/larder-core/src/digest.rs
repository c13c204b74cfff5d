//! BLAKE3 digests for manifests and package contents.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::trace;
use walkdir::WalkDir;

/// Directories that never contribute to a package checksum.
const IGNORED_DIRS: &[&str] = &[".git"];

/// A 32-byte BLAKE3 digest, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Digest of a byte slice.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Parse a hex digest.
    pub fn from_hex(hex: &str) -> Result<Self> {
        blake3::Hash::from_hex(hex)
            .map(|h| Self(*h.as_bytes()))
            .map_err(|e| Error::InvalidOptions(format!("invalid digest '{hex}': {e}")))
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Checksum of a package directory.
    ///
    /// Every regular file contributes its relative path (with `/`
    /// separators), a NUL byte, then its contents, in path order. VCS
    /// metadata is skipped, so two checkouts of one revision agree.
    pub fn of_dir(root: &Path) -> Result<Self> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && IGNORED_DIRS.iter().any(|d| e.file_name() == *d))
            });
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                Error::io(path, e.into())
            })?;
            if entry.file_type().is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(entry.path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((relative, entry.into_path()));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = blake3::Hasher::new();
        for (relative, path) in &files {
            hasher.update(relative.as_bytes());
            hasher.update(&[0]);
            let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
            io::copy(&mut file, &mut hasher).map_err(|e| Error::io(path, e))?;
        }
        trace!(root = %root.display(), files = files.len(), "checksummed directory");
        Ok(Self(*hasher.finalize().as_bytes()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn hex_round_trip() {
        let digest = Digest::of_bytes(b"larder");
        assert_eq!(digest.to_hex().len(), 64);
        assert_eq!(Digest::from_hex(&digest.to_hex()).unwrap(), digest);
        assert!(Digest::from_hex("nope").is_err());
    }

    #[test]
    fn dir_checksum_is_stable_and_content_sensitive() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        for root in [a.path(), b.path()] {
            write(root, "metadata.json", "{}");
            write(root, "recipes/default.rb", "package 'nginx'");
        }
        // VCS metadata differs between clones and must not matter.
        write(a.path(), ".git/HEAD", "ref: refs/heads/main");

        let da = Digest::of_dir(a.path()).unwrap();
        assert_eq!(da, Digest::of_dir(b.path()).unwrap());

        write(b.path(), "recipes/default.rb", "package 'apache2'");
        assert_ne!(da, Digest::of_dir(b.path()).unwrap());
    }

    #[test]
    fn file_names_contribute() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write(a.path(), "one.rb", "x");
        write(b.path(), "two.rb", "x");
        assert_ne!(
            Digest::of_dir(a.path()).unwrap(),
            Digest::of_dir(b.path()).unwrap()
        );
    }
}
