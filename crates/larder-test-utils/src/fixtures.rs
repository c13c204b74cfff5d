//! Package fixtures: descriptors, package directories and archives.

use flate2::Compression;
use flate2::write::GzEncoder;
use larder_core::DESCRIPTOR_FILE;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct Descriptor<'a> {
    name: &'a str,
    version: &'a str,
    dependencies: &'a BTreeMap<String, String>,
}

/// A package to publish to a fake location or write to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFixture {
    /// Package name.
    pub name: String,
    /// Version as written in the descriptor.
    pub version: String,
    /// Declared dependencies, name to constraint.
    pub dependencies: BTreeMap<String, String>,
    /// Extra files, relative path to contents.
    pub files: BTreeMap<String, String>,
}

impl PackageFixture {
    /// A package with a default recipe and no dependencies.
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            "recipes/default.rb".to_string(),
            format!("# {name} {version}\n"),
        );
        Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: BTreeMap::new(),
            files,
        }
    }

    /// Declare a dependency.
    #[must_use]
    pub fn depends_on(mut self, name: &str, constraint: &str) -> Self {
        self.dependencies
            .insert(name.to_string(), constraint.to_string());
        self
    }

    /// Add or replace a file.
    #[must_use]
    pub fn file(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.to_string());
        self
    }

    /// Descriptor JSON.
    #[must_use]
    pub fn descriptor(&self) -> String {
        sonic_rs::to_string(&Descriptor {
            name: &self.name,
            version: &self.version,
            dependencies: &self.dependencies,
        })
        .expect("descriptor serializes")
    }

    /// Every file of the package, descriptor included, in path order.
    #[must_use]
    pub fn contents(&self) -> Vec<(String, String)> {
        let mut contents = vec![(DESCRIPTOR_FILE.to_string(), self.descriptor())];
        contents.extend(self.files.iter().map(|(p, c)| (p.clone(), c.clone())));
        contents.sort();
        contents
    }

    /// Write the package into `dir`, creating it.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        for (path, contents) in self.contents() {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, contents)?;
        }
        Ok(dir.to_path_buf())
    }

    /// A gzipped tarball with the package under a `<name>/` directory, the
    /// way community indexes ship them.
    #[must_use]
    pub fn tarball(&self) -> Vec<u8> {
        let contents = self.contents();
        let files: Vec<(&str, &str)> = contents
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        tarball(&self.name, &files)
    }
}

/// A gzipped tarball holding `files`, under `prefix/` unless it is empty.
#[must_use]
pub fn tarball(prefix: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        let full = if prefix.is_empty() {
            (*path).to_string()
        } else {
            format!("{prefix}/{path}")
        };
        builder
            .append_data(&mut header, full, contents.as_bytes())
            .expect("in-memory tar append");
    }
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .expect("in-memory gzip finish")
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::{PackageDescriptor, Version};
    use tempfile::TempDir;

    #[test]
    fn written_fixture_parses() {
        let dir = TempDir::new().unwrap();
        let fixture = PackageFixture::new("nginx", "2.7.0").depends_on("ohai", "~> 1.0");
        fixture.write_to(dir.path()).unwrap();

        let descriptor = PackageDescriptor::read(dir.path()).unwrap();
        assert_eq!(descriptor.name, "nginx");
        assert_eq!(descriptor.version, Version::new(2, 7, 0));
        assert_eq!(descriptor.dependencies.len(), 1);
        assert!(dir.path().join("recipes/default.rb").is_file());
    }
}
