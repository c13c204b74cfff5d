//! Content checks applied before a package enters the store.

use larder_core::{Error, PackageDescriptor, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Relative paths whose final component contains whitespace or control
/// characters.
pub fn invalid_file_names(root: &Path) -> Result<Vec<String>> {
    let mut invalid = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(path, e.into())
        })?;
        let name = entry.file_name().to_string_lossy();
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            invalid.push(relative.display().to_string());
        }
    }
    Ok(invalid)
}

/// Check a populated directory is a well-formed package.
pub fn validate_package(name: &str, root: &Path) -> Result<PackageDescriptor> {
    let descriptor = PackageDescriptor::read(root)?;
    let invalid = invalid_file_names(root)?;
    if !invalid.is_empty() {
        return Err(Error::Validation {
            name: name.to_string(),
            path: root.to_path_buf(),
            message: format!("file names must not contain whitespace: {}", invalid.join(", ")),
        });
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::DESCRIPTOR_FILE;
    use std::fs;
    use tempfile::TempDir;

    fn package_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(DESCRIPTOR_FILE),
            r#"{"name":"nginx","version":"1.0.0"}"#,
        )
        .unwrap();
        dir
    }

    #[test]
    fn accepts_clean_package() {
        let dir = package_dir();
        fs::create_dir_all(dir.path().join("recipes")).unwrap();
        fs::write(dir.path().join("recipes/default.rb"), "").unwrap();
        let descriptor = validate_package("nginx", dir.path()).unwrap();
        assert_eq!(descriptor.name, "nginx");
    }

    #[test]
    fn rejects_spaces_in_file_names() {
        let dir = package_dir();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(dir.path().join("templates/nginx site.erb"), "").unwrap();
        let err = validate_package("nginx", dir.path()).unwrap_err();
        match err {
            Error::Validation { message, .. } => assert!(message.contains("nginx site.erb")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_missing_descriptor() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            validate_package("nginx", dir.path()),
            Err(Error::Descriptor { .. })
        ));
    }
}
