//! Ignore rules applied while vendoring.

use glob::Pattern;
use larder_core::{Error, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Name of the ignore file looked up in the project.
pub const IGNORE_FILE: &str = "chefignore";

/// Glob patterns naming package files that are not vendored.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    /// Rules from `<project>/chefignore`, else `<project>/cookbooks/chefignore`.
    ///
    /// No ignore file means nothing is ignored.
    pub fn discover(project: &Path) -> Result<Self> {
        for candidate in [
            project.join(IGNORE_FILE),
            project.join("cookbooks").join(IGNORE_FILE),
        ] {
            match fs::read_to_string(&candidate) {
                Ok(content) => {
                    let rules = Self::parse(&content);
                    debug!(path = %candidate.display(), patterns = rules.patterns.len(), "loaded ignore file");
                    return Ok(rules);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&candidate, e)),
            }
        }
        Ok(Self::default())
    }

    /// One pattern per line; blank lines and `#` comments are skipped.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let patterns = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match Pattern::new(line) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = line, error = %e, "skipping invalid ignore pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Whether `relative`, a path inside a package, is ignored.
    #[must_use]
    pub fn is_ignored(&self, relative: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let rel = relative.to_string_lossy().replace('\\', "/");
        self.patterns.iter().any(|p| p.matches(&rel))
    }

    /// Whether no pattern is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
