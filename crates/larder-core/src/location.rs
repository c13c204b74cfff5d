//! Location specifications: where a package's contents come from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Credentials for an authenticated API location.
///
/// Never serialized: lockfiles record the endpoint only.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Credentials {
    /// Client identity sent with each request.
    pub client_name: String,
    /// Bearer token.
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_name", &self.client_name)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Variant tag used to dispatch fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationKind {
    /// Local directory.
    Path,
    /// Git repository.
    Git,
    /// Public package index.
    Index,
    /// Authenticated package API.
    Api,
}

/// Where a package comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationSpec {
    /// A directory on the local filesystem, used in place.
    Path {
        /// Package directory.
        dir: PathBuf,
    },
    /// A git repository at an optional branch, tag or revision.
    Git {
        /// Clone URI.
        uri: String,
        /// Branch, tag or full revision.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    /// A public index serving versioned archives.
    Index {
        /// Index base URL.
        endpoint: String,
    },
    /// An authenticated package API.
    Api {
        /// API base URL.
        endpoint: String,
        /// Credentials, re-attached from the manifest at run time.
        #[serde(skip)]
        credentials: Option<Credentials>,
    },
}

impl LocationSpec {
    /// Path location.
    #[must_use]
    pub fn path(dir: impl Into<PathBuf>) -> Self {
        Self::Path { dir: dir.into() }
    }

    /// Git location.
    #[must_use]
    pub fn git(uri: impl Into<String>, reference: Option<&str>) -> Self {
        Self::Git {
            uri: uri.into(),
            reference: reference.map(str::to_string),
        }
    }

    /// Index location.
    #[must_use]
    pub fn index(endpoint: impl Into<String>) -> Self {
        Self::Index {
            endpoint: endpoint.into(),
        }
    }

    /// Authenticated API location.
    #[must_use]
    pub fn api(endpoint: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self::Api {
            endpoint: endpoint.into(),
            credentials,
        }
    }

    /// The variant tag.
    #[must_use]
    pub const fn kind(&self) -> LocationKind {
        match self {
            Self::Path { .. } => LocationKind::Path,
            Self::Git { .. } => LocationKind::Git,
            Self::Index { .. } => LocationKind::Index,
            Self::Api { .. } => LocationKind::Api,
        }
    }

    /// Path and git locations pin a package to a single source.
    #[must_use]
    pub const fn is_pin(&self) -> bool {
        matches!(self, Self::Path { .. } | Self::Git { .. })
    }

    /// Endpoint of an index or API location.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Index { endpoint } | Self::Api { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// Copy with credentials removed, as recorded in lockfiles.
    #[must_use]
    pub fn without_credentials(&self) -> Self {
        match self {
            Self::Api { endpoint, .. } => Self::Api {
                endpoint: endpoint.clone(),
                credentials: None,
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for LocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { dir } => write!(f, "path '{}'", dir.display()),
            Self::Git {
                uri,
                reference: Some(r),
            } => write!(f, "git '{uri}' at '{r}'"),
            Self::Git { uri, reference: None } => write!(f, "git '{uri}'"),
            Self::Index { endpoint } => write!(f, "index '{endpoint}'"),
            Self::Api { endpoint, .. } => write!(f, "api '{endpoint}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_api_location_drops_credentials() {
        let spec = LocationSpec::api(
            "https://api.example/v1",
            Some(Credentials {
                client_name: "ci".to_string(),
                token: "secret".to_string(),
            }),
        );
        let json = sonic_rs::to_string(&spec).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains(r#""type":"api""#));

        let back: LocationSpec = sonic_rs::from_str(&json).unwrap();
        assert_eq!(back, spec.without_credentials());
    }

    #[test]
    fn git_without_reference_omits_field() {
        let json = sonic_rs::to_string(&LocationSpec::git("https://g.example/a.git", None)).unwrap();
        assert_eq!(json, r#"{"type":"git","uri":"https://g.example/a.git"}"#);
    }

    #[test]
    fn pins_are_path_and_git() {
        assert!(LocationSpec::path("/tmp/a").is_pin());
        assert!(LocationSpec::git("u", Some("main")).is_pin());
        assert!(!LocationSpec::index("https://i.example").is_pin());
        assert_eq!(LocationSpec::index("x").kind(), LocationKind::Index);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials {
            client_name: "ci".to_string(),
            token: "secret".to_string(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
