//! HTTP transport for index and API locations.
//!
//! Endpoints follow a small REST layout:
//! - `GET {endpoint}/{name}` returns `{"versions": ["1.0.0", ...]}`
//! - `GET {endpoint}/{name}/versions/{version}/download` returns a `.tar.gz`
//!
//! API locations authenticate every request with a bearer token and a
//! client header.

use crate::ArchiveTransport;
use async_trait::async_trait;
use futures_util::StreamExt;
use larder_core::{Credentials, Error, LocationSpec, Result, Version};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};
use url::Url;

/// Header carrying the API client identity.
const CLIENT_HEADER: &str = "X-Larder-Client";

/// Version listing payload.
#[derive(Debug, Deserialize)]
struct VersionList {
    versions: Vec<String>,
}

/// Archive transport over HTTP(S).
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("client", &"reqwest::Client")
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .timeout(timeout)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn url(location: &LocationSpec, segments: &[&str]) -> Result<Url> {
        let endpoint = location.endpoint().ok_or_else(|| {
            Error::InvalidOptions(format!("{location} is not served over HTTP"))
        })?;
        let mut url = Url::parse(endpoint)
            .map_err(|e| Error::transport(location, format!("invalid endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::transport(location, "endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, location: &LocationSpec, url: Url) -> RequestBuilder {
        let mut request = self.client.get(url).header(
            USER_AGENT,
            concat!("larder/", env!("CARGO_PKG_VERSION")),
        );
        if let LocationSpec::Api {
            credentials: Some(Credentials { client_name, token }),
            ..
        } = location
        {
            request = request
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .header(CLIENT_HEADER, client_name);
        }
        request
    }

    async fn send(
        &self,
        location: &LocationSpec,
        name: &str,
        request: RequestBuilder,
    ) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(location, e.to_string()))?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::not_found(
                name,
                format!("{location} has no package '{name}'"),
            )),
            status => Err(Error::transport(location, format!("HTTP {status}"))),
        }
    }
}

#[async_trait]
impl ArchiveTransport for HttpTransport {
    async fn versions(&self, location: &LocationSpec, name: &str) -> Result<Vec<Version>> {
        let url = Self::url(location, &[name])?;
        debug!(url = %url, "listing versions");
        let request = self.request(location, url).header(ACCEPT, "application/json");
        let body = self
            .send(location, name, request)
            .await?
            .bytes()
            .await
            .map_err(|e| Error::transport(location, e.to_string()))?;
        let list: VersionList = sonic_rs::from_slice(&body)
            .map_err(|e| Error::transport(location, format!("malformed version list: {e}")))?;

        Ok(list
            .versions
            .iter()
            .filter_map(|raw| match Version::parse(raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(name, version = %raw, error = %e, "ignoring unparseable version");
                    None
                }
            })
            .collect())
    }

    async fn download(
        &self,
        location: &LocationSpec,
        name: &str,
        version: &Version,
        dest: &Path,
    ) -> Result<PathBuf> {
        let version_text = version.to_string();
        let url = Self::url(location, &[name, "versions", &version_text, "download"])?;
        debug!(url = %url, "downloading archive");
        let response = self
            .send(location, name, self.request(location, url))
            .await?;

        let path = dest.join(format!("{name}-{version_text}.tar.gz"));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::transport(location, e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(&path, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| Error::io(&path, e))?;
        trace!(path = %path.display(), bytes = written, "archive written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn lists_versions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nginx"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"versions":["1.0.0","1.2","not-a-version"]}"#),
            )
            .mount(&server)
            .await;

        let location = LocationSpec::index(format!("{}/api/v1/", server.uri()));
        let versions = transport().versions(&location, "nginx").await.unwrap();
        assert_eq!(versions, vec![Version::new(1, 0, 0), Version::new(1, 2, 0)]);
    }

    #[tokio::test]
    async fn missing_package_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let location = LocationSpec::index(server.uri());
        let err = transport().versions(&location, "nginx").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn server_errors_are_transport_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let location = LocationSpec::index(server.uri());
        let err = transport().versions(&location, "nginx").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn api_downloads_are_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nginx/versions/1.0.0/download"))
            .and(header("authorization", "Bearer s3cret"))
            .and(header("x-larder-client", "ci"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive-bytes".to_vec()))
            .mount(&server)
            .await;

        let location = LocationSpec::api(
            server.uri(),
            Some(Credentials {
                client_name: "ci".to_string(),
                token: "s3cret".to_string(),
            }),
        );
        let dir = TempDir::new().unwrap();
        let path = transport()
            .download(&location, "nginx", &Version::new(1, 0, 0), dir.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"archive-bytes");
    }
}
