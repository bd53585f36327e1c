//! Raw byte acquisition of discovered resources.
//!
//! This module provides the [`TransferClient`] which streams a remote
//! resource verbatim to a caller-chosen local path, plus the helper
//! that derives the deterministic temporary file name an item uses
//! while it moves through the pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

/// Default HTTP connect timeout (30 seconds).
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
const READ_TIMEOUT_SECS: u64 = 300;

/// Prefix applied to local working files so an item's temporary
/// artifact never collides with other files in the working directory.
const TEMP_PREFIX: &str = "temporary_";

/// Errors that can occur while fetching resource bytes.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl TransferError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// HTTP client for fetching resource bytes with streaming support.
///
/// Designed to be created once and reused for every item in a run,
/// taking advantage of connection pooling. The same underlying client
/// also serves page fetches for link discovery.
#[derive(Debug, Clone)]
pub struct TransferClient {
    client: Client,
}

impl Default for TransferClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferClient {
    /// Creates a new client with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the
    /// supplied timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches `url` and writes the response body verbatim to
    /// `local_path`, returning the number of bytes written.
    ///
    /// Any existing file at `local_path` is truncated. On a streaming
    /// failure the partial file is removed so no incomplete artifact is
    /// left behind.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if the URL is invalid, the request
    /// fails, the server responds with a non-2xx status, or writing to
    /// disk fails.
    #[instrument(skip(self), fields(url = %url, path = %local_path.display()))]
    pub async fn fetch_to_path(&self, url: &str, local_path: &Path) -> Result<u64, TransferError> {
        Url::parse(url).map_err(|_| TransferError::invalid_url(url))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TransferError::timeout(url)
            } else {
                TransferError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::http_status(url, status.as_u16()));
        }

        let mut file = File::create(local_path)
            .await
            .map_err(|e| TransferError::io(local_path, e))?;

        let stream_result = stream_to_file(&mut file, response, url, local_path).await;

        if stream_result.is_err() {
            debug!(path = %local_path.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(local_path).await;
        }

        let bytes_written = stream_result?;
        debug!(bytes = bytes_written, "transfer complete");
        Ok(bytes_written)
    }

    /// Returns a reference to the underlying reqwest client.
    ///
    /// The pipeline shares it with the link discoverer.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Streams response body to file, returning bytes written.
///
/// This is extracted to enable cleanup on error in the caller.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| TransferError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
    }

    // Ensure all data is flushed to disk
    writer
        .flush()
        .await
        .map_err(|e| TransferError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}

/// Derives the deterministic temporary file name for a resource URL.
///
/// The name is the URL's base name (last path segment, percent-decoded
/// and sanitized) behind a fixed `temporary_` prefix, so re-running the
/// pipeline over the same link maps to the same working file and never
/// collides with other files in the working directory.
#[must_use]
pub fn temp_file_name(url: &str) -> String {
    format!("{TEMP_PREFIX}{}", base_name_from_url(url))
}

/// Extracts a usable base name from the URL's last path segment.
#[must_use]
pub fn base_name_from_url(url: &str) -> String {
    let segment = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(std::string::ToString::to_string))
    });

    let Some(segment) = segment.filter(|s| !s.is_empty()) else {
        return "artifact.bin".to_string();
    };

    let decoded = urlencoding::decode(&segment).map_or(segment.clone(), |d| d.into_owned());
    let sanitized = sanitize_file_name(&decoded);
    if sanitized.is_empty() {
        "artifact.bin".to_string()
    } else {
        sanitized
    }
}

/// Maps path separators and other unsafe characters to underscores,
/// collapsing runs of replacements.
fn sanitize_file_name(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_temp_file_name_uses_url_base_name() {
        assert_eq!(
            temp_file_name("https://cdn.example.com/music/song.mp3"),
            "temporary_song.mp3"
        );
    }

    #[test]
    fn test_temp_file_name_is_deterministic() {
        let url = "https://cdn.example.com/a%20b.wav";
        assert_eq!(temp_file_name(url), temp_file_name(url));
        assert_eq!(temp_file_name(url), "temporary_a_b.wav");
    }

    #[test]
    fn test_base_name_fallback_for_bare_host() {
        assert_eq!(base_name_from_url("https://example.com"), "artifact.bin");
    }

    #[test]
    fn test_sanitize_strips_path_separators() {
        assert_eq!(sanitize_file_name("..\\..\\evil.mp3"), ".._.._evil.mp3");
        assert_eq!(sanitize_file_name("a b\tc.ogg"), "a_b_c.ogg");
    }

    #[tokio::test]
    async fn test_fetch_to_path_writes_body_verbatim() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3 audio bytes"))
            .mount(&mock_server)
            .await;

        let client = TransferClient::new();
        let url = format!("{}/song.mp3", mock_server.uri());
        let dest = temp_dir.path().join("temporary_song.mp3");

        let bytes = client.fetch_to_path(&url, &dest).await.unwrap();
        assert_eq!(bytes, 15);
        assert_eq!(std::fs::read(&dest).unwrap(), b"ID3 audio bytes");
    }

    #[tokio::test]
    async fn test_fetch_to_path_404_error() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/missing.mp3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = TransferClient::new();
        let url = format!("{}/missing.mp3", mock_server.uri());
        let dest = temp_dir.path().join("temporary_missing.mp3");

        let result = client.fetch_to_path(&url, &dest).await;
        match result {
            Err(TransferError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
        assert!(!dest.exists(), "no file should be created on HTTP error");
    }

    #[tokio::test]
    async fn test_fetch_to_path_invalid_url() {
        let temp_dir = TempDir::new().unwrap();
        let client = TransferClient::new();

        let result = client
            .fetch_to_path("not-a-valid-url", &temp_dir.path().join("out"))
            .await;
        assert!(matches!(result, Err(TransferError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_fetch_cleanup_on_read_timeout() {
        // Partial file must be removed when the stream fails mid-transfer.
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/slow.wav"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"data")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let client = TransferClient::new_with_timeouts(30, 1);
        let url = format!("{}/slow.wav", mock_server.uri());
        let dest = temp_dir.path().join("temporary_slow.wav");

        let result = client.fetch_to_path(&url, &dest).await;
        assert!(result.is_err(), "expected timeout or network error");
        assert!(
            !dest.exists(),
            "partial file must be cleaned up after stream error"
        );
    }

    #[tokio::test]
    async fn test_fetch_overwrites_existing_file() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/fresh.ogg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new"))
            .mount(&mock_server)
            .await;

        let dest = temp_dir.path().join("temporary_fresh.ogg");
        std::fs::write(&dest, b"stale content from a previous run").unwrap();

        let client = TransferClient::new();
        let url = format!("{}/fresh.ogg", mock_server.uri());
        client.fetch_to_path(&url, &dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }
}
