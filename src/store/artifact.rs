//! Artifact store adapter: uploads local files to object storage.
//!
//! The object store is an HTTP service addressed as
//! `{endpoint}/{bucket}/{remote_name}`. Uploading to an existing
//! remote name replaces its content, so storing is idempotent by name.
//! Credentials come from an explicit file path in the configuration,
//! never from ambient process environment.

use std::path::{Path, PathBuf};

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Configuration for the object storage boundary.
///
/// Threaded explicitly into [`ArtifactStore::new`]; nothing here is
/// read from the process environment.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Base URL of the object store service, without a trailing slash.
    pub endpoint: String,
    /// Target bucket for uploaded artifacts.
    pub bucket: String,
    /// Path to the JSON credential file (`{"token": "..."}`).
    pub credentials_path: PathBuf,
}

/// Shape of the credential file.
#[derive(Debug, Deserialize)]
struct Credentials {
    token: String,
}

/// Errors raised by the artifact store adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The credential file is missing, unreadable, or malformed.
    ///
    /// This is a configuration problem: the binary fails the whole run
    /// fast instead of retrying per item.
    #[error("unusable credential file {path}: {message}")]
    Credentials {
        /// The credential file path.
        path: PathBuf,
        /// What went wrong reading or parsing it.
        message: String,
    },

    /// The service rejected the upload as unauthenticated/unauthorized.
    #[error("object store rejected credentials uploading {remote_name} (HTTP {status})")]
    AuthRejected {
        /// The remote object name.
        remote_name: String,
        /// The HTTP status code (401 or 403).
        status: u16,
    },

    /// The service responded with any other non-success status.
    #[error("upload of {remote_name} failed with HTTP {status}")]
    UploadFailed {
        /// The remote object name.
        remote_name: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Network-level transfer failure.
    #[error("network error uploading {remote_name}: {source}")]
    Network {
        /// The remote object name.
        remote_name: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The local artifact could not be read.
    #[error("failed to read local artifact {path}: {source}")]
    Io {
        /// The local file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Uploads local artifacts to durable object storage.
///
/// Created once per run; the bearer token is read from the credential
/// file at construction so a bad configuration fails fast.
#[derive(Clone)]
pub struct ArtifactStore {
    client: Client,
    endpoint: String,
    bucket: String,
    token: String,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Token intentionally omitted.
        f.debug_struct("ArtifactStore")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl ArtifactStore {
    /// Creates an adapter for the configured bucket, reading the
    /// bearer token from the credential file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Credentials`] when the credential file
    /// cannot be read or parsed.
    #[instrument(skip(client, config), fields(bucket = %config.bucket))]
    pub async fn new(client: Client, config: ObjectStoreConfig) -> Result<Self, StorageError> {
        let raw = tokio::fs::read_to_string(&config.credentials_path)
            .await
            .map_err(|e| StorageError::Credentials {
                path: config.credentials_path.clone(),
                message: e.to_string(),
            })?;

        let credentials: Credentials =
            serde_json::from_str(&raw).map_err(|e| StorageError::Credentials {
                path: config.credentials_path.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket,
            token: credentials.token,
        })
    }

    /// Uploads the local file to the bucket under `remote_name` and
    /// returns the stable locator for the stored object.
    ///
    /// Uploading to an existing name replaces its content.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the local file cannot be read,
    /// the transfer fails, or the service rejects the request. All of
    /// these abort the current item only.
    #[instrument(skip(self, local_path), fields(remote_name = %remote_name, path = %local_path.display()))]
    pub async fn store(
        &self,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<String, StorageError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::Io {
                path: local_path.to_path_buf(),
                source: e,
            })?;
        let bytes = body.len();

        let locator = self.locator_for(remote_name);
        let response = self
            .client
            .put(&locator)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .body(body)
            .send()
            .await
            .map_err(|source| StorageError::Network {
                remote_name: remote_name.to_string(),
                source,
            })?;

        let status = response.status();
        if matches!(status.as_u16(), 401 | 403) {
            return Err(StorageError::AuthRejected {
                remote_name: remote_name.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(StorageError::UploadFailed {
                remote_name: remote_name.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(bytes, "artifact uploaded");
        info!(locator = %locator, "artifact stored");
        Ok(locator)
    }

    /// The externally addressable locator for an object name.
    #[must_use]
    pub fn locator_for(&self, remote_name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, remote_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_credentials(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("key.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    async fn store_for(server: &MockServer, dir: &TempDir) -> ArtifactStore {
        let config = ObjectStoreConfig {
            endpoint: server.uri(),
            bucket: "audio-bucket".to_string(),
            credentials_path: write_credentials(dir, r#"{"token": "sekret"}"#),
        };
        ArtifactStore::new(Client::new(), config).await.unwrap()
    }

    #[tokio::test]
    async fn test_store_uploads_and_returns_locator() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("PUT"))
            .and(path("/audio-bucket/song.mp3"))
            .and(header("Authorization", "Bearer sekret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let local = temp_dir.path().join("temporary_song.mp3");
        std::fs::write(&local, b"audio bytes").unwrap();

        let store = store_for(&mock_server, &temp_dir).await;
        let locator = store.store(&local, "song.mp3").await.unwrap();
        assert_eq!(
            locator,
            format!("{}/audio-bucket/song.mp3", mock_server.uri())
        );
    }

    #[tokio::test]
    async fn test_store_same_name_twice_is_idempotent_by_name() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("PUT"))
            .and(path("/audio-bucket/song.mp3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&mock_server)
            .await;

        let local = temp_dir.path().join("temporary_song.mp3");
        std::fs::write(&local, b"audio bytes").unwrap();

        let store = store_for(&mock_server, &temp_dir).await;
        let first = store.store(&local, "song.mp3").await.unwrap();
        let second = store.store(&local, "song.mp3").await.unwrap();
        assert_eq!(first, second, "re-upload yields the same locator");
    }

    #[tokio::test]
    async fn test_store_403_is_auth_rejected() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let local = temp_dir.path().join("f.wav");
        std::fs::write(&local, b"x").unwrap();

        let store = store_for(&mock_server, &temp_dir).await;
        let result = store.store(&local, "f.wav").await;
        match result {
            Err(StorageError::AuthRejected { status, .. }) => assert_eq!(status, 403),
            other => panic!("Expected AuthRejected, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_500_is_upload_failed() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let local = temp_dir.path().join("f.wav");
        std::fs::write(&local, b"x").unwrap();

        let store = store_for(&mock_server, &temp_dir).await;
        let result = store.store(&local, "f.wav").await;
        match result {
            Err(StorageError::UploadFailed { status, .. }) => assert_eq!(status, 500),
            other => panic!("Expected UploadFailed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_local_file_is_io_error() {
        let mock_server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();

        let store = store_for(&mock_server, &temp_dir).await;
        let result = store
            .store(&temp_dir.path().join("does-not-exist"), "f.wav")
            .await;
        assert!(matches!(result, Err(StorageError::Io { .. })));
    }

    #[tokio::test]
    async fn test_missing_credential_file_fails_construction() {
        let temp_dir = TempDir::new().unwrap();
        let config = ObjectStoreConfig {
            endpoint: "https://storage.example.com".to_string(),
            bucket: "b".to_string(),
            credentials_path: temp_dir.path().join("absent.json"),
        };
        let result = ArtifactStore::new(Client::new(), config).await;
        assert!(matches!(result, Err(StorageError::Credentials { .. })));
    }

    #[tokio::test]
    async fn test_malformed_credential_file_fails_construction() {
        let temp_dir = TempDir::new().unwrap();
        let config = ObjectStoreConfig {
            endpoint: "https://storage.example.com".to_string(),
            bucket: "b".to_string(),
            credentials_path: write_credentials(&temp_dir, "not json"),
        };
        let result = ArtifactStore::new(Client::new(), config).await;
        assert!(matches!(result, Err(StorageError::Credentials { .. })));
    }

    #[tokio::test]
    async fn test_debug_output_omits_token() {
        let temp_dir = TempDir::new().unwrap();
        let config = ObjectStoreConfig {
            endpoint: "https://storage.example.com/".to_string(),
            bucket: "b".to_string(),
            credentials_path: write_credentials(&temp_dir, r#"{"token": "sekret"}"#),
        };
        let store = ArtifactStore::new(Client::new(), config).await.unwrap();
        let debug = format!("{store:?}");
        assert!(!debug.contains("sekret"), "token must not leak: {debug}");
        // Trailing slash on the endpoint is normalized away.
        assert_eq!(
            store.locator_for("x.mp3"),
            "https://storage.example.com/b/x.mp3"
        );
    }
}
