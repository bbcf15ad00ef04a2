//! Manifest loading and refreshing.
//!
//! The manifest lives as `manifest.yaml` in the config directory. At most
//! once per hour the backend's manifest version is compared with the local
//! one; a different version replaces the local file wholesale. Network
//! failures fall back to the local copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiRequest};
use crate::error::ManifestError;

use super::Manifest;

/// Local manifest file name inside the config directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.yaml";

/// Version-check timestamp file name inside the config directory.
pub const CHECK_FILE_NAME: &str = "manifest-check.json";

/// Backend path answering `{"version": "..."}`.
pub const VERSION_ENDPOINT: &str = "/cli/manifest-version";

/// Backend path serving the full manifest.
pub const MANIFEST_ENDPOINT: &str = "/cli/manifest";

/// Minimum time between two version checks, in seconds.
pub const CHECK_INTERVAL_SECS: i64 = 60 * 60;

/// Parses and validates a manifest document (YAML or JSON).
///
/// # Errors
///
/// Returns [`ManifestError::Parse`] on malformed input and any validation
/// error from [`Manifest::validate`].
pub fn parse_manifest(text: &str) -> Result<Manifest, ManifestError> {
    let manifest: Manifest = serde_yaml::from_str(text)?;
    manifest.validate()?;
    Ok(manifest)
}

/// Reads, parses and validates a manifest file.
///
/// # Errors
///
/// Returns [`ManifestError::Read`] if the file cannot be read, otherwise as
/// [`parse_manifest`].
pub fn load_file(path: &Path) -> Result<Manifest, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest = parse_manifest(&text)?;
    tracing::debug!(
        path = %path.display(),
        version = %manifest.version,
        operations = manifest.operations.len(),
        "Loaded manifest"
    );
    Ok(manifest)
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckRecord {
    checked_at: DateTime<Utc>,
    version: String,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

/// Loads the local manifest and keeps it in sync with the backend.
pub struct ManifestLoader {
    dir: PathBuf,
    base_url: String,
    client: Arc<dyn ApiClient>,
}

impl ManifestLoader {
    /// Creates a loader for `dir`, checking against `base_url`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, base_url: &str, client: Arc<dyn ApiClient>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE_NAME)
    }

    fn check_path(&self) -> PathBuf {
        self.dir.join(CHECK_FILE_NAME)
    }

    /// Loads only the local copy.
    ///
    /// # Errors
    ///
    /// As [`load_file`].
    pub fn load_local(&self) -> Result<Manifest, ManifestError> {
        load_file(&self.manifest_path())
    }

    /// Loads the manifest, refreshing it from the backend when due.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Unavailable`] when there is no usable local
    /// copy and the backend cannot provide one.
    pub async fn load(&self) -> Result<Manifest, ManifestError> {
        self.load_at(Utc::now()).await
    }

    /// As [`ManifestLoader::load`], with an explicit current time.
    ///
    /// # Errors
    ///
    /// See [`ManifestLoader::load`].
    pub async fn load_at(&self, now: DateTime<Utc>) -> Result<Manifest, ManifestError> {
        let local = self.load_local();
        if let Err(e) = &local {
            tracing::debug!(error = %e, "No usable local manifest");
        }

        if local.is_ok() && self.check_is_fresh(now) {
            return local;
        }

        let remote_version = match self.fetch_version().await {
            Ok(version) => version,
            Err(e) => return fall_back(local, &e),
        };
        self.record_check(&remote_version, now);

        if let Ok(manifest) = &local {
            if manifest.version == remote_version {
                return local;
            }
        }

        match self.fetch_manifest().await {
            Ok((manifest, text)) => {
                if let Err(e) = self.save_local(&text) {
                    tracing::warn!(error = %e, "Failed to cache manifest");
                }
                tracing::info!(version = %manifest.version, "Updated manifest");
                Ok(manifest)
            }
            Err(e) => fall_back(local, &e),
        }
    }

    fn check_is_fresh(&self, now: DateTime<Utc>) -> bool {
        let Ok(text) = std::fs::read_to_string(self.check_path()) else {
            return false;
        };
        serde_json::from_str::<CheckRecord>(&text).is_ok_and(|record| {
            let age = now.signed_duration_since(record.checked_at);
            age >= TimeDelta::zero() && age < TimeDelta::seconds(CHECK_INTERVAL_SECS)
        })
    }

    fn record_check(&self, version: &str, now: DateTime<Utc>) {
        let record = CheckRecord {
            checked_at: now,
            version: version.to_string(),
        };
        let result = serde_json::to_string_pretty(&record)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                std::fs::create_dir_all(&self.dir)?;
                std::fs::write(self.check_path(), json)
            });
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to record manifest check");
        }
    }

    fn save_local(&self, text: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.manifest_path(), text)
    }

    async fn fetch_version(&self) -> Result<String, ManifestError> {
        let body = self.fetch(VERSION_ENDPOINT).await?;
        let response: VersionResponse = serde_json::from_slice(&body)
            .map_err(|e| ManifestError::Fetch(format!("invalid version response: {e}")))?;
        Ok(response.version)
    }

    async fn fetch_manifest(&self) -> Result<(Manifest, String), ManifestError> {
        let body = self.fetch(MANIFEST_ENDPOINT).await?;
        let text = String::from_utf8(body)
            .map_err(|_| ManifestError::Fetch("manifest is not UTF-8".to_string()))?;
        let manifest = parse_manifest(&text)?;
        Ok((manifest, text))
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ManifestError> {
        let request = ApiRequest::get(format!("{}{path}", self.base_url));
        let response = self
            .client
            .send(&request)
            .await
            .map_err(|e| ManifestError::Fetch(e.to_string()))?;
        if !response.is_success() {
            return Err(ManifestError::Fetch(format!(
                "{path} returned {}",
                response.status_text()
            )));
        }
        Ok(response.body)
    }
}

fn fall_back(
    local: Result<Manifest, ManifestError>,
    cause: &ManifestError,
) -> Result<Manifest, ManifestError> {
    match local {
        Ok(manifest) => {
            tracing::warn!(error = %cause, "Manifest refresh failed, using local copy");
            Ok(manifest)
        }
        Err(local_err) => Err(ManifestError::Unavailable(format!(
            "{cause} (local copy: {local_err})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResponse;
    use crate::error::CommandError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const V1: &str = "version: \"1\"\ncommands:\n  - command: services/list\n    endpoint: /v1/services\n    method: GET\n";
    const V2: &str = "version: \"2\"\ncommands:\n  - command: clusters/list\n    endpoint: /v1/clusters\n    method: GET\n";

    #[derive(Default)]
    struct FakeBackend {
        routes: HashMap<String, (u16, String)>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn route(mut self, path: &str, status: u16, body: &str) -> Self {
            self.routes
                .insert(format!("http://backend{path}"), (status, body.to_string()));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ApiClient for FakeBackend {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CommandError> {
            self.calls.lock().unwrap().push(request.url.clone());
            self.routes
                .get(&request.url)
                .map(|(status, body)| ApiResponse {
                    status: *status,
                    reason: String::new(),
                    body: body.as_bytes().to_vec(),
                })
                .ok_or_else(|| CommandError::Transport("connection refused".to_string()))
        }
    }

    fn loader(dir: &Path, backend: &Arc<FakeBackend>) -> ManifestLoader {
        ManifestLoader::new(dir, "http://backend/", Arc::clone(backend) as Arc<dyn ApiClient>)
    }

    #[test]
    fn parse_accepts_json() {
        let m = parse_manifest(
            r#"{"version":"3","commands":[{"command":"a","endpoint":"/a","method":"get"}]}"#,
        )
        .unwrap();
        assert_eq!(m.version, "3");
    }

    #[tokio::test]
    async fn fresh_check_skips_network() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE_NAME), V1).unwrap();
        let backend = Arc::new(FakeBackend::default());
        let now = Utc::now();
        let loader = loader(tmp.path(), &backend);
        loader.record_check("1", now);

        let m = loader.load_at(now + TimeDelta::minutes(10)).await.unwrap();
        assert_eq!(m.version, "1");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn new_version_replaces_local_copy() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE_NAME), V1).unwrap();
        let backend = Arc::new(
            FakeBackend::default()
                .route(VERSION_ENDPOINT, 200, r#"{"version":"2"}"#)
                .route(MANIFEST_ENDPOINT, 200, V2),
        );

        let m = loader(tmp.path(), &backend).load().await.unwrap();
        assert_eq!(m.version, "2");
        let saved = std::fs::read_to_string(tmp.path().join(MANIFEST_FILE_NAME)).unwrap();
        assert_eq!(saved, V2);
        assert!(tmp.path().join(CHECK_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn same_version_keeps_local_copy() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE_NAME), V1).unwrap();
        let backend =
            Arc::new(FakeBackend::default().route(VERSION_ENDPOINT, 200, r#"{"version":"1"}"#));

        let m = loader(tmp.path(), &backend).load().await.unwrap();
        assert_eq!(m.version, "1");
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn network_failure_falls_back_to_local() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE_NAME), V1).unwrap();
        let backend = Arc::new(FakeBackend::default());

        let m = loader(tmp.path(), &backend).load().await.unwrap();
        assert_eq!(m.version, "1");
    }

    #[tokio::test]
    async fn no_local_and_no_network_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let backend =
            Arc::new(FakeBackend::default().route(VERSION_ENDPOINT, 503, "unavailable"));

        let err = loader(tmp.path(), &backend).load().await.unwrap_err();
        assert!(matches!(err, ManifestError::Unavailable(_)));
    }
}
