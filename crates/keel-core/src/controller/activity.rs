//! Controller side of live activity deployment.
//!
//! A deployment runs in two phases whose failures are reported separately:
//! the copy phase fetches the packed activity into the staging folder, the
//! unpack phase extracts it into `<activities>/<uuid>/`. The packed file is
//! removed whatever the outcome.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::deployment::{
    ActivityDeployStatus, LiveActivityDeploymentRequest, LiveActivityDeploymentResponse,
};
use crate::fs::{ContentSignature, ensure_plain_name, tree_signature, unpack_zip};
use crate::transfer::ResourceFetcher;
use crate::version::Version;

/// Metadata file written into each installed activity folder.
pub const ACTIVITY_METADATA_FILE: &str = "activity.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledActivity {
    pub uuid: String,
    pub identifying_name: String,
    pub version: Version,
    pub time_deployed: i64,
    /// Tree signature of the unpacked content, excluding this metadata.
    pub signature: ContentSignature,
}

pub struct LiveActivityInstallationManager<F> {
    fetcher: F,
    staging_dir: PathBuf,
    activities_dir: PathBuf,
    sequence: AtomicU64,
}

impl<F: ResourceFetcher> LiveActivityInstallationManager<F> {
    pub fn new(
        fetcher: F,
        staging_dir: impl Into<PathBuf>,
        activities_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            staging_dir: staging_dir.into(),
            activities_dir: activities_dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn activity_dir(&self, uuid: &str) -> PathBuf {
        self.activities_dir.join(uuid)
    }

    pub async fn handle_deployment_request(
        &self,
        request: &LiveActivityDeploymentRequest,
    ) -> LiveActivityDeploymentResponse {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let packed = match self.copy(request, sequence).await {
            Ok(packed) => packed,
            Err(e) => return self.failure(request, ActivityDeployStatus::FailureCopy, &e),
        };

        let activities_dir = self.activities_dir.clone();
        let unpack_request = request.clone();
        let unpack_source = packed.clone();
        let unpacked = tokio::task::spawn_blocking(move || {
            unpack(&activities_dir, &unpack_request, &unpack_source, sequence)
        })
        .await
        .context("Unpack task failed")
        .and_then(|result| result);

        if let Err(e) = tokio::fs::remove_file(&packed).await {
            tracing::warn!(path = %packed.display(), error = %e, "Failed to remove packed activity");
        }

        match unpacked {
            Ok(activity) => {
                tracing::info!(
                    transaction = %request.transaction_id,
                    uuid = %activity.uuid,
                    name = %activity.identifying_name,
                    version = %activity.version,
                    "Deployed live activity"
                );
                LiveActivityDeploymentResponse {
                    transaction_id: request.transaction_id,
                    uuid: request.uuid.clone(),
                    status: ActivityDeployStatus::Success,
                    detail: None,
                    time_deployed: activity.time_deployed,
                }
            }
            Err(e) => self.failure(request, ActivityDeployStatus::FailureUnpack, &e),
        }
    }

    async fn copy(
        &self,
        request: &LiveActivityDeploymentRequest,
        sequence: u64,
    ) -> anyhow::Result<PathBuf> {
        ensure_plain_name("live activity uuid", &request.uuid)?;
        let uri = Url::parse(&request.activity_source_uri)
            .with_context(|| format!("Invalid activity URI: {}", request.activity_source_uri))?;

        let bytes = self
            .fetcher
            .fetch(&uri)
            .await
            .with_context(|| format!("Failed to fetch live activity from {}", uri))?;

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", self.staging_dir.display()))?;
        let packed = self
            .staging_dir
            .join(format!("{}.{}.activity.zip", request.uuid, sequence));
        tokio::fs::write(&packed, &bytes)
            .await
            .with_context(|| format!("Failed to write packed activity: {}", packed.display()))?;
        Ok(packed)
    }

    fn failure(
        &self,
        request: &LiveActivityDeploymentRequest,
        status: ActivityDeployStatus,
        error: &anyhow::Error,
    ) -> LiveActivityDeploymentResponse {
        let detail = format!("{:#}", error);
        tracing::error!(
            transaction = %request.transaction_id,
            uuid = %request.uuid,
            ?status,
            "Live activity deployment failed: {}",
            detail
        );
        LiveActivityDeploymentResponse {
            transaction_id: request.transaction_id,
            uuid: request.uuid.clone(),
            status,
            detail: Some(detail),
            time_deployed: 0,
        }
    }

    /// Metadata of an installed activity, `None` if it is not installed.
    pub fn installed_activity(&self, uuid: &str) -> anyhow::Result<Option<InstalledActivity>> {
        ensure_plain_name("live activity uuid", uuid)?;
        let path = self.activity_dir(uuid).join(ACTIVITY_METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let activity = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(activity))
    }
}

/// Extract next to the final folder, then swap it in, so a failed unpack
/// leaves any previous install untouched.
fn unpack(
    activities_dir: &Path,
    request: &LiveActivityDeploymentRequest,
    packed: &Path,
    sequence: u64,
) -> anyhow::Result<InstalledActivity> {
    let dest = activities_dir.join(&request.uuid);
    let work = activities_dir.join(format!(".{}.{}.unpacking", request.uuid, sequence));

    let result = extract(request, packed, &work).and_then(|activity| {
        if dest.exists() {
            fs::remove_dir_all(&dest)
                .with_context(|| format!("Failed to remove previous install: {}", dest.display()))?;
        }
        fs::rename(&work, &dest).with_context(|| {
            format!("Failed to move {} to {}", work.display(), dest.display())
        })?;
        Ok(activity)
    });

    if result.is_err() && work.exists() {
        if let Err(e) = fs::remove_dir_all(&work) {
            tracing::warn!(path = %work.display(), error = %e, "Failed to remove partial unpack");
        }
    }
    result
}

fn extract(
    request: &LiveActivityDeploymentRequest,
    packed: &Path,
    work: &Path,
) -> anyhow::Result<InstalledActivity> {
    let file = fs::File::open(packed)
        .with_context(|| format!("Failed to open packed activity: {}", packed.display()))?;
    let files = unpack_zip(file, work)
        .with_context(|| format!("Failed to unpack live activity {}", request.uuid))?;
    let signature = tree_signature(work)?;

    let activity = InstalledActivity {
        uuid: request.uuid.clone(),
        identifying_name: request.identifying_name.clone(),
        version: request.version.clone(),
        time_deployed: chrono::Utc::now().timestamp_millis(),
        signature,
    };

    let metadata = work.join(ACTIVITY_METADATA_FILE);
    let content = serde_json::to_string_pretty(&activity)
        .context("Failed to serialize activity metadata")?;
    fs::write(&metadata, content)
        .with_context(|| format!("Failed to write {}", metadata.display()))?;

    tracing::debug!(uuid = %request.uuid, files, "Unpacked live activity");
    Ok(activity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::TransactionId;
    use crate::transfer::UriResourceFetcher;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn activity_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            for (name, content) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    fn manager(tmp: &TempDir) -> LiveActivityInstallationManager<UriResourceFetcher> {
        LiveActivityInstallationManager::new(
            UriResourceFetcher::new().unwrap(),
            tmp.path().join("staging"),
            tmp.path().join("activities"),
        )
    }

    fn request(uuid: &str, uri: String) -> LiveActivityDeploymentRequest {
        LiveActivityDeploymentRequest {
            transaction_id: TransactionId(12),
            uuid: uuid.to_string(),
            identifying_name: "com.example.pong".to_string(),
            version: Version::new(1, 0, 0),
            activity_source_uri: uri,
        }
    }

    fn published(tmp: &TempDir, bytes: &[u8]) -> String {
        let path = tmp.path().join("pong.zip");
        fs::write(&path, bytes).unwrap();
        Url::from_file_path(&path).unwrap().to_string()
    }

    #[tokio::test]
    async fn test_copy_failure_is_retryable() {
        let tmp = TempDir::new().unwrap();
        let missing = Url::from_file_path(tmp.path().join("nope.zip")).unwrap().to_string();

        let response = manager(&tmp)
            .handle_deployment_request(&request("u1", missing))
            .await;

        assert_eq!(response.status, ActivityDeployStatus::FailureCopy);
        assert!(response.status.is_retryable());
        assert_eq!(response.time_deployed, 0);
        assert!(response.detail.is_some());
    }

    #[tokio::test]
    async fn test_bad_archive_is_unpack_failure() {
        let tmp = TempDir::new().unwrap();
        let uri = published(&tmp, b"definitely not a zip");

        let response = manager(&tmp)
            .handle_deployment_request(&request("u2", uri))
            .await;

        assert_eq!(response.status, ActivityDeployStatus::FailureUnpack);
        assert!(!response.status.is_retryable());
        assert_eq!(response.time_deployed, 0);
        let staging: Vec<_> = fs::read_dir(tmp.path().join("staging")).unwrap().collect();
        assert!(staging.is_empty());
    }

    #[tokio::test]
    async fn test_uuid_with_path_is_copy_failure() {
        let tmp = TempDir::new().unwrap();
        let uri = published(&tmp, &activity_zip(&[("a.txt", "a")]));

        let response = manager(&tmp)
            .handle_deployment_request(&request("../escape", uri))
            .await;

        assert_eq!(response.status, ActivityDeployStatus::FailureCopy);
    }

    #[tokio::test]
    async fn test_failed_redeploy_keeps_previous_install() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp);
        let good = published(&tmp, &activity_zip(&[("a.txt", "a")]));
        assert!(
            manager
                .handle_deployment_request(&request("u3", good))
                .await
                .is_success()
        );

        let bad = published(&tmp, &activity_zip(&[("../evil.txt", "x")]));
        let response = manager.handle_deployment_request(&request("u3", bad)).await;

        assert_eq!(response.status, ActivityDeployStatus::FailureUnpack);
        assert_eq!(
            fs::read_to_string(manager.activity_dir("u3").join("a.txt")).unwrap(),
            "a"
        );
        assert!(!tmp.path().join("activities").join("evil.txt").exists());
    }
}
