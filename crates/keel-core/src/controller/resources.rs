//! Controller side of the query and commit protocols.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use url::Url;

use crate::container::{ContainerResourceInstaller, InstallOutcome, ModuleContainer};
use crate::deployment::{
    ContainerResourceDeploymentCommitRequest, ContainerResourceDeploymentCommitResponse,
    ContainerResourceDeploymentItem, ContainerResourceDeploymentQueryRequest,
    ContainerResourceDeploymentQueryResponse, answer_query,
};
use crate::fs::{ContentSignature, ensure_plain_name};
use crate::transfer::ResourceFetcher;

/// Answers resource queries and executes commits against one container.
pub struct ContainerResourceDeploymentManager<C, F> {
    installer: Arc<ContainerResourceInstaller<C>>,
    fetcher: F,
    staging_dir: PathBuf,
    staged: AtomicU64,
}

impl<C, F> ContainerResourceDeploymentManager<C, F>
where
    C: ModuleContainer + 'static,
    F: ResourceFetcher,
{
    pub fn new(
        installer: Arc<ContainerResourceInstaller<C>>,
        fetcher: F,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            installer,
            fetcher,
            staging_dir: staging_dir.into(),
            staged: AtomicU64::new(0),
        }
    }

    pub fn installer(&self) -> &Arc<ContainerResourceInstaller<C>> {
        &self.installer
    }

    pub fn query_resources(
        &self,
        request: &ContainerResourceDeploymentQueryRequest,
    ) -> ContainerResourceDeploymentQueryResponse {
        let response = answer_query(request, &self.installer.resources());
        tracing::info!(transaction = %request.transaction_id, status = ?response.status, "Answered resource query");
        response
    }

    /// Fetch, verify and install every item in order.
    ///
    /// Stops at the first item that fails and reports it as the failure
    /// detail. Items installed before the failure stay installed; running
    /// the same commit again skips them as unchanged.
    pub async fn commit_resources(
        &self,
        request: &ContainerResourceDeploymentCommitRequest,
    ) -> ContainerResourceDeploymentCommitResponse {
        for item in &request.items {
            match self.commit_item(item).await {
                Ok(outcome) => {
                    tracing::debug!(transaction = %request.transaction_id, resource = %item.identity(), ?outcome, "Committed resource");
                }
                Err(e) => {
                    let detail = format!("Could not deploy {}: {:#}", item.identity(), e);
                    tracing::error!(transaction = %request.transaction_id, "{}", detail);
                    return ContainerResourceDeploymentCommitResponse::failure(
                        request.transaction_id,
                        detail,
                    );
                }
            }
        }

        tracing::info!(transaction = %request.transaction_id, items = request.items.len(), "Committed resources");
        ContainerResourceDeploymentCommitResponse::success(request.transaction_id)
    }

    async fn commit_item(
        &self,
        item: &ContainerResourceDeploymentItem,
    ) -> anyhow::Result<InstallOutcome> {
        ensure_plain_name("resource name", &item.name)?;
        let uri = Url::parse(&item.source_uri)
            .with_context(|| format!("Invalid source URI: {}", item.source_uri))?;

        let bytes = self
            .fetcher
            .fetch(&uri)
            .await
            .with_context(|| format!("Failed to fetch {}", uri))?;

        if let Some(expected) = &item.signature {
            let actual = ContentSignature::of_bytes(&bytes);
            if &actual != expected {
                anyhow::bail!(
                    "Signature mismatch for {}: expected {}, fetched content is {}",
                    uri,
                    expected,
                    actual
                );
            }
        }

        let staged = self.staging_dir.join(format!(
            "{}-{}.{}.staged",
            item.name,
            item.version,
            self.staged.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", self.staging_dir.display()))?;
        tokio::fs::write(&staged, &bytes)
            .await
            .with_context(|| format!("Failed to stage resource: {}", staged.display()))?;

        let installer = Arc::clone(&self.installer);
        let identity = item.identity();
        let location = item.location;
        let payload = staged.clone();
        let result =
            tokio::task::spawn_blocking(move || installer.install(&identity, &payload, location))
                .await
                .context("Install task failed")?;

        if let Err(e) = tokio::fs::remove_file(&staged).await {
            tracing::warn!(path = %staged.display(), error = %e, "Failed to remove staged resource");
        }

        Ok(result?.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerLayout, LocalModuleHost};
    use crate::deployment::{
        ContainerResourceDeploymentCommitStatus, ContainerResourceLocation, QueryResponseStatus,
        TransactionId,
    };
    use crate::resource::{NamedVersionedResource, ResourceDependency};
    use crate::transfer::UriResourceFetcher;
    use crate::version::{Version, VersionRange};
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        manager: ContainerResourceDeploymentManager<LocalModuleHost, UriResourceFetcher>,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let layout = ContainerLayout::new(tmp.path().join("container"), None);
        let installer = ContainerResourceInstaller::open(LocalModuleHost::new(), layout).unwrap();
        let manager = ContainerResourceDeploymentManager::new(
            Arc::new(installer),
            UriResourceFetcher::new().unwrap(),
            tmp.path().join("staging"),
        );
        Fixture { tmp, manager }
    }

    fn source(tmp: &TempDir, name: &str, content: &str) -> String {
        let path = tmp.path().join(name);
        std::fs::write(&path, content).unwrap();
        Url::from_file_path(&path).unwrap().to_string()
    }

    fn item(name: &str, version: &str, uri: String, content: Option<&str>) -> ContainerResourceDeploymentItem {
        ContainerResourceDeploymentItem::new(
            name,
            Version::parse(version).unwrap(),
            ContainerResourceLocation::UserBootstrap,
            content.map(|c| ContentSignature::of_bytes(c.as_bytes())),
            uri,
        )
    }

    #[tokio::test]
    async fn test_commit_then_query_is_satisfied() {
        let f = fixture();
        let uri = source(&f.tmp, "json.bundle", "json");
        let request = ContainerResourceDeploymentCommitRequest::new(TransactionId(1))
            .with_item(item("json", "2.1.0", uri, Some("json")));

        let response = f.manager.commit_resources(&request).await;
        assert_eq!(response, ContainerResourceDeploymentCommitResponse::success(TransactionId(1)));

        let query = ContainerResourceDeploymentQueryRequest::new(TransactionId(2)).with_query(
            ResourceDependency::new("json", VersionRange::parse("[2.0, 3.0)").unwrap()),
        );
        assert_eq!(
            f.manager.query_resources(&query).status,
            QueryResponseStatus::SpecificQuerySatisfied
        );
    }

    #[tokio::test]
    async fn test_signature_mismatch_fails_without_installing() {
        let f = fixture();
        let uri = source(&f.tmp, "json.bundle", "tampered");
        let request = ContainerResourceDeploymentCommitRequest::new(TransactionId(3))
            .with_item(item("json", "2.1.0", uri, Some("json")));

        let response = f.manager.commit_resources(&request).await;

        assert_eq!(response.status, ContainerResourceDeploymentCommitStatus::Failure);
        assert!(response.detail.unwrap().contains("Signature mismatch"));
        let identity = NamedVersionedResource::new("json", Version::new(2, 1, 0));
        assert!(f.manager.installer().installed(&identity).is_none());
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let f = fixture();
        let good = source(&f.tmp, "a.bundle", "a");
        let missing = Url::from_file_path(f.tmp.path().join("missing.bundle"))
            .unwrap()
            .to_string();
        let later = source(&f.tmp, "c.bundle", "c");
        let request = ContainerResourceDeploymentCommitRequest::new(TransactionId(4))
            .with_item(item("a", "1.0", good, None))
            .with_item(item("b", "1.0", missing, None))
            .with_item(item("c", "1.0", later, None));

        let response = f.manager.commit_resources(&request).await;

        assert_eq!(response.transaction_id, TransactionId(4));
        assert!(!response.is_success());
        assert!(response.detail.unwrap().contains("b-1.0.0"));
        let resources = f.manager.installer().resources();
        assert!(resources.get_highest_resource("a").is_some());
        assert!(resources.get_highest_resource("c").is_none());
    }

    #[tokio::test]
    async fn test_redelivered_commit_is_harmless() {
        let f = fixture();
        let uri = source(&f.tmp, "a.bundle", "a");
        let request = ContainerResourceDeploymentCommitRequest::new(TransactionId(5))
            .with_item(item("a", "1.0", uri, Some("a")));

        let first = f.manager.commit_resources(&request).await;
        let second = f.manager.commit_resources(&request).await;

        assert_eq!(first, second);
        assert!(second.is_success());
        assert_eq!(f.manager.installer().container().modules().len(), 1);
        let staging: Vec<_> = std::fs::read_dir(f.tmp.path().join("staging"))
            .unwrap()
            .collect();
        assert!(staging.is_empty());
    }

    #[tokio::test]
    async fn test_path_like_name_is_rejected() {
        let f = fixture();
        let uri = source(&f.tmp, "a.bundle", "a");
        let request = ContainerResourceDeploymentCommitRequest::new(TransactionId(6))
            .with_item(item("../a", "1.0", uri, None));

        let response = f.manager.commit_resources(&request).await;
        assert!(response.detail.unwrap().contains("Illegal resource name"));
    }
}
