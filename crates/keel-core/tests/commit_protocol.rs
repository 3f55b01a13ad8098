use std::sync::Arc;

use keel_core::container::{ContainerLayout, ContainerResourceInstaller, LocalModuleHost};
use keel_core::controller::ContainerResourceDeploymentManager;
use keel_core::deployment::{
    ContainerResourceDeploymentCommitRequest, ContainerResourceDeploymentCommitResponse,
    ContainerResourceDeploymentCommitStatus, ContainerResourceDeploymentItem,
    ContainerResourceDeploymentQueryRequest, ContainerResourceLocation, QueryResponseStatus,
    TransactionId,
};
use keel_core::fs::ContentSignature;
use keel_core::resource::{NamedVersionedResource, ResourceDependency};
use keel_core::transfer::UriResourceFetcher;
use keel_core::version::{Version, VersionRange};
use keel_core::wire::WireMessage;
use tempfile::TempDir;
use url::Url;

type Manager = ContainerResourceDeploymentManager<LocalModuleHost, UriResourceFetcher>;

fn open(tmp: &TempDir) -> Manager {
    let layout = ContainerLayout::new(tmp.path().join("container"), None);
    let installer = ContainerResourceInstaller::open(LocalModuleHost::new(), layout).unwrap();
    ContainerResourceDeploymentManager::new(
        Arc::new(installer),
        UriResourceFetcher::new().unwrap(),
        tmp.path().join("staging"),
    )
}

fn publish(tmp: &TempDir, file_name: &str, content: &[u8]) -> String {
    let dir = tmp.path().join("published");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    std::fs::write(&path, content).unwrap();
    Url::from_file_path(&path).unwrap().to_string()
}

fn item(
    tmp: &TempDir,
    name: &str,
    version: &str,
    location: ContainerResourceLocation,
) -> ContainerResourceDeploymentItem {
    let content = format!("{name} {version}").into_bytes();
    let uri = publish(tmp, &format!("{name}-{version}.bundle"), &content);
    ContainerResourceDeploymentItem::new(
        name,
        Version::parse(version).unwrap(),
        location,
        Some(ContentSignature::of_bytes(&content)),
        uri,
    )
}

fn query(name: &str, range: &str) -> ContainerResourceDeploymentQueryRequest {
    ContainerResourceDeploymentQueryRequest::new(TransactionId(99)).with_query(
        ResourceDependency::new(name, VersionRange::parse(range).unwrap()),
    )
}

#[test]
fn commit_response_round_trips_through_the_wire() {
    let details = [None, Some(""), Some("Could not deploy util-1.0.0: disk full")];

    for status in [
        ContainerResourceDeploymentCommitStatus::Success,
        ContainerResourceDeploymentCommitStatus::Failure,
    ] {
        for detail in details {
            let response = ContainerResourceDeploymentCommitResponse {
                transaction_id: TransactionId(-3),
                status,
                detail: detail.map(str::to_string),
            };
            let decoded =
                ContainerResourceDeploymentCommitResponse::decode(&response.encode().unwrap())
                    .unwrap();

            // The empty string is the wire's "no detail".
            let expected = ContainerResourceDeploymentCommitResponse {
                detail: detail.filter(|d| !d.is_empty()).map(str::to_string),
                ..response
            };
            assert_eq!(decoded, expected, "{status:?} {detail:?}");
        }
    }
}

#[tokio::test]
async fn bootstrap_items_are_staged_until_restart() {
    let tmp = TempDir::new().unwrap();
    let staged = item(&tmp, "platform", "2.1.0", ContainerResourceLocation::SystemBootstrap);
    let identity = staged.identity();

    {
        let manager = open(&tmp);
        let request = ContainerResourceDeploymentCommitRequest::new(TransactionId(1))
            .with_item(staged.clone());
        assert!(manager.commit_resources(&request).await.is_success());

        let record = manager.installer().installed(&identity).unwrap();
        assert!(record.handle.is_none());
        assert!(record.path.ends_with("bootstrap/platform-2.1.0.bundle"));
        assert!(manager.installer().container().modules().is_empty());
    }

    let reopened = open(&tmp);
    let record = reopened.installer().installed(&identity).unwrap();
    assert_eq!(record.location, ContainerResourceLocation::SystemBootstrap);
    let handle = record.handle.unwrap();
    assert!(reopened.installer().container().is_started(&handle));
    assert_eq!(
        reopened.query_resources(&query("platform", "[2.0, 3.0)")).status,
        QueryResponseStatus::SpecificQuerySatisfied
    );
}

#[tokio::test]
async fn unmonitored_locations_do_not_satisfy_queries() {
    let tmp = TempDir::new().unwrap();
    let manager = open(&tmp);
    let request = ContainerResourceDeploymentCommitRequest::new(TransactionId(2))
        .with_item(item(&tmp, "native", "1.0.0", ContainerResourceLocation::LibSystem))
        .with_item(item(&tmp, "launcher", "1.0.0", ContainerResourceLocation::Root));

    assert!(manager.commit_resources(&request).await.is_success());
    assert!(tmp.path().join("container/lib/system/native-1.0.0.bundle").is_file());
    assert!(tmp.path().join("container/launcher-1.0.0.bundle").is_file());

    for name in ["native", "launcher"] {
        assert_eq!(
            manager.query_resources(&query(name, "1.0")).status,
            QueryResponseStatus::SpecificQueryNotSatisfied
        );
    }
}

#[tokio::test]
async fn recommitting_new_content_replaces_the_module() {
    let tmp = TempDir::new().unwrap();
    let manager = open(&tmp);
    let identity = NamedVersionedResource::new("util", Version::new(1, 0, 0));

    let first = item(&tmp, "util", "1.0.0", ContainerResourceLocation::UserBootstrap);
    let request = ContainerResourceDeploymentCommitRequest::new(TransactionId(3)).with_item(first);
    assert!(manager.commit_resources(&request).await.is_success());
    let old = manager.installer().installed(&identity).unwrap().handle.unwrap();

    let content = b"util 1.0.0 rebuilt";
    let rebuilt = ContainerResourceDeploymentItem::new(
        "util",
        Version::new(1, 0, 0),
        ContainerResourceLocation::UserBootstrap,
        Some(ContentSignature::of_bytes(content)),
        publish(&tmp, "util-rebuilt.bundle", content),
    );
    let request =
        ContainerResourceDeploymentCommitRequest::new(TransactionId(4)).with_item(rebuilt);
    assert!(manager.commit_resources(&request).await.is_success());

    let new = manager.installer().installed(&identity).unwrap().handle.unwrap();
    let host = manager.installer().container();
    assert_ne!(old, new);
    assert!(!host.is_installed(&old));
    assert!(host.is_started(&new));
    assert_eq!(host.modules().len(), 1);
}

#[tokio::test]
async fn unsigned_items_skip_verification() {
    let tmp = TempDir::new().unwrap();
    let manager = open(&tmp);
    let unsigned = ContainerResourceDeploymentItem::new(
        "loose",
        Version::new(0, 3, 0),
        ContainerResourceLocation::UserBootstrap,
        None,
        publish(&tmp, "loose.bundle", b"whatever"),
    );
    let request =
        ContainerResourceDeploymentCommitRequest::new(TransactionId(5)).with_item(unsigned);

    let response = manager.commit_resources(&request).await;
    assert!(response.is_success(), "{:?}", response.detail);
    assert_eq!(
        manager.query_resources(&query("loose", "[0.3.0, 0.3.0]")).status,
        QueryResponseStatus::SpecificQuerySatisfied
    );
}
