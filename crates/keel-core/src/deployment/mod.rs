//! Deployment protocol records exchanged between master and controllers.
//!
//! Every request carries a caller-chosen [`TransactionId`] which responders
//! echo unchanged; the transport may redeliver, so handlers must produce the
//! same effect when invoked twice for the same transaction.

pub mod activity;
pub mod commit;
pub mod query;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fs::ContentSignature;
use crate::resource::NamedVersionedResource;
use crate::version::Version;

pub use activity::{ActivityDeployStatus, LiveActivityDeploymentRequest, LiveActivityDeploymentResponse};
pub use commit::{
    ContainerResourceDeploymentCommitRequest, ContainerResourceDeploymentCommitResponse,
    ContainerResourceDeploymentCommitStatus,
};
pub use query::{
    ContainerResourceDeploymentQueryRequest, ContainerResourceDeploymentQueryResponse,
    QueryResponseStatus, answer_query,
};

/// Correlates asynchronous requests with their responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a resource lands inside a controller's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerResourceLocation {
    /// Loaded by the container itself at the next restart.
    SystemBootstrap,
    /// User libraries; installed and started in the running container.
    UserBootstrap,
    /// Container configuration.
    Config,
    /// System library folder.
    LibSystem,
    /// The container install root.
    Root,
}

impl ContainerResourceLocation {
    pub const ALL: [ContainerResourceLocation; 5] = [
        Self::SystemBootstrap,
        Self::UserBootstrap,
        Self::Config,
        Self::LibSystem,
        Self::Root,
    ];

    /// Whether a resource committed here goes live without a restart.
    pub fn is_immediate_load(self) -> bool {
        matches!(self, Self::UserBootstrap)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SystemBootstrap => "system-bootstrap",
            Self::UserBootstrap => "user-bootstrap",
            Self::Config => "config",
            Self::LibSystem => "lib-system",
            Self::Root => "root",
        }
    }
}

impl fmt::Display for ContainerResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerResourceLocation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|location| location.as_str() == normalized)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown container location '{}' (expected one of: {})",
                    s,
                    Self::ALL.map(Self::as_str).join(", ")
                )
            })
    }
}

/// One resource a controller is asked to materialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResourceDeploymentItem {
    pub name: String,
    pub version: Version,
    pub location: ContainerResourceLocation,
    /// Expected signature of the fetched bytes; `None` skips verification.
    pub signature: Option<ContentSignature>,
    pub source_uri: String,
}

impl ContainerResourceDeploymentItem {
    pub fn new(
        name: impl Into<String>,
        version: Version,
        location: ContainerResourceLocation,
        signature: Option<ContentSignature>,
        source_uri: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            location,
            signature,
            source_uri: source_uri.into(),
        }
    }

    /// Identity is `(name, version)`; the signature only detects change.
    pub fn identity(&self) -> NamedVersionedResource {
        NamedVersionedResource::new(self.name.clone(), self.version.clone())
    }
}
