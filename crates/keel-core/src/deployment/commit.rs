//! Commit: transfer and install resources into a container.

use serde::{Deserialize, Serialize};

use super::{ContainerResourceDeploymentItem, TransactionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResourceDeploymentCommitRequest {
    pub transaction_id: TransactionId,
    pub items: Vec<ContainerResourceDeploymentItem>,
}

impl ContainerResourceDeploymentCommitRequest {
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: ContainerResourceDeploymentItem) -> Self {
        self.items.push(item);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerResourceDeploymentCommitStatus {
    Success,
    Failure,
}

/// Outcome of a commit. Failures are data, not errors: the initiator owns
/// any retry decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResourceDeploymentCommitResponse {
    pub transaction_id: TransactionId,
    pub status: ContainerResourceDeploymentCommitStatus,
    pub detail: Option<String>,
}

impl ContainerResourceDeploymentCommitResponse {
    pub fn success(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            status: ContainerResourceDeploymentCommitStatus::Success,
            detail: None,
        }
    }

    /// An empty detail is stored as no detail.
    pub fn failure(transaction_id: TransactionId, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            transaction_id,
            status: ContainerResourceDeploymentCommitStatus::Failure,
            detail: (!detail.is_empty()).then_some(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ContainerResourceDeploymentCommitStatus::Success
    }
}
