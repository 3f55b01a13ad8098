//! Deployment of a single live activity package.

use serde::{Deserialize, Serialize};

use super::TransactionId;
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveActivityDeploymentRequest {
    pub transaction_id: TransactionId,
    pub uuid: String,
    pub identifying_name: String,
    pub version: Version,
    pub activity_source_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityDeployStatus {
    Success,
    /// The package bytes could not be retrieved.
    FailureCopy,
    /// The bytes were retrieved but could not be unpacked or installed.
    FailureUnpack,
}

impl ActivityDeployStatus {
    /// Only retrieval failures are plausibly transient.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::FailureCopy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveActivityDeploymentResponse {
    pub transaction_id: TransactionId,
    pub uuid: String,
    pub status: ActivityDeployStatus,
    pub detail: Option<String>,
    /// Epoch millis of the install, `0` when it did not happen.
    pub time_deployed: i64,
}

impl LiveActivityDeploymentResponse {
    pub fn is_success(&self) -> bool {
        self.status == ActivityDeployStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_copy_failures_are_retryable() {
        assert!(ActivityDeployStatus::FailureCopy.is_retryable());
        assert!(!ActivityDeployStatus::FailureUnpack.is_retryable());
        assert!(!ActivityDeployStatus::Success.is_retryable());
    }
}
