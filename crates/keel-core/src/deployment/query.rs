//! Availability queries: does a container already satisfy a set of
//! dependencies?

use serde::{Deserialize, Serialize};

use super::TransactionId;
use crate::resource::{NamedVersionedResourceCollection, ResourceDependency};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResourceDeploymentQueryRequest {
    pub transaction_id: TransactionId,
    pub queries: Vec<ResourceDependency>,
}

impl ContainerResourceDeploymentQueryRequest {
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            queries: Vec::new(),
        }
    }

    pub fn with_query(mut self, dependency: ResourceDependency) -> Self {
        self.queries.push(dependency);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryResponseStatus {
    /// Every queried dependency is met.
    SpecificQuerySatisfied,
    /// At least one queried dependency is unmet.
    SpecificQueryNotSatisfied,
    /// Answer to an unscoped inventory query.
    GeneralQueryResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResourceDeploymentQueryResponse {
    pub transaction_id: TransactionId,
    pub status: QueryResponseStatus,
}

/// Answer a query against the resources a container currently holds.
///
/// Stateless: answering the same request twice yields the same response.
/// A request with no queries is trivially satisfied.
pub fn answer_query<T>(
    request: &ContainerResourceDeploymentQueryRequest,
    resources: &NamedVersionedResourceCollection<T>,
) -> ContainerResourceDeploymentQueryResponse {
    let unmet: Vec<&ResourceDependency> = request
        .queries
        .iter()
        .filter(|query| {
            resources
                .get_resource_in_range(&query.name, &query.version_range)
                .is_none()
        })
        .collect();

    let status = if unmet.is_empty() {
        QueryResponseStatus::SpecificQuerySatisfied
    } else {
        tracing::debug!(
            transaction = %request.transaction_id,
            unmet = ?unmet.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "Resource query not satisfied"
        );
        QueryResponseStatus::SpecificQueryNotSatisfied
    };

    ContainerResourceDeploymentQueryResponse {
        transaction_id: request.transaction_id,
        status,
    }
}
