//! Master-side deployment of live activities to a controller.
//!
//! The coordinator is a state machine driven by the caller: starting a
//! deployment or feeding it a controller response yields a [`Step`] telling
//! the caller what to send next and whether the deployment finished. It
//! performs no I/O of its own and keeps no timers; transactions that never
//! receive a response stay pending until the caller gives up on them.

use std::collections::HashMap;

use super::repository::ResourceRepository;
use super::satisfy::satisfy_dependencies;
use super::transaction::TransactionIdGenerator;
use crate::config::KeelConfig;
use crate::deployment::{
    ContainerResourceDeploymentCommitRequest, ContainerResourceDeploymentCommitResponse,
    ContainerResourceDeploymentCommitStatus, ContainerResourceDeploymentQueryRequest,
    ContainerResourceDeploymentQueryResponse, LiveActivityDeploymentRequest,
    LiveActivityDeploymentResponse, QueryResponseStatus, TransactionId,
};
use crate::error::WireError;
use crate::resource::ResourceDependency;
use crate::version::Version;
use crate::wire::{ControllerResponse, Frame, WireMessage};

/// A live activity to deploy, with the shared resources it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveActivityDeployment {
    pub uuid: String,
    pub identifying_name: String,
    pub version: Version,
    pub activity_source_uri: String,
    pub dependencies: Vec<ResourceDependency>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    QueryingDependencies,
    SatisfyingDependencies,
    DeployingActivity,
    Complete,
}

/// A message for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Query(ContainerResourceDeploymentQueryRequest),
    Commit(ContainerResourceDeploymentCommitRequest),
    Deploy(LiveActivityDeploymentRequest),
}

impl Outbound {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            Self::Query(request) => request.transaction_id,
            Self::Commit(request) => request.transaction_id,
            Self::Deploy(request) => request.transaction_id,
        }
    }

    pub fn to_frame(&self) -> Result<Frame, WireError> {
        match self {
            Self::Query(request) => request.to_frame(),
            Self::Commit(request) => request.to_frame(),
            Self::Deploy(request) => request.to_frame(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    /// The controller answered the activity deployment; the response
    /// carries success or the failing phase.
    Activity(LiveActivityDeploymentResponse),
    /// Dependencies could not be resolved or the commit failed, so the
    /// activity itself was never sent.
    DependenciesNotSatisfied { detail: Option<String> },
}

/// What the caller should do after an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Step {
    pub outbound: Option<Outbound>,
    pub outcome: Option<DeploymentOutcome>,
}

impl Step {
    fn idle() -> Self {
        Self::default()
    }

    fn send(outbound: Outbound) -> Self {
        Self {
            outbound: Some(outbound),
            outcome: None,
        }
    }

    fn finish(outcome: DeploymentOutcome) -> Self {
        Self {
            outbound: None,
            outcome: Some(outcome),
        }
    }
}

#[derive(Debug)]
struct Transaction {
    deployment: LiveActivityDeployment,
    state: DeploymentState,
}

#[derive(Debug)]
pub struct DeploymentCoordinator {
    repository: ResourceRepository,
    ids: TransactionIdGenerator,
    always_send_dependencies: bool,
    transactions: HashMap<TransactionId, Transaction>,
}

impl DeploymentCoordinator {
    /// With `always_send_dependencies` the query round trip is skipped and
    /// dependencies are committed unconditionally; the controller treats
    /// identical content as already installed.
    pub fn new(
        repository: ResourceRepository,
        ids: TransactionIdGenerator,
        always_send_dependencies: bool,
    ) -> Self {
        Self {
            repository,
            ids,
            always_send_dependencies,
            transactions: HashMap::new(),
        }
    }

    /// Coordinator over the configured repository, honouring
    /// `[deployment] always_send_dependencies`.
    pub fn from_config(config: &KeelConfig) -> anyhow::Result<Self> {
        let Some(repository) = &config.repository else {
            anyhow::bail!("No [repository] section in configuration");
        };
        Ok(Self::new(
            ResourceRepository::from_config(repository)?,
            TransactionIdGenerator::new(),
            config.deployment.always_send_dependencies,
        ))
    }

    pub fn always_send_dependencies(&self) -> bool {
        self.always_send_dependencies
    }

    pub fn repository(&self) -> &ResourceRepository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut ResourceRepository {
        &mut self.repository
    }

    pub fn state(&self, transaction_id: TransactionId) -> Option<DeploymentState> {
        self.transactions.get(&transaction_id).map(|t| t.state)
    }

    /// Transactions still waiting on the controller.
    pub fn pending(&self) -> Vec<TransactionId> {
        let mut pending: Vec<_> = self
            .transactions
            .iter()
            .filter(|(_, t)| t.state != DeploymentState::Complete)
            .map(|(id, _)| *id)
            .collect();
        pending.sort();
        pending
    }

    /// Forget completed transactions. Responses redelivered for them
    /// afterwards are ignored as unknown.
    pub fn purge_completed(&mut self) -> usize {
        let before = self.transactions.len();
        self.transactions
            .retain(|_, t| t.state != DeploymentState::Complete);
        before - self.transactions.len()
    }

    /// Start deploying an activity.
    ///
    /// Fails without starting a transaction when dependencies must be sent
    /// and the repository cannot satisfy them.
    pub fn deploy_live_activity(
        &mut self,
        deployment: LiveActivityDeployment,
    ) -> anyhow::Result<(TransactionId, Outbound)> {
        let transaction_id = self.ids.next_id();

        let (state, outbound) = if deployment.dependencies.is_empty() {
            (
                DeploymentState::DeployingActivity,
                Outbound::Deploy(deploy_request(transaction_id, &deployment)),
            )
        } else if self.always_send_dependencies {
            let items = satisfy_dependencies(&self.repository, &deployment.dependencies)?;
            (
                DeploymentState::SatisfyingDependencies,
                Outbound::Commit(ContainerResourceDeploymentCommitRequest {
                    transaction_id,
                    items,
                }),
            )
        } else {
            (
                DeploymentState::QueryingDependencies,
                Outbound::Query(ContainerResourceDeploymentQueryRequest {
                    transaction_id,
                    queries: deployment.dependencies.clone(),
                }),
            )
        };

        tracing::info!(
            transaction = %transaction_id,
            uuid = %deployment.uuid,
            name = %deployment.identifying_name,
            ?state,
            "Starting live activity deployment"
        );
        self.transactions
            .insert(transaction_id, Transaction { deployment, state });
        Ok((transaction_id, outbound))
    }

    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Step, WireError> {
        Ok(match ControllerResponse::from_frame(frame)? {
            ControllerResponse::Query(response) => self.handle_query_response(&response),
            ControllerResponse::Commit(response) => self.handle_commit_response(&response),
            ControllerResponse::DeployActivity(response) => self.handle_deploy_response(&response),
        })
    }

    pub fn handle_query_response(
        &mut self,
        response: &ContainerResourceDeploymentQueryResponse,
    ) -> Step {
        let transaction_id = response.transaction_id;
        let Some(transaction) =
            expecting(&mut self.transactions, transaction_id, DeploymentState::QueryingDependencies)
        else {
            return Step::idle();
        };

        match response.status {
            QueryResponseStatus::SpecificQuerySatisfied => {
                tracing::info!(transaction = %transaction_id, "Controller already has dependencies");
                transaction.state = DeploymentState::DeployingActivity;
                Step::send(Outbound::Deploy(deploy_request(
                    transaction_id,
                    &transaction.deployment,
                )))
            }
            QueryResponseStatus::SpecificQueryNotSatisfied => {
                match satisfy_dependencies(&self.repository, &transaction.deployment.dependencies)
                {
                    Ok(items) => {
                        tracing::info!(transaction = %transaction_id, items = items.len(), "Sending dependencies");
                        transaction.state = DeploymentState::SatisfyingDependencies;
                        Step::send(Outbound::Commit(ContainerResourceDeploymentCommitRequest {
                            transaction_id,
                            items,
                        }))
                    }
                    Err(e) => {
                        let detail = format!("{:#}", e);
                        tracing::error!(transaction = %transaction_id, "{}", detail);
                        transaction.state = DeploymentState::Complete;
                        Step::finish(DeploymentOutcome::DependenciesNotSatisfied {
                            detail: Some(detail),
                        })
                    }
                }
            }
            QueryResponseStatus::GeneralQueryResponse => {
                tracing::warn!(transaction = %transaction_id, "Ignoring general query response to a dependency query");
                Step::idle()
            }
        }
    }

    pub fn handle_commit_response(
        &mut self,
        response: &ContainerResourceDeploymentCommitResponse,
    ) -> Step {
        let transaction_id = response.transaction_id;
        let Some(transaction) =
            expecting(&mut self.transactions, transaction_id, DeploymentState::SatisfyingDependencies)
        else {
            return Step::idle();
        };

        match response.status {
            ContainerResourceDeploymentCommitStatus::Success => {
                transaction.state = DeploymentState::DeployingActivity;
                Step::send(Outbound::Deploy(deploy_request(
                    transaction_id,
                    &transaction.deployment,
                )))
            }
            ContainerResourceDeploymentCommitStatus::Failure => {
                tracing::error!(
                    transaction = %transaction_id,
                    detail = response.detail.as_deref().unwrap_or(""),
                    "Controller could not install dependencies"
                );
                transaction.state = DeploymentState::Complete;
                Step::finish(DeploymentOutcome::DependenciesNotSatisfied {
                    detail: response.detail.clone(),
                })
            }
        }
    }

    pub fn handle_deploy_response(&mut self, response: &LiveActivityDeploymentResponse) -> Step {
        let transaction_id = response.transaction_id;
        let Some(transaction) =
            expecting(&mut self.transactions, transaction_id, DeploymentState::DeployingActivity)
        else {
            return Step::idle();
        };

        if transaction.deployment.uuid != response.uuid {
            tracing::warn!(
                transaction = %transaction_id,
                expected = %transaction.deployment.uuid,
                received = %response.uuid,
                "Ignoring deployment response for another activity"
            );
            return Step::idle();
        }

        tracing::info!(transaction = %transaction_id, status = ?response.status, "Live activity deployment finished");
        transaction.state = DeploymentState::Complete;
        Step::finish(DeploymentOutcome::Activity(response.clone()))
    }
}

/// The transaction if it is waiting in `state`; anything else is a
/// duplicate or stray response.
fn expecting(
    transactions: &mut HashMap<TransactionId, Transaction>,
    transaction_id: TransactionId,
    state: DeploymentState,
) -> Option<&mut Transaction> {
    match transactions.get_mut(&transaction_id) {
        Some(transaction) if transaction.state == state => Some(transaction),
        Some(transaction) => {
            tracing::info!(
                transaction = %transaction_id,
                current = ?transaction.state,
                expected = ?state,
                "Ignoring response that does not match deployment state"
            );
            None
        }
        None => {
            tracing::info!(transaction = %transaction_id, "Ignoring response for unknown transaction");
            None
        }
    }
}

fn deploy_request(
    transaction_id: TransactionId,
    deployment: &LiveActivityDeployment,
) -> LiveActivityDeploymentRequest {
    LiveActivityDeploymentRequest {
        transaction_id,
        uuid: deployment.uuid.clone(),
        identifying_name: deployment.identifying_name.clone(),
        version: deployment.version.clone(),
        activity_source_uri: deployment.activity_source_uri.clone(),
    }
}
