//! A controller's bus endpoint.

use tokio::sync::mpsc;

use super::activity::LiveActivityInstallationManager;
use super::resources::ContainerResourceDeploymentManager;
use crate::container::ModuleContainer;
use crate::error::WireError;
use crate::transfer::ResourceFetcher;
use crate::wire::{ControllerRequest, ControllerResponse, Frame};

/// Decodes requests, dispatches them to the deployment handlers and encodes
/// the responses. Keeps no per-transaction state, so a redelivered request
/// is simply handled again.
pub struct ControllerNode<C, F> {
    resources: ContainerResourceDeploymentManager<C, F>,
    activities: LiveActivityInstallationManager<F>,
}

impl<C, F> ControllerNode<C, F>
where
    C: ModuleContainer + 'static,
    F: ResourceFetcher,
{
    pub fn new(
        resources: ContainerResourceDeploymentManager<C, F>,
        activities: LiveActivityInstallationManager<F>,
    ) -> Self {
        Self {
            resources,
            activities,
        }
    }

    pub fn resources(&self) -> &ContainerResourceDeploymentManager<C, F> {
        &self.resources
    }

    pub fn activities(&self) -> &LiveActivityInstallationManager<F> {
        &self.activities
    }

    pub async fn handle_request(&self, request: ControllerRequest) -> ControllerResponse {
        match request {
            ControllerRequest::Query(query) => {
                ControllerResponse::Query(self.resources.query_resources(&query))
            }
            ControllerRequest::Commit(commit) => {
                ControllerResponse::Commit(self.resources.commit_resources(&commit).await)
            }
            ControllerRequest::DeployActivity(deploy) => ControllerResponse::DeployActivity(
                self.activities.handle_deployment_request(&deploy).await,
            ),
        }
    }

    pub async fn handle_frame(&self, frame: &Frame) -> Result<Frame, WireError> {
        let request = ControllerRequest::from_frame(frame)?;
        self.handle_request(request).await.to_frame()
    }

    /// Serve frames until the inbound channel closes or nobody is left to
    /// receive responses. Frames that fail to decode are dropped.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Frame>, outbound: mpsc::Sender<Frame>) {
        while let Some(frame) = inbound.recv().await {
            let response = match self.handle_frame(&frame).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(topic = %frame.topic, error = %e, "Dropping undecodable frame");
                    continue;
                }
            };

            if outbound.send(response).await.is_err() {
                tracing::warn!("Response channel closed, stopping controller node");
                break;
            }
        }
    }
}
