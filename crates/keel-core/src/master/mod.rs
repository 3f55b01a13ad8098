//! Master-side dependency resolution and deployment coordination.

pub mod coordinator;
pub mod repository;
pub mod satisfy;
pub mod transaction;

pub use coordinator::{
    DeploymentCoordinator, DeploymentOutcome, DeploymentState, LiveActivityDeployment, Outbound,
    Step,
};
pub use repository::{RepositoryResource, ResourceRepository};
pub use satisfy::satisfy_dependencies;
pub use transaction::TransactionIdGenerator;
