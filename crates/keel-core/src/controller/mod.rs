//! Controller-side protocol handlers.

pub mod activity;
pub mod node;
pub mod resources;

pub use activity::{InstalledActivity, LiveActivityInstallationManager};
pub use node::ControllerNode;
pub use resources::ContainerResourceDeploymentManager;
