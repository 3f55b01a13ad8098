//! Keel Core Library
//!
//! Resource versioning and deployment resolution for a fleet of runtime
//! containers: version ranges and highest-in-range lookup, the query and
//! commit deployment protocols, and a signature-based module cache.

pub mod cache;
pub mod config;
pub mod container;
pub mod controller;
pub mod deployment;
pub mod error;
pub mod fs;
pub mod master;
pub mod resource;
pub mod transfer;
pub mod version;
pub mod wire;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, KeelConfig};

    // Versions and resources
    pub use crate::resource::{
        NamedVersionedResource, NamedVersionedResourceCollection, ResourceDependency,
        VersionedResourceCollection,
    };
    pub use crate::version::{Version, VersionRange};

    // Protocol records
    pub use crate::deployment::{
        ActivityDeployStatus, ContainerResourceDeploymentCommitRequest,
        ContainerResourceDeploymentCommitResponse, ContainerResourceDeploymentCommitStatus,
        ContainerResourceDeploymentItem, ContainerResourceDeploymentQueryRequest,
        ContainerResourceDeploymentQueryResponse, ContainerResourceLocation,
        LiveActivityDeploymentRequest, LiveActivityDeploymentResponse, QueryResponseStatus,
        TransactionId,
    };
    pub use crate::wire::{ControllerRequest, ControllerResponse, Frame, Topic, WireMessage};

    // Container and cache
    pub use crate::cache::ModuleCache;
    pub use crate::container::{
        ContainerLayout, ContainerResourceInstaller, LocalModuleHost, ModuleContainer,
        ModuleHandle,
    };
    pub use crate::fs::{Blake3SignatureCalculator, ContentSignature, SignatureCalculator};

    // Controller and master
    pub use crate::controller::{
        ContainerResourceDeploymentManager, ControllerNode, LiveActivityInstallationManager,
    };
    pub use crate::master::{
        DeploymentCoordinator, DeploymentOutcome, LiveActivityDeployment, ResourceRepository,
    };
    pub use crate::transfer::{ResourceFetcher, UriResourceFetcher};

    // Errors
    pub use crate::error::{ParseError, WireError};
}
