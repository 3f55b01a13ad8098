//! Configuration loaded from keel.toml

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_keel_toml, parse_keel_toml_str, to_toml};
pub use schema::{ContainerConfig, DeploymentConfig, KeelConfig, LoggingConfig, RepositoryConfig};
pub use store::ConfigStore;
