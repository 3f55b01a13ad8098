//! Keel - resource versioning and deployment for runtime containers
//!
//! Usage:
//!   keel range "[1.0, 2.0)" 1.4.2      # Test a version against a range
//!   keel resolve util "[1.0, 2.0)"     # Resolve from the master repository
//!   keel inventory                     # List installed container resources
//!   keel query util=1.0 net=[0.9,1.0)  # Ask the local container
//!   keel commit util 1.4.0 <uri>       # Install a resource
//!   keel deploy-activity <uuid> ...    # Install a live activity
//!   keel deploy <uuid> ... -d util=1.0 # Deploy with dependencies from the repository

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use keel_core::config::{ConfigStore, KeelConfig};
use keel_core::container::{ContainerResourceInstaller, InstalledResource, LocalModuleHost};
use keel_core::controller::{
    ContainerResourceDeploymentManager, ControllerNode, LiveActivityInstallationManager,
};
use keel_core::deployment::{
    ContainerResourceDeploymentCommitRequest, ContainerResourceDeploymentItem,
    ContainerResourceDeploymentQueryRequest, ContainerResourceLocation,
    LiveActivityDeploymentRequest, QueryResponseStatus,
};
use keel_core::fs::ContentSignature;
use keel_core::master::{
    DeploymentCoordinator, DeploymentOutcome, LiveActivityDeployment, ResourceRepository,
    TransactionIdGenerator,
};
use keel_core::resource::ResourceDependency;
use keel_core::transfer::UriResourceFetcher;
use keel_core::version::{Version, VersionRange};

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Resource versioning and deployment for runtime containers", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/keel/keel.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a version falls inside a range
    Range {
        /// Range text: `1.0`, `[1.0, 2.0)`, `[1.0, 2.0]` or `=1.2`
        range: String,
        version: String,
    },

    /// Resolve the highest repository resource inside a range
    Resolve { name: String, range: String },

    /// List resources installed in the container's monitored folders
    Inventory,

    /// Ask the local container whether dependencies are satisfied
    Query {
        /// Dependencies as `name=range`
        #[arg(required = true)]
        dependencies: Vec<String>,
    },

    /// Fetch and install a resource into the local container
    Commit {
        name: String,
        version: String,
        /// Source URI or local file path
        source: String,

        /// Target location
        #[arg(long, short, default_value = "user-bootstrap", value_parser = parse_location)]
        location: ContainerResourceLocation,

        /// Expected content signature (hex); verification is skipped without it
        #[arg(long, short)]
        signature: Option<String>,
    },

    /// Fetch and unpack a live activity into the local container
    DeployActivity {
        uuid: String,
        name: String,
        version: String,
        /// Source URI or local file path of the packed activity
        source: String,
    },

    /// Deploy a live activity and its repository dependencies to the local
    /// container, driving the master conversation in process
    Deploy {
        uuid: String,
        name: String,
        version: String,
        /// Source URI or local file path of the packed activity
        source: String,

        /// Dependency as `name=range`; repeatable
        #[arg(long = "dependency", short = 'd')]
        dependencies: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => ConfigStore::at(path),
        None => ConfigStore::user()?,
    };
    let config = store.load()?;

    // RUST_LOG wins over the configured filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(config = %store.config_path().display(), "Loaded configuration");

    let ok = run(cli.command, cli.format, &config).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Returns `false` when the command ran but reported a failure.
async fn run(command: Commands, format: OutputFormat, config: &KeelConfig) -> Result<bool> {
    match command {
        Commands::Range { range, version } => run_range(&range, &version, format),
        Commands::Resolve { name, range } => run_resolve(config, &name, &range, format),
        Commands::Inventory => run_inventory(config, format),
        Commands::Query { dependencies } => run_query(config, &dependencies, format),
        Commands::Commit {
            name,
            version,
            source,
            location,
            signature,
        } => {
            let item = ContainerResourceDeploymentItem::new(
                name,
                Version::parse(&version)?,
                location,
                signature.map(ContentSignature::from_hex),
                source_uri(&source)?.to_string(),
            );
            run_commit(config, item, format).await
        }
        Commands::DeployActivity {
            uuid,
            name,
            version,
            source,
        } => {
            let request = LiveActivityDeploymentRequest {
                transaction_id: TransactionIdGenerator::new().next_id(),
                uuid,
                identifying_name: name,
                version: Version::parse(&version)?,
                activity_source_uri: source_uri(&source)?.to_string(),
            };
            run_deploy_activity(config, &request, format).await
        }
        Commands::Deploy {
            uuid,
            name,
            version,
            source,
            dependencies,
        } => {
            let deployment = LiveActivityDeployment {
                uuid,
                identifying_name: name,
                version: Version::parse(&version)?,
                activity_source_uri: source_uri(&source)?.to_string(),
                dependencies: dependencies
                    .iter()
                    .map(String::as_str)
                    .map(parse_dependency)
                    .collect::<Result<_>>()?,
            };
            run_deploy(config, deployment, format).await
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

fn run_range(range: &str, version: &str, format: OutputFormat) -> Result<bool> {
    let range = VersionRange::parse(range)?;
    let version = Version::parse(version)?;
    let contains = range.contains(&version);

    match format {
        OutputFormat::Table => {
            let verb = if contains { "contains" } else { "does not contain" };
            println!("{} {} {}", range, verb, version);
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "range": range,
            "version": version,
            "contains": contains,
        }))?,
    }
    Ok(contains)
}

fn run_resolve(config: &KeelConfig, name: &str, range: &str, format: OutputFormat) -> Result<bool> {
    let repository = open_repository(config)?;
    let dependency = ResourceDependency::new(name, VersionRange::parse(range)?);
    let found = repository.resolve(&dependency);

    match (format, found) {
        (OutputFormat::Table, Some(found)) => {
            println!("{}", found.resource);
            println!("  Path: {}", found.path.display());
            println!("  URI:  {}", found.uri);
        }
        (OutputFormat::Table, None) => {
            println!(
                "No resource satisfies {} in {}",
                dependency,
                repository.root().display()
            );
        }
        (OutputFormat::Json, found) => print_json(&serde_json::json!({
            "dependency": dependency,
            "resolved": found.map(|f| serde_json::json!({
                "name": f.resource.name,
                "version": f.resource.version,
                "path": f.path,
                "uri": f.uri,
            })),
        }))?,
    }
    Ok(found.is_some())
}

fn run_inventory(config: &KeelConfig, format: OutputFormat) -> Result<bool> {
    let installer = open_installer(config)?;
    let inventory = installer.resources();
    let records: Vec<&InstalledResource> =
        inventory.all_resources().into_iter().map(|(_, _, r)| r).collect();

    match format {
        OutputFormat::Table => print_inventory_table(&records),
        OutputFormat::Json => {
            let records: Vec<_> = records
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "name": r.resource.name,
                        "version": r.resource.version,
                        "location": r.location,
                        "signature": r.signature,
                        "path": r.path,
                        "running": r.handle.is_some(),
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "root": installer.layout().root(),
                "resources": records,
            }))?;
        }
    }
    Ok(true)
}

fn run_query(config: &KeelConfig, dependencies: &[String], format: OutputFormat) -> Result<bool> {
    let mut request = ContainerResourceDeploymentQueryRequest::new(TransactionIdGenerator::new().next_id());
    for text in dependencies {
        request = request.with_query(parse_dependency(text)?);
    }

    let manager = ContainerResourceDeploymentManager::new(
        open_installer(config)?,
        UriResourceFetcher::new()?,
        config.container.staging_dir(),
    );
    let response = manager.query_resources(&request);
    let satisfied = response.status == QueryResponseStatus::SpecificQuerySatisfied;

    match format {
        OutputFormat::Table => {
            let installed = manager.installer().resources();
            for dependency in &request.queries {
                match installed.get_resource_in_range(&dependency.name, &dependency.version_range) {
                    Some(record) => println!("  ✓ {:<30} {}", dependency, record.resource.version),
                    None => println!("  ✗ {:<30} -", dependency),
                }
            }
            println!();
            println!("{}", if satisfied { "Satisfied" } else { "Not satisfied" });
        }
        OutputFormat::Json => print_json(&response)?,
    }
    Ok(satisfied)
}

async fn run_commit(
    config: &KeelConfig,
    item: ContainerResourceDeploymentItem,
    format: OutputFormat,
) -> Result<bool> {
    let identity = item.identity();
    let request =
        ContainerResourceDeploymentCommitRequest::new(TransactionIdGenerator::new().next_id())
            .with_item(item);

    let manager = ContainerResourceDeploymentManager::new(
        open_installer(config)?,
        UriResourceFetcher::new()?,
        config.container.staging_dir(),
    );
    let response = manager.commit_resources(&request).await;

    match format {
        OutputFormat::Table => {
            if response.is_success() {
                println!("✓ Installed {}", identity);
                if let Some(record) = manager.installer().installed(&identity) {
                    println!("  Location:  {}", record.location);
                    println!("  Path:      {}", record.path.display());
                    println!("  Signature: {}", record.signature);
                }
            } else {
                println!("✗ {}", response.detail.as_deref().unwrap_or("Commit failed"));
            }
        }
        OutputFormat::Json => print_json(&response)?,
    }
    Ok(response.is_success())
}

async fn run_deploy_activity(
    config: &KeelConfig,
    request: &LiveActivityDeploymentRequest,
    format: OutputFormat,
) -> Result<bool> {
    let manager = LiveActivityInstallationManager::new(
        UriResourceFetcher::new()?,
        config.container.staging_dir(),
        config.container.activities_dir(),
    );
    let response = manager.handle_deployment_request(request).await;

    match format {
        OutputFormat::Table => {
            if response.is_success() {
                println!(
                    "✓ Deployed {} {} as {}",
                    request.identifying_name, request.version, request.uuid
                );
                println!("  Folder: {}", manager.activity_dir(&request.uuid).display());
            } else {
                println!("✗ {:?}", response.status);
                if let Some(detail) = &response.detail {
                    println!("  {}", detail);
                }
                if response.status.is_retryable() {
                    println!("  The source could not be copied; retrying may succeed.");
                }
            }
        }
        OutputFormat::Json => print_json(&response)?,
    }
    Ok(response.is_success())
}

async fn run_deploy(
    config: &KeelConfig,
    deployment: LiveActivityDeployment,
    format: OutputFormat,
) -> Result<bool> {
    let mut coordinator = DeploymentCoordinator::from_config(config)?;
    let fetcher = UriResourceFetcher::new()?;
    let node = ControllerNode::new(
        ContainerResourceDeploymentManager::new(
            open_installer(config)?,
            fetcher.clone(),
            config.container.staging_dir(),
        ),
        LiveActivityInstallationManager::new(
            fetcher,
            config.container.staging_dir(),
            config.container.activities_dir(),
        ),
    );

    let uuid = deployment.uuid.clone();
    let (transaction_id, mut next) = coordinator.deploy_live_activity(deployment)?;
    let outcome = loop {
        let reply = node.handle_frame(&next.to_frame()?).await?;
        let step = coordinator.handle_frame(&reply)?;
        match (step.outbound, step.outcome) {
            (_, Some(outcome)) => break outcome,
            (Some(outbound), None) => next = outbound,
            (None, None) => anyhow::bail!("Deployment {} stalled", transaction_id),
        }
    };

    let ok = match &outcome {
        DeploymentOutcome::Activity(response) => response.is_success(),
        DeploymentOutcome::DependenciesNotSatisfied { .. } => false,
    };
    match (format, &outcome) {
        (OutputFormat::Table, DeploymentOutcome::Activity(response)) if ok => {
            println!("✓ Deployed {} (transaction {})", uuid, transaction_id);
            println!("  Folder: {}", node.activities().activity_dir(&response.uuid).display());
        }
        (OutputFormat::Table, DeploymentOutcome::Activity(response)) => {
            println!("✗ {:?}", response.status);
            if let Some(detail) = &response.detail {
                println!("  {}", detail);
            }
        }
        (OutputFormat::Table, DeploymentOutcome::DependenciesNotSatisfied { detail }) => {
            println!("✗ Dependencies not satisfied");
            if let Some(detail) = detail {
                println!("  {}", detail);
            }
        }
        (OutputFormat::Json, DeploymentOutcome::Activity(response)) => print_json(response)?,
        (OutputFormat::Json, DeploymentOutcome::DependenciesNotSatisfied { detail }) => {
            print_json(&serde_json::json!({
                "transactionId": transaction_id,
                "uuid": uuid,
                "dependenciesSatisfied": false,
                "detail": detail,
            }))?
        }
    }
    Ok(ok)
}

// =============================================================================
// Helpers
// =============================================================================

fn open_installer(config: &KeelConfig) -> Result<Arc<ContainerResourceInstaller<LocalModuleHost>>> {
    let installer =
        ContainerResourceInstaller::open(LocalModuleHost::new(), config.container.layout())
            .context("Failed to open container")?;
    Ok(Arc::new(installer))
}

fn open_repository(config: &KeelConfig) -> Result<ResourceRepository> {
    let Some(repository) = &config.repository else {
        anyhow::bail!("No [repository] section in configuration");
    };
    ResourceRepository::from_config(repository)
}

/// `name=range`
fn parse_dependency(text: &str) -> Result<ResourceDependency> {
    let (name, range) = text
        .split_once('=')
        .with_context(|| format!("Expected name=range, got '{}'", text))?;
    if name.is_empty() {
        anyhow::bail!("Missing resource name in '{}'", text);
    }
    Ok(ResourceDependency::new(name, VersionRange::parse(range)?))
}

/// Accept a URI or a path to a local file.
fn source_uri(text: &str) -> Result<Url> {
    if let Ok(uri) = Url::parse(text) {
        if uri.scheme().len() > 1 {
            return Ok(uri);
        }
    }
    let path = std::path::absolute(Path::new(text))
        .with_context(|| format!("Failed to resolve path: {}", text))?;
    Url::from_file_path(&path).map_err(|()| anyhow::anyhow!("Cannot express {} as a URI", path.display()))
}

fn parse_location(text: &str) -> Result<ContainerResourceLocation, String> {
    text.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn print_inventory_table(records: &[&InstalledResource]) {
    if records.is_empty() {
        println!("No resources installed.");
        return;
    }

    println!(
        "  {:<30} {:<12} {:<18} {:<8} Signature",
        "Name", "Version", "Location", "Running"
    );
    println!("  {}", "-".repeat(90));
    for record in records {
        println!(
            "  {:<30} {:<12} {:<18} {:<8} {}",
            truncate(&record.resource.name, 30),
            truncate(&record.resource.version.to_string(), 12),
            record.location,
            if record.handle.is_some() { "yes" } else { "no" },
            truncate(record.signature.as_str(), 16),
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
