//! Turning dependencies into commit items.

use anyhow::Context;

use super::repository::ResourceRepository;
use crate::deployment::{ContainerResourceDeploymentItem, ContainerResourceLocation};
use crate::fs::{Blake3SignatureCalculator, SignatureCalculator};
use crate::resource::ResourceDependency;

/// Resolve each dependency to the highest matching repository resource and
/// build commit items that install it live in the user bootstrap area.
///
/// Fails on the first dependency the repository cannot satisfy.
pub fn satisfy_dependencies(
    repository: &ResourceRepository,
    dependencies: &[ResourceDependency],
) -> anyhow::Result<Vec<ContainerResourceDeploymentItem>> {
    dependencies
        .iter()
        .map(|dependency| {
            let Some(found) = repository.resolve(dependency) else {
                anyhow::bail!(
                    "Dependency {} cannot be satisfied from repository {}",
                    dependency,
                    repository.root().display()
                );
            };
            let signature = Blake3SignatureCalculator
                .file_signature(&found.path)
                .with_context(|| format!("Failed to sign {}", found.resource))?;
            Ok(ContainerResourceDeploymentItem::new(
                found.resource.name.clone(),
                found.resource.version.clone(),
                ContainerResourceLocation::UserBootstrap,
                Some(signature),
                found.uri.to_string(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::ContentSignature;
    use crate::version::{Version, VersionRange};
    use std::fs;
    use tempfile::TempDir;
    use url::Url;

    fn repository(tmp: &TempDir) -> ResourceRepository {
        for (name, version) in [("json", "1.0.0"), ("json", "1.4.0"), ("ros", "2.0.0")] {
            let dir = tmp.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{}.bundle", version)), version).unwrap();
        }
        ResourceRepository::scan(tmp.path(), Url::parse("http://master/repo/").unwrap()).unwrap()
    }

    fn dep(name: &str, range: &str) -> ResourceDependency {
        ResourceDependency::new(name, VersionRange::parse(range).unwrap())
    }

    #[test]
    fn test_items_use_highest_match_and_signature() {
        let tmp = TempDir::new().unwrap();
        let items =
            satisfy_dependencies(&repository(&tmp), &[dep("json", "[1.0, 2.0)"), dep("ros", "2")])
                .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].version, Version::new(1, 4, 0));
        assert_eq!(items[0].location, ContainerResourceLocation::UserBootstrap);
        assert_eq!(items[0].signature, Some(ContentSignature::of_bytes(b"1.4.0")));
        assert_eq!(items[0].source_uri, "http://master/repo/json/1.4.0.bundle");
    }

    #[test]
    fn test_unsatisfiable_dependency_names_it() {
        let tmp = TempDir::new().unwrap();
        let err = satisfy_dependencies(&repository(&tmp), &[dep("json", "[3.0, 4.0)")])
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("json [3.0.0, 4.0.0)"));
        assert!(message.contains(&tmp.path().display().to_string()));
    }
}
