//! Indexed storage of versioned resources with highest-in-range resolution.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::version::{Version, VersionRange};

/// All stored versions of a single resource, ordered by version.
#[derive(Debug, Clone)]
pub struct VersionedResourceCollection<T> {
    resources: BTreeMap<Version, T>,
}

impl<T> VersionedResourceCollection<T> {
    pub fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    /// Store `value` at `version`, returning any value it replaced.
    pub fn add(&mut self, version: Version, value: T) -> Option<T> {
        self.resources.insert(version, value)
    }

    pub fn get(&self, version: &Version) -> Option<&T> {
        self.resources.get(version)
    }

    pub fn highest(&self) -> Option<(&Version, &T)> {
        self.resources.last_key_value()
    }

    /// The value at the highest version that satisfies `range`.
    pub fn highest_in_range(&self, range: &VersionRange) -> Option<(&Version, &T)> {
        let lower = Bound::Included(range.minimum());
        let upper = match range.maximum() {
            None => Bound::Unbounded,
            Some(maximum) if maximum < range.minimum() => return None,
            Some(maximum) if range.is_maximum_inclusive() => Bound::Included(maximum),
            Some(maximum) => Bound::Excluded(maximum),
        };

        self.resources
            .range::<Version, _>((lower, upper))
            .next_back()
            .filter(|(version, _)| range.contains(version))
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.resources.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Version, &T)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl<T> Default for VersionedResourceCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Versioned resources indexed by name.
///
/// Entries are only ever added or replaced; nothing is evicted.
#[derive(Debug, Clone)]
pub struct NamedVersionedResourceCollection<T> {
    resources: HashMap<String, VersionedResourceCollection<T>>,
}

impl<T> NamedVersionedResourceCollection<T> {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
        }
    }

    /// Add a resource. Last write wins for an existing `(name, version)`.
    pub fn add_resource(&mut self, name: &str, version: Version, value: T) -> Option<T> {
        self.resources
            .entry(name.to_string())
            .or_default()
            .add(version, value)
    }

    pub fn get_resource(&self, name: &str, version: &Version) -> Option<&T> {
        self.resources.get(name)?.get(version)
    }

    pub fn get_highest_resource(&self, name: &str) -> Option<&T> {
        self.resources
            .get(name)?
            .highest()
            .map(|(_, value)| value)
    }

    /// The value at the highest version of `name` satisfying `range`, which is
    /// not necessarily the highest version stored for `name`.
    pub fn get_resource_in_range(&self, name: &str, range: &VersionRange) -> Option<&T> {
        self.resources
            .get(name)?
            .highest_in_range(range)
            .map(|(_, value)| value)
    }

    pub fn versions_of(&self, name: &str) -> Option<&VersionedResourceCollection<T>> {
        self.resources.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Every stored resource, sorted by name then version.
    pub fn all_resources(&self) -> Vec<(&str, &Version, &T)> {
        let mut all: Vec<_> = self
            .resources
            .iter()
            .flat_map(|(name, versions)| {
                versions
                    .iter()
                    .map(move |(version, value)| (name.as_str(), version, value))
            })
            .collect();
        all.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));
        all
    }

    pub fn len(&self) -> usize {
        self.resources.values().map(VersionedResourceCollection::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.values().all(VersionedResourceCollection::is_empty)
    }
}

impl<T> Default for NamedVersionedResourceCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    fn r(text: &str) -> VersionRange {
        VersionRange::parse(text).unwrap()
    }

    fn foo_collection() -> NamedVersionedResourceCollection<&'static str> {
        let mut collection = NamedVersionedResourceCollection::new();
        collection.add_resource("foo", v("1.0.0"), "A");
        collection.add_resource("foo", v("1.1.0"), "B");
        collection.add_resource("foo", v("2.0.0"), "C");
        collection
    }

    #[test]
    fn test_highest_resource() {
        let collection = foo_collection();
        assert_eq!(collection.get_highest_resource("foo"), Some(&"C"));
        assert_eq!(collection.get_highest_resource("bar"), None);
    }

    #[test]
    fn test_highest_within_range_not_global_highest() {
        let collection = foo_collection();
        assert_eq!(collection.get_resource_in_range("foo", &r("[1.0.0, 2.0.0)")), Some(&"B"));
        assert_eq!(collection.get_resource_in_range("foo", &r("[1.0.0, 1.0.1)")), Some(&"A"));
        assert_eq!(collection.get_resource_in_range("foo", &r("[3.0.0, 4.0.0)")), None);
        assert_eq!(collection.get_resource_in_range("bar", &r("1.0.0")), None);
    }

    #[test]
    fn test_range_boundaries() {
        let collection = foo_collection();

        // Inclusive upper bound picks the bound itself.
        assert_eq!(collection.get_resource_in_range("foo", &r("[1.0.0, 2.0.0]")), Some(&"C"));
        // Lower bound is always inclusive.
        assert_eq!(collection.get_resource_in_range("foo", &r("[1.1.0, 1.5.0)")), Some(&"B"));
        assert_eq!(collection.get_resource_in_range("foo", &r("[1.1.1, 2.0.0)")), None);
        // Single point ranges.
        assert_eq!(collection.get_resource_in_range("foo", &r("[1.1.0, 1.1.0]")), Some(&"B"));
        assert_eq!(collection.get_resource_in_range("foo", &r("[1.1.0, 1.1.0)")), None);
        assert_eq!(collection.get_resource_in_range("foo", &r("=1.1")), Some(&"B"));
        // Unbounded ranges pick the global highest when it qualifies.
        assert_eq!(collection.get_resource_in_range("foo", &r("1.0.0")), Some(&"C"));
        assert_eq!(collection.get_resource_in_range("foo", &r("2.0.0")), Some(&"C"));
        assert_eq!(collection.get_resource_in_range("foo", &r("2.0.1")), None);
        assert_eq!(collection.get_resource_in_range("foo", &r("0.0.1")), Some(&"C"));
    }

    #[test]
    fn test_inverted_range_resolves_nothing() {
        let collection = foo_collection();
        let inverted = VersionRange::bounded(v("2.0.0"), v("1.0.0"), true);
        assert_eq!(collection.get_resource_in_range("foo", &inverted), None);
    }

    #[test]
    fn test_qualified_versions_inside_ranges() {
        let mut collection = NamedVersionedResourceCollection::new();
        collection.add_resource("lib", v("1.0.0"), 1);
        collection.add_resource("lib", v("1.0.0.rc1"), 2);

        assert_eq!(collection.get_highest_resource("lib"), Some(&2));
        assert_eq!(collection.get_resource_in_range("lib", &r("[1.0.0, 1.0.0]")), Some(&1));
        assert_eq!(collection.get_resource_in_range("lib", &r("=1.0.0")), Some(&2));
    }

    #[test]
    fn test_exact_lookup_and_overwrite() {
        let mut collection = foo_collection();
        assert_eq!(collection.get_resource("foo", &v("1.1.0")), Some(&"B"));
        assert_eq!(collection.get_resource("foo", &v("1.2.0")), None);

        let replaced = collection.add_resource("foo", v("1.1.0"), "B2");
        assert_eq!(replaced, Some("B"));
        assert_eq!(collection.get_resource("foo", &v("1.1.0")), Some(&"B2"));
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_all_resources_sorted() {
        let mut collection = foo_collection();
        collection.add_resource("bar", v("0.1.0"), "Z");
        let names: Vec<String> = collection
            .all_resources()
            .into_iter()
            .map(|(name, version, _)| format!("{}-{}", name, version))
            .collect();
        assert_eq!(names, ["bar-0.1.0", "foo-1.0.0", "foo-1.1.0", "foo-2.0.0"]);
    }

    #[test]
    fn test_empty_collection() {
        let collection: NamedVersionedResourceCollection<u8> = NamedVersionedResourceCollection::new();
        assert!(collection.is_empty());
        assert_eq!(collection.len(), 0);
        assert_eq!(collection.get_highest_resource("foo"), None);
    }
}
