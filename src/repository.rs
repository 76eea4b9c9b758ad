//! Package repository abstraction.
//!
//! [`PackageRepository`] provides read-only access to the package
//! definitions produced by an external loader.
//! [`InMemoryRepository`] is a simple implementation for tests and demos.

use std::collections::BTreeMap;

use crate::catalog::PackageDef;

/// Read-only package database.
pub trait PackageRepository {
    /// Return every package name in the repository.
    fn all_packages(&self) -> Vec<String>;

    /// Return the definition of the named package.
    fn package(&self, name: &str) -> Option<PackageDef>;
}

/// In-memory repository backed by a `BTreeMap`, useful for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    packages: BTreeMap<String, PackageDef>,
}

impl InMemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a package definition.
    pub fn add(&mut self, def: PackageDef) {
        self.packages.insert(def.name.clone(), def);
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl FromIterator<PackageDef> for InMemoryRepository {
    fn from_iter<I: IntoIterator<Item = PackageDef>>(iter: I) -> Self {
        let mut repo = InMemoryRepository::new();
        for def in iter {
            repo.add(def);
        }
        repo
    }
}

impl PackageRepository for InMemoryRepository {
    fn all_packages(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    fn package(&self, name: &str) -> Option<PackageDef> {
        self.packages.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portage_atom::Version;

    #[test]
    fn in_memory_add_and_query() {
        let mut repo = InMemoryRepository::new();
        repo.add(PackageDef::new("zlib").version(Version::parse("1.3").unwrap(), 0));

        let names = repo.all_packages();
        assert_eq!(names, vec!["zlib".to_string()]);

        let def = repo.package("zlib").unwrap();
        assert_eq!(def.versions.len(), 1);
    }

    #[test]
    fn package_unknown() {
        let repo = InMemoryRepository::new();
        assert!(repo.package("zlib").is_none());
        assert!(repo.is_empty());
    }

    #[test]
    fn add_replaces_definition() {
        let mut repo: InMemoryRepository = [PackageDef::new("zlib")].into_iter().collect();
        repo.add(PackageDef::new("zlib").version(Version::parse("1.3").unwrap(), 0));
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.package("zlib").unwrap().versions.len(), 1);
    }
}
