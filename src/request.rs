//! Root requests and explicit constraints.

use std::collections::HashMap;

use crate::catalog::{Catalog, DependencyTarget, FlagType, PackageId, VirtualId};
use crate::condition::Assertion;
use crate::error::{CatalogError, RequestError};
use crate::version_match::VersionRange;

/// A package (or virtual) name with explicit assertions on its node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecConstraint {
    pub name: String,
    pub assertions: Vec<Assertion>,
}

impl SpecConstraint {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            assertions: Vec::new(),
        }
    }

    pub fn with(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn version(self, range: VersionRange) -> Self {
        self.with(Assertion::Version(range))
    }

    pub fn variant(self, name: &str, value: &str) -> Self {
        self.with(Assertion::variant(name, value))
    }

    pub fn compiler(self, name: &str) -> Self {
        self.with(Assertion::Compiler(name.to_string()))
    }

    pub fn platform(self, name: &str) -> Self {
        self.with(Assertion::Platform(name.to_string()))
    }

    pub fn os(self, name: &str) -> Self {
        self.with(Assertion::Os(name.to_string()))
    }

    pub fn target(self, name: &str) -> Self {
        self.with(Assertion::Target(name.to_string()))
    }

    pub fn flag(self, flag_type: FlagType, flags: &[&str]) -> Self {
        self.with(Assertion::Flag {
            flag_type,
            flags: flags.iter().map(|f| f.to_string()).collect(),
        })
    }
}

/// One root of a request plus its `^dep` constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRequest {
    pub spec: SpecConstraint,
    /// Dependencies that must appear below this root, with their constraints.
    pub dependencies: Vec<SpecConstraint>,
}

impl RootRequest {
    pub fn new(spec: SpecConstraint) -> Self {
        Self {
            spec,
            dependencies: Vec::new(),
        }
    }

    /// Root with no constraints.
    pub fn named(name: &str) -> Self {
        Self::new(SpecConstraint::new(name))
    }

    pub fn depends_on(mut self, dependency: SpecConstraint) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

impl From<SpecConstraint> for RootRequest {
    fn from(spec: SpecConstraint) -> Self {
        RootRequest::new(spec)
    }
}

/// Everything the caller asks to concretize together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub roots: Vec<RootRequest>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: impl Into<RootRequest>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn single(root: impl Into<RootRequest>) -> Self {
        Self::new().root(root)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedRoot {
    pub target: DependencyTarget,
    pub assertions: Vec<Assertion>,
    /// `^dep` names that must be reachable from this root.
    pub required: Vec<DependencyTarget>,
}

/// A request validated and interned against a catalog.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedRequest {
    pub roots: Vec<ResolvedRoot>,
    pub package_constraints: HashMap<PackageId, Vec<Assertion>>,
    pub virtual_constraints: HashMap<VirtualId, Vec<Assertion>>,
}

impl ResolvedRequest {
    pub fn resolve(request: &Request, catalog: &Catalog) -> Result<Self, RequestError> {
        if request.roots.is_empty() {
            return Err(RequestError::Empty);
        }
        let target_of = |name: &str| {
            catalog
                .dependency_target(name)
                .ok_or_else(|| RequestError::UnknownPackage(name.to_string()))
        };
        let check = |spec: &SpecConstraint| -> Result<(), RequestError> {
            for assertion in &spec.assertions {
                catalog
                    .validate_assertion(&spec.name, assertion)
                    .map_err(|err| match err {
                        CatalogError::UnknownReference { kind, name, .. } => {
                            RequestError::UnknownReference { kind, name }
                        }
                        other => RequestError::Config(other.to_string()),
                    })?;
            }
            Ok(())
        };

        let mut resolved = ResolvedRequest::default();
        for root in &request.roots {
            check(&root.spec)?;
            let target = target_of(root.spec.name.as_str())?;
            let mut required = Vec::new();
            for dep in &root.dependencies {
                check(dep)?;
                let dep_target = target_of(dep.name.as_str())?;
                required.push(dep_target);
                let bucket = match dep_target {
                    DependencyTarget::Package(pid) => {
                        resolved.package_constraints.entry(pid).or_default()
                    }
                    DependencyTarget::Virtual(vid) => {
                        resolved.virtual_constraints.entry(vid).or_default()
                    }
                };
                bucket.extend(dep.assertions.iter().cloned());
            }
            resolved.roots.push(ResolvedRoot {
                target,
                assertions: root.spec.assertions.clone(),
                required,
            });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Environment, PackageDef};
    use crate::condition::Condition;
    use crate::repository::InMemoryRepository;
    use portage_atom::Version;

    fn catalog() -> Catalog {
        let v = |s: &str| Version::parse(s).unwrap();
        let mut repo = InMemoryRepository::new();
        repo.add(PackageDef::new("hdf5").version(v("1.14"), 0));
        repo.add(PackageDef::new("zlib").version(v("1.3"), 0));
        repo.add(PackageDef::new("mpich").version(v("4.1"), 0).provides("mpi", Condition::always()));
        Catalog::new(&repo, Environment::host("linux", "ubuntu22.04", &[("x86_64", 0)])).unwrap()
    }

    #[test]
    fn resolves_roots_and_dependency_constraints() {
        let catalog = catalog();
        let request = Request::single(
            RootRequest::new(SpecConstraint::new("hdf5").variant("shared", "true"))
                .depends_on(SpecConstraint::new("zlib").version(VersionRange::parse("1.3").unwrap()))
                .depends_on(SpecConstraint::new("mpi").os("ubuntu22.04")),
        );
        let resolved = ResolvedRequest::resolve(&request, &catalog).unwrap();
        assert_eq!(resolved.roots.len(), 1);
        assert_eq!(resolved.roots[0].required.len(), 2);
        let zlib = catalog.package_id("zlib").unwrap();
        assert_eq!(resolved.package_constraints[&zlib].len(), 1);
        let mpi = catalog.virtual_id("mpi").unwrap();
        assert_eq!(resolved.virtual_constraints[&mpi].len(), 1);
    }

    #[test]
    fn empty_request_rejected() {
        assert_eq!(
            ResolvedRequest::resolve(&Request::new(), &catalog()).unwrap_err(),
            RequestError::Empty
        );
    }

    #[test]
    fn unknown_names_rejected() {
        let catalog = catalog();
        let request = Request::single(RootRequest::named("ghost"));
        assert_eq!(
            ResolvedRequest::resolve(&request, &catalog).unwrap_err(),
            RequestError::UnknownPackage("ghost".into())
        );
        let request = Request::single(SpecConstraint::new("hdf5").target("zen9"));
        assert!(matches!(
            ResolvedRequest::resolve(&request, &catalog),
            Err(RequestError::UnknownReference { kind: "target", .. })
        ));
    }
}
