//! Immutable catalog model.
//!
//! [`Catalog`] interns every package definition handed over by a
//! [`PackageRepository`] together with the build [`Environment`] (platforms,
//! operating systems, targets, compilers and externals). Cross references are
//! resolved to typed ids and validated once; afterwards the catalog is
//! read-only and shared by reference with every search branch.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use portage_atom::Version;

use crate::condition::{Assertion, Condition, Predicate, Slot};
use crate::error::CatalogError;
use crate::repository::PackageRepository;

/// Largest value domain supported for a multi-valued variant.
pub const MAX_MULTI_VALUES: usize = 12;
/// Largest value domain supported for a single-valued variant.
pub const MAX_SINGLE_VALUES: usize = 32;

/// Ad hoc variant holding a development checkout path.
pub const DEV_PATH_VARIANT: &str = "dev_path";
/// Ad hoc variant listing applied patch checksums.
pub const PATCHES_VARIANT: &str = "patches";
/// Exclusive value of multi-valued variants.
pub const NONE_VALUE: &str = "none";

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            /// Position of this id in its arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Interned concrete package.
    PackageId
);
arena_id!(
    /// Interned virtual name.
    VirtualId
);
arena_id!(
    /// Interned compiler (name + version pair).
    CompilerId
);
arena_id!(
    /// Interned target microarchitecture.
    TargetId
);
arena_id!(
    /// Interned operating system.
    OsId
);
arena_id!(
    /// Interned platform.
    PlatformId
);
arena_id!(
    /// Interned external spec.
    ExternalId
);

/// Dependency kind carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKind {
    /// Needed to build the dependent.
    Build,
    /// Linked into the dependent.
    Link,
    /// Needed at run time.
    Run,
    /// Needed only to run the dependent's tests.
    Test,
}

impl DependencyKind {
    pub(crate) fn bit(self) -> u8 {
        match self {
            DependencyKind::Build => 1,
            DependencyKind::Link => 2,
            DependencyKind::Run => 4,
            DependencyKind::Test => 8,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Vec<DependencyKind> {
        [
            DependencyKind::Build,
            DependencyKind::Link,
            DependencyKind::Run,
            DependencyKind::Test,
        ]
        .into_iter()
        .filter(|kind| bits & kind.bit() != 0)
        .collect()
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Build => write!(f, "build"),
            DependencyKind::Link => write!(f, "link"),
            DependencyKind::Run => write!(f, "run"),
            DependencyKind::Test => write!(f, "test"),
        }
    }
}

/// Compiler flag category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlagType {
    CFlags,
    CxxFlags,
    FFlags,
    CppFlags,
    LdFlags,
    LdLibs,
}

impl FlagType {
    /// Every flag type, in canonical order.
    pub const ALL: [FlagType; 6] = [
        FlagType::CFlags,
        FlagType::CxxFlags,
        FlagType::FFlags,
        FlagType::CppFlags,
        FlagType::LdFlags,
        FlagType::LdLibs,
    ];
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlagType::CFlags => "cflags",
            FlagType::CxxFlags => "cxxflags",
            FlagType::FFlags => "fflags",
            FlagType::CppFlags => "cppflags",
            FlagType::LdFlags => "ldflags",
            FlagType::LdLibs => "ldlibs",
        };
        f.write_str(name)
    }
}

/// A version declared by a package, with its preference weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredVersion {
    pub version: Version,
    /// Lower is more preferred.
    pub weight: u32,
    pub deprecated: bool,
}

impl DeclaredVersion {
    pub fn new(version: Version, weight: u32) -> Self {
        Self {
            version,
            weight,
            deprecated: false,
        }
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

/// A build option declared by a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantDef {
    pub name: String,
    pub values: Vec<String>,
    pub defaults: Vec<String>,
    pub multi: bool,
}

impl VariantDef {
    /// `true`/`false` variant.
    pub fn boolean(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            values: vec!["false".into(), "true".into()],
            defaults: vec![default.to_string()],
            multi: false,
        }
    }

    /// Single-valued variant over `values`.
    pub fn single(name: &str, values: &[&str], default: &str) -> Self {
        Self {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            defaults: vec![default.to_string()],
            multi: false,
        }
    }

    /// Multi-valued variant over `values`.
    pub fn multi(name: &str, values: &[&str], defaults: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            defaults: defaults.iter().map(|v| v.to_string()).collect(),
            multi: true,
        }
    }

    /// Index of `value` in the domain.
    pub fn value_index(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }

    /// Bitmask of the catalog defaults.
    pub fn default_mask(&self) -> u32 {
        self.mask_of(self.defaults.iter().map(String::as_str))
            .unwrap_or(0)
    }

    /// Bitmask of `values`, or `None` if any value is outside the domain.
    pub fn mask_of<'a>(&self, values: impl IntoIterator<Item = &'a str>) -> Option<u32> {
        let mut mask = 0;
        for value in values {
            mask |= 1 << self.value_index(value)?;
        }
        Some(mask)
    }

    /// Values selected by `mask`, in declaration order.
    pub fn values_of(&self, mask: u32) -> Vec<String> {
        self.values
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Mask of the exclusive `none` value, if the domain has one.
    pub fn none_mask(&self) -> Option<u32> {
        self.value_index(NONE_VALUE).map(|i| 1 << i)
    }
}

/// Conditional dependency declared by a package.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyTemplate {
    /// Concrete package or virtual name.
    pub name: String,
    pub kind: DependencyKind,
    pub when: Condition,
    /// Assertions imposed on the dependency node once the trigger holds.
    pub imposes: Vec<Assertion>,
}

impl DependencyTemplate {
    /// Unconditional link-and-run dependency on `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: DependencyKind::Link,
            when: Condition::always(),
            imposes: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: DependencyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn when(mut self, when: Condition) -> Self {
        self.when = when;
        self
    }

    pub fn imposing(mut self, assertion: Assertion) -> Self {
        self.imposes.push(assertion);
        self
    }
}

/// Forbidden configuration declared by a package.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictTemplate {
    pub when: Condition,
    pub message: String,
}

impl ConflictTemplate {
    pub fn new(when: Condition, message: &str) -> Self {
        Self {
            when,
            message: message.to_string(),
        }
    }
}

/// Declaration that a package provides a virtual name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvidesDecl {
    pub virtual_name: String,
    /// Evaluated on the provider node.
    pub when: Condition,
}

/// Everything the catalog knows about one package.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageDef {
    pub name: String,
    pub versions: Vec<DeclaredVersion>,
    pub variants: Vec<VariantDef>,
    pub dependencies: Vec<DependencyTemplate>,
    pub conflicts: Vec<ConflictTemplate>,
    pub provides: Vec<ProvidesDecl>,
}

impl PackageDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Declare a version; declaration order breaks weight ties.
    pub fn version(mut self, version: Version, weight: u32) -> Self {
        self.versions.push(DeclaredVersion::new(version, weight));
        self
    }

    pub fn declared(mut self, declared: DeclaredVersion) -> Self {
        self.versions.push(declared);
        self
    }

    pub fn variant(mut self, variant: VariantDef) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn depends_on(mut self, template: DependencyTemplate) -> Self {
        self.dependencies.push(template);
        self
    }

    pub fn conflicts(mut self, conflict: ConflictTemplate) -> Self {
        self.conflicts.push(conflict);
        self
    }

    pub fn provides(mut self, virtual_name: &str, when: Condition) -> Self {
        self.provides.push(ProvidesDecl {
            virtual_name: virtual_name.to_string(),
            when,
        });
        self
    }

    /// Index of the variant named `name`.
    pub fn variant_index(&self, name: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.name == name)
    }
}

/// One compiler installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerDef {
    pub name: String,
    pub version: Version,
    /// Lower is more preferred.
    pub weight: u32,
    pub targets: Vec<String>,
    pub operating_systems: Vec<String>,
    pub flags: BTreeMap<FlagType, Vec<String>>,
}

impl CompilerDef {
    pub fn new(name: &str, version: Version, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            version,
            weight,
            targets: Vec::new(),
            operating_systems: Vec::new(),
            flags: BTreeMap::new(),
        }
    }

    pub fn targets(mut self, targets: &[&str]) -> Self {
        self.targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn operating_systems(mut self, oses: &[&str]) -> Self {
        self.operating_systems = oses.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn flag(mut self, flag_type: FlagType, flags: &[&str]) -> Self {
        self.flags
            .insert(flag_type, flags.iter().map(|f| f.to_string()).collect());
        self
    }
}

impl fmt::Display for CompilerDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A target microarchitecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDef {
    pub name: String,
    /// Lower is more preferred.
    pub weight: u32,
}

/// A pre-built package instance usable as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSpec {
    pub package: String,
    pub version: Version,
    /// Identity of the installation (usually its prefix).
    pub prefix: String,
    pub variants: BTreeMap<String, Vec<String>>,
    pub platform: Option<String>,
    pub os: Option<String>,
    pub target: Option<String>,
    pub compiler: Option<(String, Version)>,
}

impl ExternalSpec {
    pub fn new(package: &str, version: Version, prefix: &str) -> Self {
        Self {
            package: package.to_string(),
            version,
            prefix: prefix.to_string(),
            variants: BTreeMap::new(),
            platform: None,
            os: None,
            target: None,
            compiler: None,
        }
    }

    pub fn variant(mut self, name: &str, values: &[&str]) -> Self {
        self.variants.insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn os(mut self, os: &str) -> Self {
        self.os = Some(os.to_string());
        self
    }

    pub fn target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }
}

/// Host description: the platform/OS/target/compiler universe and externals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    pub platforms: Vec<String>,
    pub operating_systems: Vec<String>,
    pub targets: Vec<TargetDef>,
    pub compilers: Vec<CompilerDef>,
    pub externals: Vec<ExternalSpec>,
    pub default_platform: String,
    pub default_os: String,
    pub default_target: String,
}

impl Environment {
    /// Environment with one platform, one OS and the given targets; the first
    /// target is the default.
    pub fn host(platform: &str, os: &str, targets: &[(&str, u32)]) -> Self {
        Self {
            platforms: vec![platform.to_string()],
            operating_systems: vec![os.to_string()],
            targets: targets
                .iter()
                .map(|(name, weight)| TargetDef {
                    name: name.to_string(),
                    weight: *weight,
                })
                .collect(),
            compilers: Vec::new(),
            externals: Vec::new(),
            default_platform: platform.to_string(),
            default_os: os.to_string(),
            default_target: targets
                .first()
                .map(|(name, _)| name.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn os(mut self, os: &str) -> Self {
        self.operating_systems.push(os.to_string());
        self
    }

    pub fn compiler(mut self, compiler: CompilerDef) -> Self {
        self.compilers.push(compiler);
        self
    }

    pub fn external(mut self, external: ExternalSpec) -> Self {
        self.externals.push(external);
        self
    }
}

/// Resolved dependency target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyTarget {
    Package(PackageId),
    Virtual(VirtualId),
}

/// Interned package with resolved dependency targets.
#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub def: PackageDef,
    /// Target of each entry in `def.dependencies`.
    pub dependency_targets: Vec<DependencyTarget>,
    pub externals: Vec<ExternalId>,
    /// Upper bound on multi-valued defaults a node of this package can keep.
    pub max_retained_defaults: u32,
}

/// A virtual name and the packages that may provide it.
#[derive(Debug, Clone)]
pub struct VirtualEntry {
    pub name: String,
    /// Provider package and index of its [`ProvidesDecl`].
    pub providers: Vec<(PackageId, usize)>,
}

/// Read-only, interned view of packages and environment.
#[derive(Debug, Clone)]
pub struct Catalog {
    packages: Vec<PackageEntry>,
    packages_rev: HashMap<String, PackageId>,
    virtuals: Vec<VirtualEntry>,
    virtuals_rev: HashMap<String, VirtualId>,
    platforms: Vec<String>,
    oses: Vec<String>,
    targets: Vec<TargetDef>,
    compilers: Vec<CompilerDef>,
    externals: Vec<ExternalSpec>,
    default_platform: PlatformId,
    default_os: OsId,
    default_target: TargetId,
}

impl Catalog {
    /// Intern every package of `repo` plus `environment`, validating all
    /// cross references.
    pub fn new(
        repo: &dyn PackageRepository,
        environment: Environment,
    ) -> Result<Self, CatalogError> {
        if environment.platforms.is_empty() {
            return Err(CatalogError::EmptyEnvironment("platforms"));
        }
        if environment.operating_systems.is_empty() {
            return Err(CatalogError::EmptyEnvironment("operating systems"));
        }
        if environment.targets.is_empty() {
            return Err(CatalogError::EmptyEnvironment("targets"));
        }

        let position = |list: &[String], name: &str| list.iter().position(|n| n == name);
        let default_platform = position(&environment.platforms, &environment.default_platform)
            .ok_or_else(|| CatalogError::UnknownDefault {
                kind: "platform",
                name: environment.default_platform.clone(),
            })?;
        let default_os = position(&environment.operating_systems, &environment.default_os)
            .ok_or_else(|| CatalogError::UnknownDefault {
                kind: "operating system",
                name: environment.default_os.clone(),
            })?;
        let default_target = environment
            .targets
            .iter()
            .position(|t| t.name == environment.default_target)
            .ok_or_else(|| CatalogError::UnknownDefault {
                kind: "target",
                name: environment.default_target.clone(),
            })?;

        let mut catalog = Catalog {
            packages: Vec::new(),
            packages_rev: HashMap::new(),
            virtuals: Vec::new(),
            virtuals_rev: HashMap::new(),
            platforms: environment.platforms,
            oses: environment.operating_systems,
            targets: environment.targets,
            compilers: environment.compilers,
            externals: Vec::new(),
            default_platform: PlatformId::from_index(default_platform),
            default_os: OsId::from_index(default_os),
            default_target: TargetId::from_index(default_target),
        };

        // Phase 1: intern packages in name order.
        let mut names = repo.all_packages();
        names.sort();
        for name in names {
            let Some(def) = repo.package(&name) else {
                continue;
            };
            if catalog.packages_rev.contains_key(&def.name) {
                return Err(CatalogError::DuplicatePackage(def.name));
            }
            for variant in &def.variants {
                let limit = if variant.multi {
                    MAX_MULTI_VALUES
                } else {
                    MAX_SINGLE_VALUES
                };
                if variant.values.len() > limit {
                    return Err(CatalogError::VariantTooWide {
                        package: def.name.clone(),
                        variant: variant.name.clone(),
                        count: variant.values.len(),
                    });
                }
                let defaults_ok = !variant.defaults.is_empty()
                    && (variant.multi || variant.defaults.len() == 1)
                    && variant.mask_of(variant.defaults.iter().map(String::as_str)).is_some();
                if !defaults_ok {
                    return Err(CatalogError::InvalidVariantDefault {
                        package: def.name.clone(),
                        variant: variant.name.clone(),
                    });
                }
            }
            let max_retained_defaults = def
                .variants
                .iter()
                .filter(|v| v.multi)
                .map(|v| v.defaults.len() as u32)
                .sum();
            let id = PackageId::from_index(catalog.packages.len());
            catalog.packages_rev.insert(def.name.clone(), id);
            catalog.packages.push(PackageEntry {
                def,
                dependency_targets: Vec::new(),
                externals: Vec::new(),
                max_retained_defaults,
            });
        }

        // Phase 2: virtual names from provides declarations.
        for index in 0..catalog.packages.len() {
            let pid = PackageId::from_index(index);
            for (decl_index, decl) in catalog.packages[index].def.provides.iter().enumerate() {
                let vid = match catalog.virtuals_rev.get(&decl.virtual_name) {
                    Some(&vid) => vid,
                    None => {
                        let vid = VirtualId::from_index(catalog.virtuals.len());
                        catalog.virtuals_rev.insert(decl.virtual_name.clone(), vid);
                        catalog.virtuals.push(VirtualEntry {
                            name: decl.virtual_name.clone(),
                            providers: Vec::new(),
                        });
                        vid
                    }
                };
                catalog.virtuals[vid.index()].providers.push((pid, decl_index));
            }
        }

        // Phase 3: resolve dependency targets and validate references.
        for index in 0..catalog.packages.len() {
            let def = &catalog.packages[index].def;
            let mut targets = Vec::with_capacity(def.dependencies.len());
            for template in &def.dependencies {
                let target = catalog.dependency_target(&template.name).ok_or_else(|| {
                    CatalogError::UnknownDependency {
                        package: def.name.clone(),
                        dependency: template.name.clone(),
                    }
                })?;
                targets.push(target);
            }
            let conditions = def
                .dependencies
                .iter()
                .map(|t| &t.when)
                .chain(def.conflicts.iter().map(|c| &c.when))
                .chain(def.provides.iter().map(|p| &p.when));
            for condition in conditions {
                catalog.validate_condition(&def.name, condition)?;
            }
            for assertion in def.dependencies.iter().flat_map(|t| &t.imposes) {
                catalog.validate_assertion(&def.name, assertion)?;
            }
            catalog.packages[index].dependency_targets = targets;
        }

        // Phase 4: externals.
        for external in environment.externals {
            let pid = catalog.package_id(&external.package).ok_or_else(|| {
                CatalogError::UnknownExternal {
                    package: external.package.clone(),
                    version: external.version.to_string(),
                }
            })?;
            let def = &catalog.packages[pid.index()].def;
            for (name, values) in &external.variants {
                let known = def.variants.iter().find(|v| &v.name == name).is_some_and(|v| {
                    v.mask_of(values.iter().map(String::as_str)).is_some()
                        && (v.multi || values.len() == 1)
                });
                if !known {
                    return Err(CatalogError::UnknownReference {
                        package: external.package.clone(),
                        kind: "external variant",
                        name: name.clone(),
                    });
                }
            }
            catalog.check_name(&external.package, "platform", external.platform.as_deref())?;
            catalog.check_name(&external.package, "operating system", external.os.as_deref())?;
            catalog.check_name(&external.package, "target", external.target.as_deref())?;
            if let Some((name, version)) = &external.compiler {
                if catalog.compiler_exact(name, version).is_none() {
                    return Err(CatalogError::UnknownReference {
                        package: external.package.clone(),
                        kind: "compiler",
                        name: format!("{name}@{version}"),
                    });
                }
            }
            let eid = ExternalId::from_index(catalog.externals.len());
            catalog.packages[pid.index()].externals.push(eid);
            catalog.externals.push(external);
        }

        for compiler in &catalog.compilers {
            let label = compiler.to_string();
            for target in &compiler.targets {
                catalog.check_name(&label, "target", Some(target))?;
            }
            for os in &compiler.operating_systems {
                catalog.check_name(&label, "operating system", Some(os))?;
            }
        }

        Ok(catalog)
    }

    fn check_name(
        &self,
        owner: &str,
        kind: &'static str,
        name: Option<&str>,
    ) -> Result<(), CatalogError> {
        let Some(name) = name else {
            return Ok(());
        };
        let known = match kind {
            "platform" => self.platform_id(name).is_some(),
            "operating system" => self.os_id(name).is_some(),
            "target" => self.target_id(name).is_some(),
            "compiler" => self.compilers.iter().any(|c| c.name == name),
            "package" => self.dependency_target(name).is_some(),
            _ => true,
        };
        if known {
            Ok(())
        } else {
            Err(CatalogError::UnknownReference {
                package: owner.to_string(),
                kind,
                name: name.to_string(),
            })
        }
    }

    fn validate_condition(&self, owner: &str, condition: &Condition) -> Result<(), CatalogError> {
        for (slot, predicate) in condition.terms() {
            if let Slot::Package(name) = slot {
                self.check_name(owner, "package", Some(name))?;
            }
            match predicate {
                Predicate::Compiler(name) | Predicate::CompilerVersion { name, .. } => {
                    self.check_name(owner, "compiler", Some(name))?
                }
                Predicate::Platform(name) => self.check_name(owner, "platform", Some(name))?,
                Predicate::Os(name) => self.check_name(owner, "operating system", Some(name))?,
                Predicate::Target(name) => self.check_name(owner, "target", Some(name))?,
                Predicate::Present
                | Predicate::Version(_)
                | Predicate::Variant { .. }
                | Predicate::External => {}
            }
        }
        Ok(())
    }

    pub(crate) fn validate_assertion(
        &self,
        owner: &str,
        assertion: &Assertion,
    ) -> Result<(), CatalogError> {
        match assertion {
            Assertion::Compiler(name) | Assertion::CompilerVersion { name, .. } => {
                self.check_name(owner, "compiler", Some(name))
            }
            Assertion::Platform(name) => self.check_name(owner, "platform", Some(name)),
            Assertion::Os(name) => self.check_name(owner, "operating system", Some(name)),
            Assertion::Target(name) => self.check_name(owner, "target", Some(name)),
            Assertion::Version(_) | Assertion::Variant { .. } | Assertion::Flag { .. } => Ok(()),
        }
    }

    // --- packages ---

    pub fn package_id(&self, name: &str) -> Option<PackageId> {
        self.packages_rev.get(name).copied()
    }

    pub fn package(&self, id: PackageId) -> &PackageEntry {
        &self.packages[id.index()]
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn package_ids(&self) -> impl Iterator<Item = PackageId> + '_ {
        (0..self.packages.len()).map(PackageId::from_index)
    }

    /// Resolve a dependency name: a concrete package wins over a virtual.
    pub fn dependency_target(&self, name: &str) -> Option<DependencyTarget> {
        if let Some(pid) = self.package_id(name) {
            return Some(DependencyTarget::Package(pid));
        }
        self.virtual_id(name).map(DependencyTarget::Virtual)
    }

    // --- virtuals ---

    pub fn virtual_id(&self, name: &str) -> Option<VirtualId> {
        self.virtuals_rev.get(name).copied()
    }

    pub fn virtual_entry(&self, id: VirtualId) -> &VirtualEntry {
        &self.virtuals[id.index()]
    }

    pub fn virtual_count(&self) -> usize {
        self.virtuals.len()
    }

    /// Provides declaration of `package` for `virtual_id`, if any.
    pub fn provides_decl(&self, package: PackageId, virtual_id: VirtualId) -> Option<&ProvidesDecl> {
        self.virtuals[virtual_id.index()]
            .providers
            .iter()
            .find(|(pid, _)| *pid == package)
            .map(|&(pid, index)| &self.packages[pid.index()].def.provides[index])
    }

    // --- environment ---

    pub fn platform_id(&self, name: &str) -> Option<PlatformId> {
        self.platforms
            .iter()
            .position(|p| p == name)
            .map(PlatformId::from_index)
    }

    pub fn platform_name(&self, id: PlatformId) -> &str {
        &self.platforms[id.index()]
    }

    pub fn os_id(&self, name: &str) -> Option<OsId> {
        self.oses.iter().position(|o| o == name).map(OsId::from_index)
    }

    pub fn os_name(&self, id: OsId) -> &str {
        &self.oses[id.index()]
    }

    pub fn target_id(&self, name: &str) -> Option<TargetId> {
        self.targets
            .iter()
            .position(|t| t.name == name)
            .map(TargetId::from_index)
    }

    pub fn target(&self, id: TargetId) -> &TargetDef {
        &self.targets[id.index()]
    }

    pub fn target_ids(&self) -> impl Iterator<Item = TargetId> + '_ {
        (0..self.targets.len()).map(TargetId::from_index)
    }

    pub fn compiler(&self, id: CompilerId) -> &CompilerDef {
        &self.compilers[id.index()]
    }

    pub fn compiler_ids(&self) -> impl Iterator<Item = CompilerId> + '_ {
        (0..self.compilers.len()).map(CompilerId::from_index)
    }

    pub fn compiler_count(&self) -> usize {
        self.compilers.len()
    }

    /// Compiler with exactly this name and version.
    pub fn compiler_exact(&self, name: &str, version: &Version) -> Option<CompilerId> {
        self.compilers
            .iter()
            .position(|c| c.name == name && &c.version == version)
            .map(CompilerId::from_index)
    }

    pub fn has_compiler_named(&self, name: &str) -> bool {
        self.compilers.iter().any(|c| c.name == name)
    }

    /// Whether `compiler` can generate code for `target`.
    pub fn compiler_supports_target(&self, compiler: CompilerId, target: TargetId) -> bool {
        let name = &self.targets[target.index()].name;
        self.compilers[compiler.index()].targets.iter().any(|t| t == name)
    }

    /// Whether `compiler` is available on `os`.
    pub fn compiler_supports_os(&self, compiler: CompilerId, os: OsId) -> bool {
        let name = &self.oses[os.index()];
        self.compilers[compiler.index()]
            .operating_systems
            .iter()
            .any(|o| o == name)
    }

    pub fn external(&self, id: ExternalId) -> &ExternalSpec {
        &self.externals[id.index()]
    }

    pub fn default_platform(&self) -> PlatformId {
        self.default_platform
    }

    pub fn default_os(&self) -> OsId {
        self.default_os
    }

    pub fn default_target(&self) -> TargetId {
        self.default_target
    }

    /// Sum over every package of the multi-valued defaults it could retain.
    pub fn total_retained_defaults(&self) -> u32 {
        self.packages.iter().map(|p| p.max_retained_defaults).sum()
    }
}
