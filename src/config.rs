//! Solver configuration and user preferences.
//!
//! [`SolverConfig`] and [`Preferences`] are plain data with builder-style
//! setters and [`serde::Deserialize`] support, so they can be read from a
//! JSON document. Before a solve they are resolved against the catalog into
//! an internal `Policy` with interned ids.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use crate::catalog::{Catalog, CompilerId, OsId, PackageId, PlatformId, TargetId, VirtualId};
use crate::error::RequestError;
use crate::version_match::VersionRange;

/// Per-package preferences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackagePreferences {
    /// Preferred version ranges, best first.
    pub versions: Vec<String>,
    /// Variant defaults overriding the catalog's.
    pub variants: BTreeMap<String, Vec<String>>,
    /// Provider order per virtual for dependencies of this package.
    pub providers: BTreeMap<String, Vec<String>>,
    /// `false` restricts the package to its externals.
    pub buildable: bool,
}

impl Default for PackagePreferences {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            variants: BTreeMap::new(),
            providers: BTreeMap::new(),
            buildable: true,
        }
    }
}

/// Preference sources layered over catalog weights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub packages: BTreeMap<String, PackagePreferences>,
    /// Global provider order per virtual.
    pub providers: BTreeMap<String, Vec<String>>,
    /// Compiler order, as `name` or `name@range`.
    pub compilers: Vec<String>,
    /// Target order.
    pub targets: Vec<String>,
}

impl Preferences {
    pub fn new() -> Self {
        Self::default()
    }

    fn package_mut(&mut self, package: &str) -> &mut PackagePreferences {
        self.packages.entry(package.to_string()).or_default()
    }

    pub fn with_version_preference(mut self, package: &str, ranges: &[&str]) -> Self {
        self.package_mut(package).versions = to_strings(ranges);
        self
    }

    pub fn with_variant_default(mut self, package: &str, variant: &str, values: &[&str]) -> Self {
        self.package_mut(package)
            .variants
            .insert(variant.to_string(), to_strings(values));
        self
    }

    pub fn with_provider_order(mut self, virtual_name: &str, providers: &[&str]) -> Self {
        self.providers
            .insert(virtual_name.to_string(), to_strings(providers));
        self
    }

    pub fn with_package_provider_order(
        mut self,
        package: &str,
        virtual_name: &str,
        providers: &[&str],
    ) -> Self {
        self.package_mut(package)
            .providers
            .insert(virtual_name.to_string(), to_strings(providers));
        self
    }

    pub fn with_compiler_order(mut self, compilers: &[&str]) -> Self {
        self.compilers = to_strings(compilers);
        self
    }

    pub fn with_target_order(mut self, targets: &[&str]) -> Self {
        self.targets = to_strings(targets);
        self
    }

    pub fn with_not_buildable(mut self, package: &str) -> Self {
        self.package_mut(package).buildable = false;
        self
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Knobs for one solve.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum number of branching decisions; `None` is unbounded.
    pub max_decisions: Option<u64>,
    /// Wall-clock limit in milliseconds.
    pub time_limit_ms: Option<u64>,
    pub allow_deprecated: bool,
    /// Expand test dependencies of root nodes.
    pub include_test_dependencies: bool,
    pub default_platform: Option<String>,
    pub default_os: Option<String>,
    pub default_target: Option<String>,
    /// Compilers usable on any OS, as `name` or `name@range`.
    pub allowed_compilers: Vec<String>,
    /// Run the version-level relaxation to explain failures.
    pub explain: bool,
    pub preferences: Preferences,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_decisions: Some(1_000_000),
            time_limit_ms: None,
            allow_deprecated: false,
            include_test_dependencies: false,
            default_platform: None,
            default_os: None,
            default_target: None,
            allowed_compilers: Vec::new(),
            explain: true,
            preferences: Preferences::default(),
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration document.
    pub fn from_json(text: &str) -> Result<Self, RequestError> {
        serde_json::from_str(text).map_err(|e| RequestError::Config(e.to_string()))
    }

    pub fn with_max_decisions(mut self, max: u64) -> Self {
        self.max_decisions = Some(max);
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.max_decisions = None;
        self.time_limit_ms = None;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_ms = Some(limit.as_millis() as u64);
        self
    }

    pub fn with_allow_deprecated(mut self, allow: bool) -> Self {
        self.allow_deprecated = allow;
        self
    }

    pub fn with_test_dependencies(mut self, include: bool) -> Self {
        self.include_test_dependencies = include;
        self
    }

    pub fn with_default_platform(mut self, platform: &str) -> Self {
        self.default_platform = Some(platform.to_string());
        self
    }

    pub fn with_default_os(mut self, os: &str) -> Self {
        self.default_os = Some(os.to_string());
        self
    }

    pub fn with_default_target(mut self, target: &str) -> Self {
        self.default_target = Some(target.to_string());
        self
    }

    pub fn with_allowed_compiler(mut self, compiler: &str) -> Self {
        self.allowed_compilers.push(compiler.to_string());
        self
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }
}

/// Parse `name` or `name@range`.
fn parse_compiler_spec(text: &str) -> Result<(String, VersionRange), RequestError> {
    match text.split_once('@') {
        Some((name, range)) => Ok((name.trim().to_string(), VersionRange::parse(range)?)),
        None => Ok((text.trim().to_string(), VersionRange::Any)),
    }
}

fn config_error(what: &str, name: &str) -> RequestError {
    RequestError::Config(format!("unknown {what} `{name}`"))
}

/// Configuration resolved against a catalog.
#[derive(Debug, Clone)]
pub(crate) struct Policy {
    pub allow_deprecated: bool,
    pub include_test_dependencies: bool,
    pub max_decisions: Option<u64>,
    pub time_limit: Option<Duration>,
    pub explain: bool,
    pub default_platform: PlatformId,
    pub default_os: OsId,
    pub default_target: TargetId,
    version_preferences: HashMap<PackageId, Vec<VersionRange>>,
    variant_defaults: HashMap<(PackageId, usize), u32>,
    global_providers: HashMap<VirtualId, Vec<PackageId>>,
    package_providers: HashMap<(PackageId, VirtualId), Vec<PackageId>>,
    compiler_weights: Vec<u32>,
    target_weights: Vec<u32>,
    non_buildable: HashSet<PackageId>,
    allowed_compilers: HashSet<CompilerId>,
}

impl Policy {
    pub fn resolve(config: &SolverConfig, catalog: &Catalog) -> Result<Self, RequestError> {
        let prefs = &config.preferences;

        let default_platform = match &config.default_platform {
            Some(name) => catalog
                .platform_id(name)
                .ok_or_else(|| config_error("platform", name))?,
            None => catalog.default_platform(),
        };
        let default_os = match &config.default_os {
            Some(name) => catalog
                .os_id(name)
                .ok_or_else(|| config_error("operating system", name))?,
            None => catalog.default_os(),
        };
        let default_target = match &config.default_target {
            Some(name) => catalog
                .target_id(name)
                .ok_or_else(|| config_error("target", name))?,
            None => catalog.default_target(),
        };

        let package = |name: &str| {
            catalog
                .package_id(name)
                .ok_or_else(|| config_error("package", name))
        };
        let virtual_name = |name: &str| {
            catalog
                .virtual_id(name)
                .ok_or_else(|| config_error("virtual", name))
        };
        let providers = |names: &[String]| -> Result<Vec<PackageId>, RequestError> {
            names.iter().map(|n| package(n.as_str())).collect()
        };

        let mut version_preferences = HashMap::new();
        let mut variant_defaults = HashMap::new();
        let mut package_providers = HashMap::new();
        let mut non_buildable = HashSet::new();
        for (name, pkg_prefs) in &prefs.packages {
            let pid = package(name.as_str())?;
            if !pkg_prefs.versions.is_empty() {
                let ranges = pkg_prefs
                    .versions
                    .iter()
                    .map(|r| VersionRange::parse(r))
                    .collect::<Result<Vec<_>, _>>()?;
                version_preferences.insert(pid, ranges);
            }
            let def = &catalog.package(pid).def;
            for (variant, values) in &pkg_prefs.variants {
                let index = def
                    .variant_index(variant)
                    .ok_or_else(|| config_error("variant", &format!("{name}.{variant}")))?;
                let variant_def = &def.variants[index];
                let mask = variant_def
                    .mask_of(values.iter().map(String::as_str))
                    .filter(|_| variant_def.multi || values.len() == 1)
                    .filter(|mask| *mask != 0)
                    .ok_or_else(|| {
                        RequestError::Config(format!(
                            "invalid default {values:?} for variant `{name}.{variant}`"
                        ))
                    })?;
                variant_defaults.insert((pid, index), mask);
            }
            for (virt, order) in &pkg_prefs.providers {
                package_providers.insert((pid, virtual_name(virt.as_str())?), providers(order)?);
            }
            if !pkg_prefs.buildable {
                non_buildable.insert(pid);
            }
        }

        let mut global_providers = HashMap::new();
        for (virt, order) in &prefs.providers {
            global_providers.insert(virtual_name(virt.as_str())?, providers(order)?);
        }

        let compiler_order = prefs
            .compilers
            .iter()
            .map(|spec| parse_compiler_spec(spec))
            .collect::<Result<Vec<_>, _>>()?;
        let compiler_weights = catalog
            .compiler_ids()
            .map(|cid| {
                let compiler = catalog.compiler(cid);
                compiler_order
                    .iter()
                    .position(|(name, range)| {
                        *name == compiler.name && range.satisfied_by(&compiler.version)
                    })
                    .map(|i| i as u32)
                    .unwrap_or(compiler_order.len() as u32 + compiler.weight)
            })
            .collect();

        let target_weights = catalog
            .target_ids()
            .map(|tid| {
                let target = catalog.target(tid);
                prefs
                    .targets
                    .iter()
                    .position(|t| *t == target.name)
                    .map(|i| i as u32)
                    .unwrap_or(prefs.targets.len() as u32 + target.weight)
            })
            .collect();

        let mut allowed_compilers = HashSet::new();
        for spec in &config.allowed_compilers {
            let (name, range) = parse_compiler_spec(spec)?;
            if !catalog.has_compiler_named(&name) {
                return Err(config_error("compiler", spec));
            }
            allowed_compilers.extend(catalog.compiler_ids().filter(|&cid| {
                let compiler = catalog.compiler(cid);
                compiler.name == name && range.satisfied_by(&compiler.version)
            }));
        }

        Ok(Policy {
            allow_deprecated: config.allow_deprecated,
            include_test_dependencies: config.include_test_dependencies,
            max_decisions: config.max_decisions,
            time_limit: config.time_limit(),
            explain: config.explain,
            default_platform,
            default_os,
            default_target,
            version_preferences,
            variant_defaults,
            global_providers,
            package_providers,
            compiler_weights,
            target_weights,
            non_buildable,
            allowed_compilers,
        })
    }

    /// Weight of the `index`-th declared version of `package`.
    pub fn version_weight(&self, catalog: &Catalog, package: PackageId, index: usize) -> u32 {
        let declared = &catalog.package(package).def.versions[index];
        match self.version_preferences.get(&package) {
            Some(ranges) => ranges
                .iter()
                .position(|r| r.satisfied_by(&declared.version))
                .map(|i| i as u32)
                .unwrap_or(ranges.len() as u32 + declared.weight),
            None => declared.weight,
        }
    }

    /// Default values of a variant as a bitmask.
    pub fn variant_default(&self, catalog: &Catalog, package: PackageId, variant: usize) -> u32 {
        self.variant_defaults
            .get(&(package, variant))
            .copied()
            .unwrap_or_else(|| catalog.package(package).def.variants[variant].default_mask())
    }

    /// Consumer-specific provider rank.
    pub fn package_provider_rank(
        &self,
        consumer: PackageId,
        virtual_id: VirtualId,
        provider: PackageId,
    ) -> Option<u32> {
        self.package_providers
            .get(&(consumer, virtual_id))?
            .iter()
            .position(|&p| p == provider)
            .map(|i| i as u32)
    }

    /// Smallest consumer-specific rank any consumer could give `provider`.
    pub fn best_package_provider_rank(
        &self,
        virtual_id: VirtualId,
        provider: PackageId,
    ) -> Option<u32> {
        self.package_providers
            .iter()
            .filter(|((_, v), _)| *v == virtual_id)
            .filter_map(|(_, order)| order.iter().position(|&p| p == provider))
            .map(|i| i as u32)
            .min()
    }

    pub fn global_provider_rank(&self, virtual_id: VirtualId, provider: PackageId) -> Option<u32> {
        self.global_providers
            .get(&virtual_id)?
            .iter()
            .position(|&p| p == provider)
            .map(|i| i as u32)
    }

    pub fn compiler_weight(&self, compiler: CompilerId) -> u32 {
        self.compiler_weights[compiler.index()]
    }

    pub fn target_weight(&self, target: TargetId) -> u32 {
        self.target_weights[target.index()]
    }

    pub fn buildable(&self, package: PackageId) -> bool {
        !self.non_buildable.contains(&package)
    }

    /// Whether `compiler` may be used regardless of OS support.
    pub fn compiler_allowed_anywhere(&self, compiler: CompilerId) -> bool {
        self.allowed_compilers.contains(&compiler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CompilerDef, Environment, PackageDef, VariantDef};
    use crate::condition::Condition;
    use crate::repository::InMemoryRepository;
    use portage_atom::Version;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn catalog() -> Catalog {
        let mut repo = InMemoryRepository::new();
        repo.add(
            PackageDef::new("zlib")
                .version(v("1.3"), 0)
                .version(v("1.2.13"), 1)
                .variant(VariantDef::boolean("shared", true)),
        );
        repo.add(PackageDef::new("openblas").version(v("0.3"), 0).provides("blas", Condition::always()));
        repo.add(PackageDef::new("netlib").version(v("3.11"), 0).provides("blas", Condition::always()));
        let env = Environment::host("linux", "ubuntu22.04", &[("x86_64", 0)])
            .compiler(CompilerDef::new("gcc", v("12.2"), 0))
            .compiler(CompilerDef::new("clang", v("16.0"), 1));
        Catalog::new(&repo, env).unwrap()
    }

    #[test]
    fn json_roundtrip_with_defaults() {
        let config = SolverConfig::from_json(
            r#"{
                "max_decisions": 500,
                "preferences": {
                    "packages": { "zlib": { "versions": ["1.2"] } },
                    "providers": { "blas": ["netlib", "openblas"] }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_decisions, Some(500));
        assert!(config.explain);
        assert!(config.preferences.packages["zlib"].buildable);
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            SolverConfig::from_json("{ nope"),
            Err(RequestError::Config(_))
        ));
    }

    #[test]
    fn version_preferences_override_weights() {
        let catalog = catalog();
        let config = SolverConfig::new()
            .with_preferences(Preferences::new().with_version_preference("zlib", &["1.2"]));
        let policy = Policy::resolve(&config, &catalog).unwrap();
        let zlib = catalog.package_id("zlib").unwrap();
        assert_eq!(policy.version_weight(&catalog, zlib, 1), 0);
        assert_eq!(policy.version_weight(&catalog, zlib, 0), 1);
    }

    #[test]
    fn compiler_order_preference() {
        let catalog = catalog();
        let config =
            SolverConfig::new().with_preferences(Preferences::new().with_compiler_order(&["clang"]));
        let policy = Policy::resolve(&config, &catalog).unwrap();
        let clang = catalog.compiler_exact("clang", &v("16.0")).unwrap();
        let gcc = catalog.compiler_exact("gcc", &v("12.2")).unwrap();
        assert!(policy.compiler_weight(clang) < policy.compiler_weight(gcc));
    }

    #[test]
    fn provider_ranks() {
        let catalog = catalog();
        let config = SolverConfig::new().with_preferences(
            Preferences::new()
                .with_provider_order("blas", &["netlib"])
                .with_package_provider_order("zlib", "blas", &["openblas"]),
        );
        let policy = Policy::resolve(&config, &catalog).unwrap();
        let blas = catalog.virtual_id("blas").unwrap();
        let netlib = catalog.package_id("netlib").unwrap();
        let openblas = catalog.package_id("openblas").unwrap();
        let zlib = catalog.package_id("zlib").unwrap();
        assert_eq!(policy.global_provider_rank(blas, netlib), Some(0));
        assert_eq!(policy.global_provider_rank(blas, openblas), None);
        assert_eq!(policy.package_provider_rank(zlib, blas, openblas), Some(0));
        assert_eq!(policy.best_package_provider_rank(blas, openblas), Some(0));
    }

    #[test]
    fn variant_default_override() {
        let catalog = catalog();
        let config = SolverConfig::new().with_preferences(
            Preferences::new().with_variant_default("zlib", "shared", &["false"]),
        );
        let policy = Policy::resolve(&config, &catalog).unwrap();
        let zlib = catalog.package_id("zlib").unwrap();
        assert_eq!(policy.variant_default(&catalog, zlib, 0), 0b01);
    }

    #[test]
    fn unknown_names_rejected() {
        let catalog = catalog();
        let bad_package = SolverConfig::new()
            .with_preferences(Preferences::new().with_not_buildable("ghost"));
        assert!(Policy::resolve(&bad_package, &catalog).is_err());
        let bad_os = SolverConfig::new().with_default_os("plan9");
        assert!(Policy::resolve(&bad_os, &catalog).is_err());
        let bad_compiler = SolverConfig::new().with_allowed_compiler("icc");
        assert!(Policy::resolve(&bad_compiler, &catalog).is_err());
    }
}
