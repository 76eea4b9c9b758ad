//! Concretization of abstract package requests into one optimal dependency
//! graph.
//!
//! A [`Catalog`] holds package definitions (versions, variants, conditional
//! dependencies, conflicts and virtual provides) together with the build
//! [`Environment`]. The [`Concretizer`] turns a [`Request`] into a
//! [`Solution`]: every node gets exactly one version, variant values,
//! compiler, target, operating system, platform and flags, virtual
//! dependencies are bound to one provider, and the graph is the best
//! according to a lexicographic [`Cost`].
//!
//! Version predicates build on [`portage_atom`] versions; when a request
//! turns out to be infeasible a version-level relaxation is handed to
//! [`resolvo`] to explain the conflict.

mod assignment;
mod attributes;
mod catalog;
mod condition;
mod config;
mod error;
mod expand;
mod feasibility;
mod objective;
mod pool;
mod repository;
mod request;
mod solution;
mod solver;
mod version_match;

pub use catalog::{
    Catalog, CompilerDef, CompilerId, ConflictTemplate, DeclaredVersion, DependencyKind,
    DependencyTarget, DependencyTemplate, Environment, ExternalId, ExternalSpec, FlagType, OsId,
    PackageDef, PackageEntry, PackageId, PlatformId, ProvidesDecl, TargetDef, TargetId,
    VariantDef, VirtualEntry, VirtualId, DEV_PATH_VARIANT, MAX_MULTI_VALUES, MAX_SINGLE_VALUES,
    NONE_VALUE, PATCHES_VARIANT,
};
pub use condition::{holds, Assertion, AttributeView, Condition, Predicate, Slot, Truth};
pub use config::{PackagePreferences, Preferences, SolverConfig};
pub use error::{
    CatalogError, ConcretizeError, ConstraintFamily, Infeasibility, RequestError, Result,
    Violation,
};
pub use expand::PROVIDER_PENALTY;
pub use objective::{Cost, TIERS};
pub use repository::{InMemoryRepository, PackageRepository};
pub use request::{Request, RootRequest, SpecConstraint};
pub use solution::{CompilerSpec, ConcreteEdge, ConcreteNode, Solution};
pub use solver::{Concretizer, SearchStats};
pub use version_match::{parse_version, VersionRange};

#[cfg(test)]
mod tests {
    use portage_atom::Version;

    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    fn gcc() -> CompilerDef {
        CompilerDef::new("gcc", v("12.3"), 0)
            .targets(&["x86_64", "aarch64"])
            .operating_systems(&["ubuntu22.04"])
    }

    /// Helper: one platform, one OS, two targets and the given compilers.
    fn host(compilers: Vec<CompilerDef>) -> Environment {
        compilers.into_iter().fold(
            Environment::host("linux", "ubuntu22.04", &[("x86_64", 0), ("aarch64", 1)]),
            Environment::compiler,
        )
    }

    fn catalog(packages: Vec<PackageDef>, env: Environment) -> Catalog {
        let repo: InMemoryRepository = packages.into_iter().collect();
        Catalog::new(&repo, env).unwrap()
    }

    fn solve(catalog: &Catalog, request: Request) -> Solution {
        let solution = Concretizer::new(catalog).concretize(&request).unwrap();
        solution.validate().unwrap();
        solution
    }

    fn solve_with(catalog: &Catalog, config: SolverConfig, request: Request) -> Result<Solution> {
        Concretizer::new(catalog).with_config(config).concretize(&request)
    }

    fn unsatisfiable(result: Result<Solution>) -> Infeasibility {
        match result {
            Err(ConcretizeError::Unsatisfiable(report)) => report,
            Err(other) => panic!("expected an unsatisfiable request, got {other}"),
            Ok(solution) => panic!("expected an unsatisfiable request, got\n{solution}"),
        }
    }

    fn root(name: &str) -> Request {
        Request::single(RootRequest::named(name))
    }

    #[test]
    fn unconditional_dependency_adds_node_and_edge() {
        let catalog = catalog(
            vec![
                PackageDef::new("a")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("b")),
                PackageDef::new("b").version(v("2.1"), 0),
            ],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("a"));

        assert_eq!(solution.nodes.len(), 2);
        assert_eq!(solution.edges.len(), 1);
        assert_eq!(solution.dependencies_of("a"), vec!["b"]);
        assert_eq!(solution.edges[0].kinds, vec![DependencyKind::Link]);
        assert!(solution.optimal);

        let a = solution.node("a").unwrap();
        assert!(a.root);
        assert_eq!(a.version, v("1.0"));
        assert_eq!(a.platform, "linux");
        assert_eq!(a.os, "ubuntu22.04");
        assert_eq!(a.target, "x86_64");
        assert_eq!(a.compiler.as_ref().unwrap().to_string(), "gcc@12.3");
        assert!(!solution.node("b").unwrap().root);
    }

    #[test]
    fn conflict_with_requested_dependency_is_unsatisfiable() {
        let catalog = catalog(
            vec![
                PackageDef::new("a")
                    .version(v("2.0"), 0)
                    .version(v("1.0"), 1)
                    .depends_on(DependencyTemplate::new("b"))
                    .conflicts(ConflictTemplate::new(
                        Condition::this(Predicate::version(":1.9").unwrap())
                            .and_package("b", Predicate::Present),
                        "a before 2.0 cannot be used with b",
                    )),
                PackageDef::new("b").version(v("1.0"), 0),
            ],
            host(vec![gcc()]),
        );
        let request = Request::single(
            RootRequest::new(SpecConstraint::new("a").version(range("1.0")))
                .depends_on(SpecConstraint::new("b")),
        );
        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&request));
        assert_eq!(report.family, ConstraintFamily::Conflict);
        assert!(report.detail.contains("cannot be used with b"), "{report}");

        // The newer version does not trigger the conflict.
        let solution = solve(&catalog, root("a"));
        assert_eq!(solution.node("a").unwrap().version, v("2.0"));
    }

    fn mpi_catalog() -> Catalog {
        catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("mpi")),
                PackageDef::new("tool")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("mpi")),
                PackageDef::new("x").version(v("3.0"), 0).provides("mpi", Condition::always()),
                PackageDef::new("y").version(v("4.1"), 0).provides("mpi", Condition::always()),
            ],
            host(vec![gcc()]),
        )
    }

    #[test]
    fn preferred_provider_is_chosen() {
        let catalog = mpi_catalog();
        let config = SolverConfig::new()
            .with_preferences(Preferences::new().with_provider_order("mpi", &["y", "x"]));
        let solution = solve_with(&catalog, config, root("app")).unwrap();
        solution.validate().unwrap();

        assert!(solution.node("x").is_none());
        assert_eq!(solution.dependencies_of("app"), vec!["y"]);
        assert_eq!(solution.providers["mpi"], solution.node_index("y").unwrap());
        assert_eq!(solution.edges[0].virtual_name.as_deref(), Some("mpi"));
        assert_eq!(solution.cost.provider_weight(), 0);
    }

    #[test]
    fn unranked_providers_fall_back_to_name_order() {
        let catalog = mpi_catalog();
        let solution = solve(&catalog, root("app"));
        assert_eq!(solution.dependencies_of("app"), vec!["x"]);
        assert_eq!(solution.cost.provider_weight(), i64::from(PROVIDER_PENALTY));
    }

    #[test]
    fn package_provider_order_overrides_global_order() {
        let catalog = mpi_catalog();
        let prefs = Preferences::new()
            .with_provider_order("mpi", &["y", "x"])
            .with_package_provider_order("app", "mpi", &["x", "y"]);
        let solution =
            solve_with(&catalog, SolverConfig::new().with_preferences(prefs), root("app")).unwrap();
        assert_eq!(solution.dependencies_of("app"), vec!["x"]);
        assert!(solution.node("y").is_none());
    }

    #[test]
    fn one_provider_serves_every_consumer() {
        let catalog = mpi_catalog();
        let request = Request::new()
            .root(RootRequest::named("app"))
            .root(RootRequest::named("tool"));
        let solution = solve(&catalog, request);
        assert_eq!(solution.dependencies_of("app"), vec!["x"]);
        assert_eq!(solution.dependencies_of("tool"), vec!["x"]);
        assert!(solution.node("y").is_none());
        assert_eq!(solution.roots().count(), 2);
    }

    #[test]
    fn virtual_root_makes_provider_a_root() {
        let catalog = mpi_catalog();
        let solution = solve(&catalog, root("mpi"));
        assert_eq!(solution.nodes.len(), 1);
        assert!(solution.node("x").unwrap().root);
        assert_eq!(solution.providers["mpi"], 0);
    }

    #[test]
    fn conditional_provider_must_hold() {
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("blas")),
                PackageDef::new("openblas")
                    .version(v("0.3"), 0)
                    .variant(VariantDef::boolean("lapack", false))
                    .provides("blas", Condition::this(Predicate::variant("lapack", "true"))),
            ],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("app"));
        assert_eq!(solution.node("openblas").unwrap().variant("lapack"), ["true"]);
        assert_eq!(solution.cost.variant_penalty(), 1);
    }

    #[test]
    fn default_variant_is_kept_without_penalty() {
        let catalog = catalog(
            vec![PackageDef::new("a")
                .version(v("1.0"), 0)
                .variant(VariantDef::boolean("shared", true))],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("a"));
        assert_eq!(solution.node("a").unwrap().variant("shared"), ["true"]);
        assert_eq!(solution.cost.root_variant_penalty(), 0);
        assert_eq!(solution.cost.variant_penalty(), 0);
    }

    #[test]
    fn requested_variant_value_is_not_penalised() {
        let catalog = catalog(
            vec![PackageDef::new("a")
                .version(v("1.0"), 0)
                .variant(VariantDef::boolean("shared", true))],
            host(vec![gcc()]),
        );
        let request = Request::single(SpecConstraint::new("a").variant("shared", "false"));
        let solution = solve(&catalog, request);
        assert_eq!(solution.node("a").unwrap().variant("shared"), ["false"]);
        assert_eq!(solution.cost.root_variant_penalty(), 0);
    }

    #[test]
    fn preference_overrides_catalog_default() {
        let catalog = catalog(
            vec![PackageDef::new("a")
                .version(v("1.0"), 0)
                .variant(VariantDef::single("build_type", &["debug", "release"], "release"))],
            host(vec![gcc()]),
        );
        let prefs = Preferences::new().with_variant_default("a", "build_type", &["debug"]);
        let solution =
            solve_with(&catalog, SolverConfig::new().with_preferences(prefs), root("a")).unwrap();
        assert_eq!(solution.node("a").unwrap().variant("build_type"), ["debug"]);
        assert_eq!(solution.cost.root_variant_penalty(), 0);
    }

    #[test]
    fn multi_valued_variant_keeps_defaults() {
        let catalog = catalog(
            vec![PackageDef::new("gcc-runtime").version(v("1.0"), 0).variant(VariantDef::multi(
                "languages",
                &["c", "cxx", "fortran"],
                &["c", "cxx"],
            ))],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("gcc-runtime"));
        assert_eq!(
            solution.node("gcc-runtime").unwrap().variant("languages"),
            ["c", "cxx"]
        );

        let request =
            Request::single(SpecConstraint::new("gcc-runtime").variant("languages", "fortran"));
        let solution = solve(&catalog, request);
        assert_eq!(
            solution.node("gcc-runtime").unwrap().variant("languages"),
            ["c", "cxx", "fortran"]
        );
        assert_eq!(solution.cost.root_variant_penalty(), 0);
    }

    #[test]
    fn none_value_is_exclusive() {
        let catalog = catalog(
            vec![PackageDef::new("a").version(v("1.0"), 0).variant(VariantDef::multi(
                "fabrics",
                &["none", "ofi", "ucx"],
                &["none"],
            ))],
            host(vec![gcc()]),
        );
        let request = Request::single(SpecConstraint::new("a").variant("fabrics", "ucx"));
        let solution = solve(&catalog, request);
        assert_eq!(solution.node("a").unwrap().variant("fabrics"), ["ucx"]);

        let both = Request::single(
            SpecConstraint::new("a")
                .variant("fabrics", "none")
                .variant("fabrics", "ofi"),
        );
        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&both));
        assert_eq!(report.family, ConstraintFamily::Variant);
    }

    #[test]
    fn unknown_variant_is_rejected_but_dev_path_is_ad_hoc() {
        let catalog = catalog(
            vec![PackageDef::new("a").version(v("1.0"), 0)],
            host(vec![gcc()]),
        );
        let bogus = Request::single(SpecConstraint::new("a").variant("bogus", "1"));
        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&bogus));
        assert_eq!(report.family, ConstraintFamily::Variant);

        let dev = Request::single(SpecConstraint::new("a").variant(DEV_PATH_VARIANT, "/src/a"));
        let solution = solve(&catalog, dev);
        let node = solution.node("a").unwrap();
        assert_eq!(node.variant(DEV_PATH_VARIANT), ["/src/a"]);
        assert!(node.variant(PATCHES_VARIANT).is_empty());
    }

    #[test]
    fn target_unsupported_by_only_compiler_is_unsatisfiable() {
        let old_gcc = CompilerDef::new("gcc", v("4.8"), 0)
            .targets(&["x86_64"])
            .operating_systems(&["ubuntu22.04"]);
        let catalog = catalog(
            vec![PackageDef::new("a").version(v("1.0"), 0)],
            host(vec![old_gcc]),
        );
        let request = Request::single(SpecConstraint::new("a").target("aarch64"));
        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&request));
        assert_eq!(report.family, ConstraintFamily::TargetCompiler);
        assert!(report.explanation.is_none());
    }

    #[test]
    fn compiler_must_be_available_on_the_os() {
        let clang = CompilerDef::new("clang", v("16.0"), 1)
            .targets(&["x86_64"])
            .operating_systems(&["centos8"]);
        let env = host(vec![gcc(), clang]).os("centos8");
        let catalog = catalog(vec![PackageDef::new("a").version(v("1.0"), 0)], env);

        let on_centos = Request::single(SpecConstraint::new("a").os("centos8"));
        let solution = solve(&catalog, on_centos.clone());
        assert_eq!(solution.node("a").unwrap().compiler.as_ref().unwrap().name, "clang");

        let config = SolverConfig::new().with_allowed_compiler("gcc");
        let solution = solve_with(&catalog, config, on_centos).unwrap();
        assert_eq!(solution.node("a").unwrap().compiler.as_ref().unwrap().name, "gcc");
    }

    #[test]
    fn required_compiler_must_support_the_os_unless_allowed() {
        let clang = CompilerDef::new("clang", v("16.0"), 1)
            .targets(&["x86_64", "aarch64"])
            .operating_systems(&["centos8"]);
        let env = host(vec![gcc(), clang]).os("centos8");
        let catalog = catalog(
            vec![
                PackageDef::new("app").version(v("1.0"), 0).depends_on(
                    DependencyTemplate::new("zlib").imposing(Assertion::Compiler("clang".into())),
                ),
                PackageDef::new("zlib").version(v("1.3"), 0),
            ],
            env,
        );

        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&root("app")));
        assert_eq!(report.family, ConstraintFamily::CompilerOs);

        let request = Request::single(SpecConstraint::new("zlib").compiler("clang"));
        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&request));
        assert_eq!(report.family, ConstraintFamily::CompilerOs);

        let config = SolverConfig::new().with_allowed_compiler("clang");
        let solution = solve_with(&catalog, config, request).unwrap();
        let zlib = solution.node("zlib").unwrap();
        assert_eq!(zlib.compiler.as_ref().unwrap().name, "clang");
        assert_eq!(zlib.os, "ubuntu22.04");
    }

    #[test]
    fn explicit_compiler_is_inherited_by_dependencies() {
        let clang = CompilerDef::new("clang", v("16.0"), 1)
            .targets(&["x86_64", "aarch64"])
            .operating_systems(&["ubuntu22.04"]);
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("zlib")),
                PackageDef::new("zlib").version(v("1.3"), 0),
            ],
            host(vec![gcc(), clang]),
        );
        let solution = solve(&catalog, root("app"));
        assert_eq!(solution.node("zlib").unwrap().compiler.as_ref().unwrap().name, "gcc");

        let request = Request::single(SpecConstraint::new("app").compiler("clang"));
        let solution = solve(&catalog, request);
        for node in &solution.nodes {
            assert_eq!(node.compiler.as_ref().unwrap().name, "clang", "{node}");
        }
    }

    #[test]
    fn compiler_order_preference() {
        let clang = CompilerDef::new("clang", v("16.0"), 1)
            .targets(&["x86_64", "aarch64"])
            .operating_systems(&["ubuntu22.04"]);
        let catalog = catalog(
            vec![PackageDef::new("a").version(v("1.0"), 0)],
            host(vec![gcc(), clang]),
        );
        let prefs = Preferences::new().with_compiler_order(&["clang"]);
        let solution =
            solve_with(&catalog, SolverConfig::new().with_preferences(prefs), root("a")).unwrap();
        assert_eq!(solution.node("a").unwrap().compiler.as_ref().unwrap().name, "clang");
        assert_eq!(solution.cost.compiler_weight(), 0);
    }

    #[test]
    fn target_is_inherited_from_parent() {
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("zlib")),
                PackageDef::new("zlib").version(v("1.3"), 0),
            ],
            host(vec![gcc()]),
        );
        let request = Request::single(SpecConstraint::new("app").target("aarch64"));
        let solution = solve(&catalog, request);
        assert_eq!(solution.node("zlib").unwrap().target, "aarch64");
    }

    #[test]
    fn os_is_inherited_from_parent() {
        let gcc = gcc().operating_systems(&["ubuntu22.04", "centos8"]);
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("zlib")),
                PackageDef::new("zlib").version(v("1.3"), 0),
            ],
            host(vec![gcc]).os("centos8"),
        );
        let request = Request::single(SpecConstraint::new("app").os("centos8"));
        let solution = solve(&catalog, request);
        assert_eq!(solution.node("zlib").unwrap().os, "centos8");

        let clash = Request::single(
            RootRequest::new(SpecConstraint::new("app").os("centos8"))
                .depends_on(SpecConstraint::new("zlib").os("ubuntu22.04")),
        );
        let solution = solve(&catalog, clash);
        assert_eq!(solution.node("zlib").unwrap().os, "ubuntu22.04");
    }

    #[test]
    fn flags_propagate_to_dependencies_with_the_same_compiler() {
        let gcc = gcc().flag(FlagType::CFlags, &["-O2"]);
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("zlib")),
                PackageDef::new("zlib").version(v("1.3"), 0),
            ],
            host(vec![gcc]),
        );
        let solution = solve(&catalog, root("app"));
        for node in &solution.nodes {
            assert_eq!(node.flags[&FlagType::CFlags], ["-O2"]);
        }

        let request =
            Request::single(SpecConstraint::new("app").flag(FlagType::CFlags, &["-O3", "-g"]));
        let solution = solve(&catalog, request);
        assert_eq!(solution.node("zlib").unwrap().flags[&FlagType::CFlags], ["-O3", "-g"]);
        assert!(!solution.node("zlib").unwrap().flags.contains_key(&FlagType::LdFlags));
    }

    #[test]
    fn external_is_used_as_a_whole() {
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("cmake").kind(DependencyKind::Build)),
                PackageDef::new("cmake")
                    .version(v("3.28"), 0)
                    .depends_on(DependencyTemplate::new("openssl")),
                PackageDef::new("openssl").version(v("3.1"), 0),
            ],
            host(vec![gcc()]).external(ExternalSpec::new("cmake", v("3.27"), "/usr")),
        );
        let solution = solve(&catalog, root("app"));
        let cmake = solution.node("cmake").unwrap();
        assert!(cmake.is_external());
        assert_eq!(cmake.external.as_deref(), Some("/usr"));
        assert_eq!(cmake.version, v("3.27"));
        assert!(cmake.compiler.is_none());
        assert!(solution.node("openssl").is_none());
        assert_eq!(solution.edges[0].kinds, vec![DependencyKind::Build]);

        let built = Request::single(
            RootRequest::named("app").depends_on(SpecConstraint::new("cmake").version(range("3.28"))),
        );
        let solution = solve(&catalog, built);
        assert!(!solution.node("cmake").unwrap().is_external());
        assert!(solution.node("openssl").is_some());
    }

    #[test]
    fn non_buildable_package_without_external_is_unsatisfiable() {
        let catalog = catalog(
            vec![PackageDef::new("a").version(v("1.0"), 0)],
            host(vec![gcc()]),
        );
        let config =
            SolverConfig::new().with_preferences(Preferences::new().with_not_buildable("a"));
        let report = unsatisfiable(solve_with(&catalog, config, root("a")));
        assert_eq!(report.family, ConstraintFamily::Version);
    }

    #[test]
    fn version_preferences_and_deprecation() {
        let catalog = catalog(
            vec![PackageDef::new("zlib")
                .declared(DeclaredVersion::new(v("1.3"), 0).deprecated())
                .version(v("1.2.13"), 1)
                .version(v("1.2.11"), 2)],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("zlib"));
        assert_eq!(solution.node("zlib").unwrap().version, v("1.2.13"));

        let config = SolverConfig::new().with_allow_deprecated(true);
        let solution = solve_with(&catalog, config, root("zlib")).unwrap();
        assert_eq!(solution.node("zlib").unwrap().version, v("1.3"));

        let prefs = Preferences::new().with_version_preference("zlib", &["1.2.11"]);
        let solution =
            solve_with(&catalog, SolverConfig::new().with_preferences(prefs), root("zlib")).unwrap();
        assert_eq!(solution.node("zlib").unwrap().version, v("1.2.11"));
    }

    #[test]
    fn requested_dependency_must_be_reachable() {
        let catalog = catalog(
            vec![
                PackageDef::new("app").version(v("1.0"), 0),
                PackageDef::new("zlib").version(v("1.3"), 0).version(v("1.2"), 1),
            ],
            host(vec![gcc()]),
        );
        let request = Request::single(RootRequest::named("app").depends_on(SpecConstraint::new("zlib")));
        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&request));
        assert_eq!(report.family, ConstraintFamily::Reachability);
    }

    #[test]
    fn dependency_constraint_applies_to_the_dependency() {
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("zlib")),
                PackageDef::new("zlib").version(v("1.3"), 0).version(v("1.2"), 1),
            ],
            host(vec![gcc()]),
        );
        let request = Request::single(
            RootRequest::named("app").depends_on(SpecConstraint::new("zlib").version(range("1.2"))),
        );
        let solution = solve(&catalog, request);
        assert_eq!(solution.node("zlib").unwrap().version, v("1.2"));
    }

    #[test]
    fn conditional_dependency_follows_variant() {
        let catalog = catalog(
            vec![
                PackageDef::new("hdf5")
                    .version(v("1.14"), 0)
                    .variant(VariantDef::boolean("mpi", false))
                    .depends_on(
                        DependencyTemplate::new("mpich")
                            .when(Condition::this(Predicate::variant("mpi", "true"))),
                    ),
                PackageDef::new("mpich").version(v("4.1"), 0),
            ],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("hdf5"));
        assert!(solution.node("mpich").is_none());

        let request = Request::single(SpecConstraint::new("hdf5").variant("mpi", "true"));
        let solution = solve(&catalog, request);
        assert_eq!(solution.dependencies_of("hdf5"), vec!["mpich"]);
    }

    #[test]
    fn imposed_assertions_constrain_the_dependency() {
        let catalog = catalog(
            vec![
                PackageDef::new("app").version(v("1.0"), 0).depends_on(
                    DependencyTemplate::new("zlib")
                        .imposing(Assertion::version("1.2").unwrap())
                        .imposing(Assertion::variant("shared", "false")),
                ),
                PackageDef::new("zlib")
                    .version(v("1.3"), 0)
                    .version(v("1.2"), 1)
                    .variant(VariantDef::boolean("shared", true)),
            ],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("app"));
        let zlib = solution.node("zlib").unwrap();
        assert_eq!(zlib.version, v("1.2"));
        assert_eq!(zlib.variant("shared"), ["false"]);
        // Imposed values are not explicit: they still count as non-default.
        assert_eq!(solution.cost.variant_penalty(), 1);
    }

    #[test]
    fn test_dependencies_are_opt_in_for_roots() {
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("gtest").kind(DependencyKind::Test)),
                PackageDef::new("gtest").version(v("1.14"), 0),
            ],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("app"));
        assert!(solution.node("gtest").is_none());

        let config = SolverConfig::new().with_test_dependencies(true);
        let solution = solve_with(&catalog, config, root("app")).unwrap();
        solution.validate().unwrap();
        assert_eq!(solution.edges[0].kinds, vec![DependencyKind::Test]);
    }

    #[test]
    fn edge_kinds_merge() {
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("python").kind(DependencyKind::Build))
                    .depends_on(DependencyTemplate::new("python").kind(DependencyKind::Run)),
                PackageDef::new("python").version(v("3.12"), 0),
            ],
            host(vec![gcc()]),
        );
        let solution = solve(&catalog, root("app"));
        assert_eq!(solution.edges.len(), 1);
        assert_eq!(
            solution.edges[0].kinds,
            vec![DependencyKind::Build, DependencyKind::Run]
        );
    }

    #[test]
    fn dependency_cycle_is_rejected() {
        let catalog = catalog(
            vec![
                PackageDef::new("a")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("b")),
                PackageDef::new("b")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("a")),
            ],
            host(vec![gcc()]),
        );
        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&root("a")));
        assert_eq!(report.family, ConstraintFamily::Cycle);
    }

    #[test]
    fn impossible_version_is_explained() {
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("zlib").imposing(Assertion::version("2").unwrap())),
                PackageDef::new("zlib").version(v("1.3"), 0),
            ],
            host(vec![gcc()]),
        );
        let report = unsatisfiable(Concretizer::new(&catalog).concretize(&root("app")));
        assert_eq!(report.family, ConstraintFamily::Version);
        assert!(report.explanation.as_deref().is_some_and(|e| e.contains("zlib")));

        let quiet = SolverConfig::new().with_explain(false);
        let report = unsatisfiable(solve_with(&catalog, quiet, root("app")));
        assert!(report.explanation.is_none());
    }

    fn two_version_catalog() -> Catalog {
        catalog(
            vec![PackageDef::new("zlib").version(v("1.3"), 0).version(v("1.2"), 1)],
            host(vec![gcc()]),
        )
    }

    #[test]
    fn budget_returns_best_incumbent_as_not_optimal() {
        let catalog = two_version_catalog();
        // origin, platform, os, compiler and target each take one decision.
        let config = SolverConfig::new().with_max_decisions(5);
        let solution = solve_with(&catalog, config, root("zlib")).unwrap();
        assert!(!solution.optimal);
        assert_eq!(solution.node("zlib").unwrap().version, v("1.3"));
        assert_eq!(solution.stats.decisions, 5);
    }

    #[test]
    fn budget_without_incumbent() {
        let catalog = two_version_catalog();
        let config = SolverConfig::new().with_max_decisions(2);
        match solve_with(&catalog, config, root("zlib")) {
            Err(ConcretizeError::BudgetExhausted { decisions }) => assert_eq!(decisions, 2),
            other => panic!("expected budget exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn exhausted_budget_still_reports_proven_infeasibility() {
        let catalog = catalog(
            vec![
                PackageDef::new("app")
                    .version(v("1.0"), 0)
                    .depends_on(DependencyTemplate::new("zlib").imposing(Assertion::version("2").unwrap())),
                PackageDef::new("zlib").version(v("1.3"), 0),
            ],
            host(vec![gcc()]),
        );
        let config = SolverConfig::new().with_max_decisions(0);
        let report = unsatisfiable(solve_with(&catalog, config.clone(), root("app")));
        assert!(report.explanation.is_some());

        match solve_with(&catalog, config.with_explain(false), root("app")) {
            Err(ConcretizeError::BudgetExhausted { decisions }) => assert_eq!(decisions, 0),
            other => panic!("expected budget exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn solving_is_deterministic() {
        let catalog = mpi_catalog();
        let request = Request::new()
            .root(RootRequest::named("tool"))
            .root(RootRequest::named("app"));
        let first = solve(&catalog, request.clone());
        let second = solve(&catalog, request);
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.edges, second.edges);
        assert_eq!(first.cost, second.cost);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn request_errors_surface_before_search() {
        let catalog = two_version_catalog();
        let err = Concretizer::new(&catalog).concretize(&root("ghost")).unwrap_err();
        assert!(matches!(
            err,
            ConcretizeError::Request(RequestError::UnknownPackage(ref name)) if name == "ghost"
        ));
        let err = Concretizer::new(&catalog).concretize(&Request::new()).unwrap_err();
        assert!(matches!(err, ConcretizeError::Request(RequestError::Empty)));
        assert_eq!(err.family(), None);
    }
}
