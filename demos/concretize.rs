//! Example: concretize a small HPC software stack.
//!
//! Models an application on top of an MPI virtual (two providers), HDF5 with
//! a variant-conditional MPI dependency, compression libraries and an
//! external CMake. The stack is solved several times to show how requests
//! and preferences change the chosen graph, and finally a request that has no
//! solution is explained.
//!
//! Set `RUST_LOG=debug` (or `trace`) to follow the search.

use concretizer::{
    Assertion, Catalog, CompilerDef, ConcretizeError, Concretizer, Condition, ConflictTemplate,
    DependencyKind, DependencyTemplate, Environment, ExternalSpec, FlagType, InMemoryRepository,
    PackageDef, Predicate, Preferences, Request, RootRequest, SolverConfig, SpecConstraint,
    VariantDef, VersionRange,
};
use portage_atom::Version;

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

/// Build the package repository.
fn build_repo() -> InMemoryRepository {
    let mut repo = InMemoryRepository::new();

    // -- the application --
    repo.add(
        PackageDef::new("amrex")
            .version(v("24.03"), 0)
            .version(v("23.11"), 1)
            .variant(VariantDef::boolean("hdf5", true))
            .variant(VariantDef::single("build_type", &["Debug", "Release"], "Release"))
            .depends_on(DependencyTemplate::new("mpi"))
            .depends_on(
                DependencyTemplate::new("hdf5")
                    .when(Condition::this(Predicate::variant("hdf5", "true")))
                    .imposing(Assertion::variant("mpi", "true")),
            )
            .depends_on(DependencyTemplate::new("cmake").kind(DependencyKind::Build))
            .conflicts(ConflictTemplate::new(
                Condition::this(Predicate::version(":23.99").unwrap())
                    .and_package("hdf5", Predicate::version("1.14").unwrap()),
                "amrex before 24 does not build against hdf5 1.14",
            )),
    );

    // -- HDF5 with an optional MPI layer --
    repo.add(
        PackageDef::new("hdf5")
            .version(v("1.14.3"), 0)
            .version(v("1.12.2"), 1)
            .variant(VariantDef::boolean("mpi", false))
            .variant(VariantDef::boolean("shared", true))
            .depends_on(
                DependencyTemplate::new("mpi").when(Condition::this(Predicate::variant("mpi", "true"))),
            )
            .depends_on(DependencyTemplate::new("zlib").imposing(Assertion::version("1.2.13:").unwrap())),
    );

    // -- MPI providers --
    repo.add(
        PackageDef::new("openmpi")
            .version(v("5.0.2"), 0)
            .version(v("4.1.6"), 1)
            .variant(VariantDef::multi(
                "fabrics",
                &["none", "ofi", "ucx", "psm2"],
                &["none"],
            ))
            .provides("mpi", Condition::always())
            .depends_on(DependencyTemplate::new("hwloc")),
    );
    repo.add(
        PackageDef::new("mpich")
            .version(v("4.2.0"), 0)
            .provides("mpi", Condition::always())
            .depends_on(DependencyTemplate::new("hwloc")),
    );

    // -- leaves --
    repo.add(PackageDef::new("hwloc").version(v("2.10.0"), 0).version(v("2.9.3"), 1));
    repo.add(
        PackageDef::new("zlib")
            .version(v("1.3.1"), 0)
            .version(v("1.2.13"), 1)
            .variant(VariantDef::boolean("shared", true)),
    );
    repo.add(PackageDef::new("cmake").version(v("3.28.3"), 0));

    repo
}

fn build_environment() -> Environment {
    Environment::host("linux", "ubuntu22.04", &[("x86_64_v3", 0), ("x86_64", 1), ("aarch64", 2)])
        .os("rhel8")
        .compiler(
            CompilerDef::new("gcc", v("13.2"), 0)
                .targets(&["x86_64_v3", "x86_64", "aarch64"])
                .operating_systems(&["ubuntu22.04", "rhel8"])
                .flag(FlagType::CFlags, &["-O2"]),
        )
        .compiler(
            CompilerDef::new("clang", v("17.0.6"), 1)
                .targets(&["x86_64_v3", "x86_64"])
                .operating_systems(&["ubuntu22.04"]),
        )
        .external(ExternalSpec::new("cmake", v("3.27.7"), "/usr"))
}

fn solve_and_print(catalog: &Catalog, config: SolverConfig, request: &Request) {
    match Concretizer::new(catalog).with_config(config).concretize(request) {
        Ok(solution) => {
            print!("{solution}");
            println!("\n  cost:  {}", solution.cost);
            println!(
                "  stats: {} decisions, {} rejected, {} pruned, {} incumbents, {:?}{}",
                solution.stats.decisions,
                solution.stats.rejections,
                solution.stats.pruned,
                solution.stats.solutions,
                solution.stats.elapsed,
                if solution.optimal { "" } else { " (not proven optimal)" }
            );
            for (virtual_name, &index) in &solution.providers {
                println!("  {virtual_name} provided by {}", solution.nodes[index].name);
            }
        }
        Err(ConcretizeError::Unsatisfiable(report)) => {
            println!("Unsatisfiable ({}): {}", report.family, report.detail);
            for (family, count) in &report.rejections {
                println!("  {count:>4} branch(es) rejected by {family}");
            }
            if let Some(explanation) = &report.explanation {
                println!("\nVersion-level explanation:\n{explanation}");
            }
        }
        Err(err) => println!("Error: {err}"),
    }
}

fn banner(title: &str) {
    println!("\n{}\n{title}\n{}", "=".repeat(60), "=".repeat(60));
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let repo = build_repo();
    let catalog = match Catalog::new(&repo, build_environment()) {
        Ok(catalog) => catalog,
        Err(err) => {
            eprintln!("invalid catalog: {err}");
            std::process::exit(1);
        }
    };

    // ── Default concretization ──────────────────────────────────────
    banner("amrex");
    solve_and_print(
        &catalog,
        SolverConfig::new(),
        &Request::single(RootRequest::named("amrex")),
    );

    // ── Preferences: MPICH first, Debug builds ──────────────────────
    banner("amrex  (prefer mpich, build_type=Debug by preference)");
    let prefs = Preferences::new()
        .with_provider_order("mpi", &["mpich", "openmpi"])
        .with_variant_default("amrex", "build_type", &["Debug"]);
    solve_and_print(
        &catalog,
        SolverConfig::new().with_preferences(prefs),
        &Request::single(RootRequest::named("amrex")),
    );

    // ── Explicit constraints on the root and its dependencies ───────
    banner("amrex %clang cflags=\"-O3\" ~hdf5 ^openmpi fabrics=ucx");
    let request = Request::single(
        RootRequest::new(
            SpecConstraint::new("amrex")
                .compiler("clang")
                .flag(FlagType::CFlags, &["-O3"])
                .variant("hdf5", "false"),
        )
        .depends_on(SpecConstraint::new("openmpi").variant("fabrics", "ucx")),
    );
    solve_and_print(&catalog, SolverConfig::new(), &request);

    // ── A different operating system ────────────────────────────────
    banner("amrex os=rhel8 target=aarch64");
    let request = Request::single(SpecConstraint::new("amrex").os("rhel8").target("aarch64"));
    solve_and_print(&catalog, SolverConfig::new(), &request);

    // ── An impossible request ───────────────────────────────────────
    banner("amrex@23.11 ^hdf5@1.14");
    let request = Request::single(
        RootRequest::new(
            SpecConstraint::new("amrex").version(VersionRange::parse("23.11").unwrap()),
        )
        .depends_on(SpecConstraint::new("hdf5").version(VersionRange::parse("1.14").unwrap())),
    );
    solve_and_print(&catalog, SolverConfig::new(), &request);

    // ── A tight budget ──────────────────────────────────────────────
    banner("amrex  (max 20 decisions)");
    solve_and_print(
        &catalog,
        SolverConfig::new().with_max_decisions(20),
        &Request::single(RootRequest::named("amrex")),
    );
}
