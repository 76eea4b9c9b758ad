use criterion::{black_box, criterion_group, criterion_main, Criterion};
use concretizer::{
    Catalog, CompilerDef, Concretizer, Condition, DependencyTemplate, Environment,
    InMemoryRepository, PackageDef, Predicate, Preferences, Request, RootRequest, SolverConfig,
    VariantDef,
};
use portage_atom::Version;

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

fn environment() -> Environment {
    Environment::host("linux", "ubuntu22.04", &[("x86_64", 0), ("aarch64", 1)])
        .compiler(
            CompilerDef::new("gcc", v("13.2"), 0)
                .targets(&["x86_64", "aarch64"])
                .operating_systems(&["ubuntu22.04"]),
        )
        .compiler(
            CompilerDef::new("clang", v("17.0"), 1)
                .targets(&["x86_64", "aarch64"])
                .operating_systems(&["ubuntu22.04"]),
        )
}

/// A chain of `depth` libraries, each with three versions and a `shared`
/// variant, every one depending on the next.
fn chain(depth: usize) -> Catalog {
    let mut repo = InMemoryRepository::new();
    for i in 0..depth {
        let mut def = PackageDef::new(&format!("lib{i:02}"))
            .version(v("3.0"), 0)
            .version(v("2.0"), 1)
            .version(v("1.0"), 2)
            .variant(VariantDef::boolean("shared", true));
        if i + 1 < depth {
            def = def.depends_on(DependencyTemplate::new(&format!("lib{:02}", i + 1)));
        }
        repo.add(def);
    }
    Catalog::new(&repo, environment()).unwrap()
}

/// An HPC-style stack: an application over an MPI virtual with two
/// providers, a conditional HDF5 layer and a handful of shared leaves.
fn stack() -> Catalog {
    let mut repo = InMemoryRepository::new();
    repo.add(
        PackageDef::new("app")
            .version(v("2.1"), 0)
            .variant(VariantDef::boolean("hdf5", true))
            .depends_on(DependencyTemplate::new("mpi"))
            .depends_on(
                DependencyTemplate::new("hdf5").when(Condition::this(Predicate::variant("hdf5", "true"))),
            )
            .depends_on(DependencyTemplate::new("zlib")),
    );
    repo.add(
        PackageDef::new("hdf5")
            .version(v("1.14.3"), 0)
            .version(v("1.12.2"), 1)
            .variant(VariantDef::boolean("mpi", true))
            .depends_on(DependencyTemplate::new("mpi").when(Condition::this(Predicate::variant("mpi", "true"))))
            .depends_on(DependencyTemplate::new("zlib")),
    );
    for (name, version) in [("openmpi", "5.0.2"), ("mpich", "4.2.0")] {
        repo.add(
            PackageDef::new(name)
                .version(v(version), 0)
                .variant(VariantDef::multi("fabrics", &["none", "ofi", "ucx", "psm2"], &["none"]))
                .provides("mpi", Condition::always())
                .depends_on(DependencyTemplate::new("hwloc")),
        );
    }
    repo.add(PackageDef::new("hwloc").version(v("2.10"), 0).version(v("2.9"), 1));
    repo.add(PackageDef::new("zlib").version(v("1.3.1"), 0).version(v("1.2.13"), 1));
    Catalog::new(&repo, environment()).unwrap()
}

fn bench_chain(c: &mut Criterion) {
    let catalog = chain(12);
    let request = Request::single(RootRequest::named("lib00"));
    c.bench_function("concretize_chain_12", |b| {
        b.iter(|| {
            black_box(Concretizer::new(&catalog).concretize(black_box(&request)).ok());
        })
    });
}

fn bench_stack(c: &mut Criterion) {
    let catalog = stack();
    let request = Request::single(RootRequest::named("app"));
    let config = SolverConfig::new()
        .with_preferences(Preferences::new().with_provider_order("mpi", &["mpich", "openmpi"]));
    c.bench_function("concretize_hpc_stack", |b| {
        b.iter(|| {
            let concretizer = Concretizer::new(&catalog).with_config(config.clone());
            black_box(concretizer.concretize(black_box(&request)).ok());
        })
    });
}

criterion_group!(benches, bench_chain, bench_stack);
criterion_main!(benches);
