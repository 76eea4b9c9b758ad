//! Version-level relaxation solved with resolvo.
//!
//! The relaxation keeps only what can be decided from versions alone:
//! which declared versions and externals exist, dependency templates whose
//! trigger mentions nothing but the owner's version and at most one other
//! package's version (the latter as a resolvo condition), the version ranges
//! those templates impose, and conflicts between the owner's version and one
//! other package. Everything else (variants, compilers, targets, operating
//! systems, triggers on the dependency itself) is dropped, so every concrete graph maps
//! to a solution of the relaxation. When resolvo proves the relaxation
//! unsatisfiable the request is unsatisfiable too, and resolvo's conflict
//! explanation becomes the unsatisfiable core of the report.

use std::collections::HashMap;
use std::fmt;

use log::debug;
use resolvo::{
    Candidates, Condition, ConditionId, ConditionalRequirement, Dependencies, HintDependenciesAvailable,
    KnownDependencies, NameId, Problem, Requirement, SolvableId, Solver, SolverCache, StringId,
    UnsolvableOrCancelled, VersionSetId, VersionSetUnionId,
};

use crate::catalog::{Catalog, DependencyKind, DependencyTarget, PackageId, VirtualId};
use crate::condition::{Assertion, Predicate, Slot};
use crate::pool::{DisplaySolvable, DisplayVersionSet, RelaxedPool, RelaxedSolvable, VersionSet};
use crate::solver::SolveContext;
use crate::version_match::VersionRange;

/// Dependency provider over the relaxed problem.
struct RelaxedProvider {
    pool: RelaxedPool,
    candidates: HashMap<NameId, Vec<SolvableId>>,
    dependencies: HashMap<SolvableId, KnownDependencies>,
    excluded: HashMap<NameId, Vec<(SolvableId, StringId)>>,
}

/// Version-only view of a condition: the owner's version ranges plus at most
/// one `(package, range)` term on another package. `None` if the condition
/// needs anything else.
struct VersionTerms {
    this: Vec<VersionRange>,
    other: Option<(PackageId, VersionRange)>,
}

fn version_terms(catalog: &Catalog, condition: &crate::condition::Condition) -> Option<VersionTerms> {
    if condition.is_never() {
        return None;
    }
    let mut terms = VersionTerms {
        this: Vec::new(),
        other: None,
    };
    for (slot, predicate) in condition.terms() {
        let range = match predicate {
            Predicate::Present => VersionRange::Any,
            Predicate::Version(range) => range.clone(),
            _ => return None,
        };
        match slot {
            Slot::This => terms.this.push(range),
            Slot::Package(name) => {
                let Some(DependencyTarget::Package(pid)) = catalog.dependency_target(name) else {
                    return None;
                };
                match &terms.other {
                    None => terms.other = Some((pid, range)),
                    Some((seen, VersionRange::Any)) if *seen == pid => {
                        terms.other = Some((pid, range));
                    }
                    Some((seen, _)) if *seen == pid && range.is_any() => {}
                    Some(_) => return None,
                }
            }
            Slot::Dependency => return None,
        }
    }
    Some(terms)
}

fn no_dependencies() -> KnownDependencies {
    KnownDependencies {
        requirements: Vec::new(),
        constrains: Vec::new(),
    }
}

impl RelaxedProvider {
    fn new(ctx: &SolveContext<'_>) -> Self {
        let catalog = ctx.catalog;
        let names = catalog
            .package_ids()
            .map(|pid| catalog.package(pid).def.name.clone())
            .collect();
        let mut provider = RelaxedProvider {
            pool: RelaxedPool::new(names),
            candidates: HashMap::new(),
            dependencies: HashMap::new(),
            excluded: HashMap::new(),
        };

        for pid in catalog.package_ids() {
            let entry = catalog.package(pid);
            let name = RelaxedPool::name_of(pid);
            let mut solvables = Vec::new();
            for &eid in &entry.externals {
                let id = provider.pool.intern_solvable(RelaxedSolvable {
                    package: pid,
                    version: catalog.external(eid).version.clone(),
                    weight: 0,
                    external: Some(eid),
                });
                provider.dependencies.insert(id, no_dependencies());
                solvables.push(id);
            }
            if ctx.policy.buildable(pid) {
                for (index, declared) in entry.def.versions.iter().enumerate() {
                    if declared.deprecated && !ctx.policy.allow_deprecated {
                        continue;
                    }
                    let id = provider.pool.intern_solvable(RelaxedSolvable {
                        package: pid,
                        version: declared.version.clone(),
                        weight: ctx.policy.version_weight(catalog, pid, index),
                        external: None,
                    });
                    let deps = provider.built_dependencies(ctx, pid, id);
                    provider.dependencies.insert(id, deps);
                    solvables.push(id);
                }
            }
            provider.candidates.insert(name, solvables);
        }
        provider
    }

    fn any_of(&mut self, package: PackageId) -> VersionSetId {
        self.pool.intern_version_set(VersionSet {
            package,
            range: VersionRange::Any,
            inverted: false,
        })
    }

    /// Condition that holds once a version of `package` within `range` is
    /// selected.
    fn when_selected(&mut self, package: PackageId, range: VersionRange) -> ConditionId {
        let set = self.pool.intern_version_set(VersionSet {
            package,
            range,
            inverted: false,
        });
        self.pool.intern_condition(Condition::Requirement(set))
    }

    /// Requirements that make some provider of `virtual_id` present.
    fn virtual_requirement(&mut self, catalog: &Catalog, virtual_id: VirtualId) -> Requirement {
        let sets: Vec<VersionSetId> = catalog
            .virtual_entry(virtual_id)
            .providers
            .iter()
            .map(|&(pid, _)| self.any_of(pid))
            .collect();
        Requirement::Union(self.pool.intern_version_set_union(sets))
    }

    /// One requirement per imposed version range on `package`, or a bare
    /// presence requirement when none is imposed.
    fn package_requirements<'a>(
        &mut self,
        package: PackageId,
        assertions: impl IntoIterator<Item = &'a Assertion>,
    ) -> Vec<ConditionalRequirement> {
        let mut sets: Vec<VersionSetId> = assertions
            .into_iter()
            .filter_map(|assertion| match assertion {
                Assertion::Version(range) => Some(range.clone()),
                _ => None,
            })
            .map(|range| {
                self.pool.intern_version_set(VersionSet {
                    package,
                    range,
                    inverted: false,
                })
            })
            .collect();
        if sets.is_empty() {
            sets.push(self.any_of(package));
        }
        sets.into_iter()
            .map(|vs| ConditionalRequirement {
                condition: None,
                requirement: Requirement::Single(vs),
            })
            .collect()
    }

    fn built_dependencies(
        &mut self,
        ctx: &SolveContext<'_>,
        package: PackageId,
        solvable: SolvableId,
    ) -> KnownDependencies {
        let catalog = ctx.catalog;
        let entry = catalog.package(package);
        let version = self.pool.resolve_solvable(solvable).version.clone();
        let mut deps = no_dependencies();

        for (t, template) in entry.def.dependencies.iter().enumerate() {
            if template.kind == DependencyKind::Test {
                continue;
            }
            let Some(terms) = version_terms(catalog, &template.when) else {
                continue;
            };
            if !terms.this.iter().all(|r| r.satisfied_by(&version)) {
                continue;
            }
            let condition = match terms.other {
                Some((other, range)) if other == package => {
                    if !range.satisfied_by(&version) {
                        continue;
                    }
                    None
                }
                Some((other, range)) => Some(self.when_selected(other, range)),
                None => None,
            };
            match entry.dependency_targets[t] {
                DependencyTarget::Package(pid) => {
                    let requirements = self.package_requirements(pid, &template.imposes);
                    deps.requirements.extend(requirements.into_iter().map(|r| {
                        ConditionalRequirement { condition, ..r }
                    }));
                }
                DependencyTarget::Virtual(vid) => {
                    let requirement = self.virtual_requirement(catalog, vid);
                    deps.requirements.push(ConditionalRequirement {
                        condition,
                        requirement,
                    });
                }
            }
        }

        for conflict in &entry.def.conflicts {
            let Some(terms) = version_terms(catalog, &conflict.when) else {
                continue;
            };
            if !terms.this.iter().all(|r| r.satisfied_by(&version)) {
                continue;
            }
            match terms.other {
                Some((other, range)) if other != package => {
                    let set = self.pool.intern_version_set(VersionSet {
                        package: other,
                        range,
                        inverted: true,
                    });
                    deps.constrains.push(set);
                }
                Some((_, range)) if !range.satisfied_by(&version) => {}
                _ => {
                    let reason = self.pool.intern_string(conflict.message.clone());
                    self.excluded
                        .entry(RelaxedPool::name_of(package))
                        .or_default()
                        .push((solvable, reason));
                }
            }
        }
        deps
    }

    fn root_requirements(&mut self, ctx: &SolveContext<'_>) -> Vec<ConditionalRequirement> {
        let catalog = ctx.catalog;
        let mut requirements = Vec::new();
        let mut add = |provider: &mut Self, target: DependencyTarget, assertions: &[Assertion]| {
            match target {
                DependencyTarget::Package(pid) => {
                    let constraints = ctx.request.package_constraints.get(&pid);
                    let all = assertions.iter().chain(constraints.into_iter().flatten());
                    requirements.extend(provider.package_requirements(pid, all));
                }
                DependencyTarget::Virtual(vid) => {
                    let requirement = provider.virtual_requirement(catalog, vid);
                    requirements.push(ConditionalRequirement {
                        condition: None,
                        requirement,
                    });
                }
            }
        };
        for root in &ctx.request.roots {
            add(self, root.target, &root.assertions);
            for &required in &root.required {
                add(self, required, &[]);
            }
        }
        requirements
    }
}

struct DisplayName<'a>(&'a RelaxedPool, NameId);

impl fmt::Display for DisplayName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.resolve_name(self.1))
    }
}

struct DisplayString<'a>(&'a RelaxedPool, StringId);

impl fmt::Display for DisplayString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.resolve_string(self.1))
    }
}

impl resolvo::Interner for RelaxedProvider {
    fn display_solvable(&self, solvable: SolvableId) -> impl fmt::Display + '_ {
        DisplaySolvable(&self.pool, solvable)
    }

    fn display_name(&self, name: NameId) -> impl fmt::Display + '_ {
        DisplayName(&self.pool, name)
    }

    fn display_version_set(&self, version_set: VersionSetId) -> impl fmt::Display + '_ {
        DisplayVersionSet(&self.pool, version_set)
    }

    fn display_string(&self, string_id: StringId) -> impl fmt::Display + '_ {
        DisplayString(&self.pool, string_id)
    }

    fn version_set_name(&self, version_set: VersionSetId) -> NameId {
        self.pool.version_set_name(version_set)
    }

    fn solvable_name(&self, solvable: SolvableId) -> NameId {
        self.pool.solvable_name(solvable)
    }

    fn version_sets_in_union(
        &self,
        version_set_union: VersionSetUnionId,
    ) -> impl Iterator<Item = VersionSetId> {
        self.pool
            .resolve_version_set_union(version_set_union)
            .iter()
            .copied()
    }

    fn resolve_condition(&self, condition: ConditionId) -> Condition {
        self.pool.resolve_condition(condition).clone()
    }
}

impl resolvo::DependencyProvider for RelaxedProvider {
    async fn get_candidates(&self, name: NameId) -> Option<Candidates> {
        let solvables = self.candidates.get(&name)?;
        Some(Candidates {
            candidates: solvables.clone(),
            favored: None,
            locked: None,
            hint_dependencies_available: HintDependenciesAvailable::All,
            excluded: self.excluded.get(&name).cloned().unwrap_or_default(),
        })
    }

    async fn sort_candidates(&self, _solver: &SolverCache<Self>, solvables: &mut [SolvableId]) {
        // Best weight first; externals win ties.
        solvables.sort_by_key(|&id| {
            let solvable = self.pool.resolve_solvable(id);
            (solvable.weight, solvable.external.is_none())
        });
    }

    async fn filter_candidates(
        &self,
        candidates: &[SolvableId],
        version_set: VersionSetId,
        inverse: bool,
    ) -> Vec<SolvableId> {
        let set = self.pool.resolve_version_set(version_set);
        candidates
            .iter()
            .copied()
            .filter(|&id| set.matches(&self.pool.resolve_solvable(id).version) != inverse)
            .collect()
    }

    async fn get_dependencies(&self, solvable: SolvableId) -> Dependencies {
        Dependencies::Known(self.dependencies.get(&solvable).cloned().unwrap_or_else(no_dependencies))
    }
}

/// Solve the relaxation; returns resolvo's explanation when it is
/// unsatisfiable and `None` when it has a solution.
pub(crate) fn explain(ctx: &SolveContext<'_>) -> Option<String> {
    let mut provider = RelaxedProvider::new(ctx);
    let requirements = provider.root_requirements(ctx);
    let problem = Problem::new().requirements(requirements);
    let mut solver = Solver::new(provider);
    match solver.solve(problem) {
        Ok(solution) => {
            debug!("relaxation solved with {} solvables", solution.len());
            None
        }
        Err(UnsolvableOrCancelled::Unsolvable(conflict)) => {
            Some(conflict.display_user_friendly(&solver).to_string())
        }
        Err(UnsolvableOrCancelled::Cancelled(_)) => None,
    }
}
