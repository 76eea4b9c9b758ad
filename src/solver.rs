//! Branch-and-bound search over attribute and provider choices.
//!
//! The search is depth-first over an explicit stack of choice frames. Each
//! frame remembers the trail checkpoint it was opened at and the next
//! alternative to try; backtracking rolls the [`Assignment`] back to that
//! checkpoint. After every choice the expansion engine propagates to a
//! fixpoint, and any branch whose lower bound cannot beat the incumbent is
//! pruned. Ties keep the first solution found.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{debug, info, log_enabled, trace, Level};

use crate::assignment::{Assignment, NodeId, Origin};
use crate::attributes;
use crate::catalog::{Catalog, CompilerId, OsId, PackageId, PlatformId, TargetId, VirtualId};
use crate::config::{Policy, SolverConfig};
use crate::error::{ConcretizeError, ConstraintFamily, Infeasibility, Result, Violation};
use crate::expand;
use crate::feasibility;
use crate::objective;
use crate::request::{Request, ResolvedRequest};
use crate::solution::Solution;

/// Everything a solve reads: the catalog, the resolved configuration and
/// the interned request.
pub(crate) struct SolveContext<'c> {
    pub catalog: &'c Catalog,
    pub policy: Policy,
    pub request: ResolvedRequest,
}

/// Counters reported with every solution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Choices applied.
    pub decisions: u64,
    /// Branches rejected by a hard constraint.
    pub rejections: u64,
    /// Branches cut by the lower bound.
    pub pruned: u64,
    /// Complete graphs that passed every check.
    pub solutions: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Decision {
    Provider(VirtualId),
    Origin(NodeId),
    Variant(NodeId, usize),
    Platform(NodeId),
    Os(NodeId),
    Compiler(NodeId),
    Target(NodeId),
}

#[derive(Debug, Clone, Copy)]
enum Choice {
    Provider(VirtualId, PackageId),
    Origin(NodeId, Origin),
    Variant(NodeId, usize, u32),
    Platform(NodeId, PlatformId),
    Os(NodeId, OsId),
    Compiler(NodeId, CompilerId),
    Target(NodeId, TargetId),
}

struct Frame {
    mark: usize,
    choices: Vec<Choice>,
    next: usize,
}

/// Rejection counts per constraint family.
#[derive(Default)]
struct Rejections {
    counts: BTreeMap<ConstraintFamily, u64>,
    first: BTreeMap<ConstraintFamily, String>,
}

impl Rejections {
    fn record(&mut self, violation: Violation) {
        trace!("rejected: {violation}");
        *self.counts.entry(violation.family).or_insert(0) += 1;
        self.first.entry(violation.family).or_insert(violation.message);
    }

    fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// The family with the most rejections; ties go to the earlier family.
    fn dominant(&self) -> Option<ConstraintFamily> {
        let mut best: Option<(ConstraintFamily, u64)> = None;
        for (&family, &count) in &self.counts {
            if best.is_none_or(|(_, most)| count > most) {
                best = Some((family, count));
            }
        }
        best.map(|(family, _)| family)
    }

    fn report(self, explanation: Option<String>) -> Infeasibility {
        let family = self.dominant().unwrap_or(ConstraintFamily::Conflict);
        let detail = self
            .first
            .get(&family)
            .cloned()
            .unwrap_or_else(|| "no feasible graph exists".to_string());
        Infeasibility {
            family,
            detail,
            rejections: self.counts,
            explanation,
        }
    }
}

struct Budget {
    max_decisions: Option<u64>,
    deadline: Option<Instant>,
}

impl Budget {
    fn exhausted(&self, decisions: u64) -> bool {
        if self.max_decisions.is_some_and(|max| decisions >= max) {
            return true;
        }
        decisions % 64 == 0 && self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Derives one optimal concrete graph per request.
///
/// ```
/// use concretizer::{Catalog, Concretizer, Environment, InMemoryRepository, PackageDef, Request, RootRequest};
/// use concretizer::{CompilerDef, DependencyTemplate};
/// use portage_atom::Version;
///
/// let v = |s: &str| Version::parse(s).unwrap();
/// let mut repo = InMemoryRepository::new();
/// repo.add(PackageDef::new("app").version(v("1.0"), 0).depends_on(DependencyTemplate::new("zlib")));
/// repo.add(PackageDef::new("zlib").version(v("1.3"), 0));
/// let env = Environment::host("linux", "ubuntu22.04", &[("x86_64", 0)])
///     .compiler(CompilerDef::new("gcc", v("12.3"), 0).targets(&["x86_64"]).operating_systems(&["ubuntu22.04"]));
/// let catalog = Catalog::new(&repo, env).unwrap();
///
/// let solution = Concretizer::new(&catalog).concretize(&Request::single(RootRequest::named("app"))).unwrap();
/// assert_eq!(solution.dependencies_of("app"), vec!["zlib"]);
/// ```
pub struct Concretizer<'c> {
    catalog: &'c Catalog,
    config: SolverConfig,
}

impl<'c> Concretizer<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            config: SolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Concretize every root of `request` into one graph.
    pub fn concretize(&self, request: &Request) -> Result<Solution> {
        let ctx = SolveContext {
            catalog: self.catalog,
            policy: Policy::resolve(&self.config, self.catalog)?,
            request: ResolvedRequest::resolve(request, self.catalog)?,
        };
        info!(
            "concretizing {} root(s) against {} packages",
            ctx.request.roots.len(),
            self.catalog.package_count()
        );
        Search::new(&ctx).run()
    }
}

struct Search<'s, 'c> {
    ctx: &'s SolveContext<'c>,
    asg: Assignment<'c>,
    stack: Vec<Frame>,
    incumbent: Option<Solution>,
    stats: SearchStats,
    rejections: Rejections,
    budget: Budget,
    started: Instant,
    /// Bound-based pruning; only exhaustive cross-checks turn it off.
    prune: bool,
}

impl<'s, 'c> Search<'s, 'c> {
    fn new(ctx: &'s SolveContext<'c>) -> Self {
        let started = Instant::now();
        Self {
            ctx,
            asg: Assignment::new(ctx.catalog),
            stack: Vec::new(),
            incumbent: None,
            stats: SearchStats::default(),
            rejections: Rejections::default(),
            budget: Budget {
                max_decisions: ctx.policy.max_decisions,
                deadline: ctx.policy.time_limit.map(|limit| started + limit),
            },
            started,
            prune: true,
        }
    }

    fn run(mut self) -> Result<Solution> {
        let seeded = expand::seed(self.ctx, &mut self.asg)
            .and_then(|()| expand::propagate(self.ctx, &mut self.asg));
        let mut exhausted = false;
        match seeded {
            Ok(()) => exhausted = self.search(),
            Err(violation) => self.reject(violation),
        }
        self.stats.elapsed = self.started.elapsed();
        self.finish(exhausted)
    }

    /// Returns whether the budget ran out.
    fn search(&mut self) -> bool {
        'search: loop {
            self.explore();
            loop {
                let Some(frame) = self.stack.last_mut() else {
                    break 'search false;
                };
                self.asg.rollback(frame.mark);
                let Some(&choice) = frame.choices.get(frame.next) else {
                    self.stack.pop();
                    continue;
                };
                frame.next += 1;
                if self.budget.exhausted(self.stats.decisions) {
                    break 'search true;
                }
                self.stats.decisions += 1;
                if log_enabled!(Level::Trace) {
                    trace!("[{}] {}", self.stack.len(), self.describe(choice));
                }
                match self.apply(choice) {
                    Ok(()) => continue 'search,
                    Err(violation) => self.reject(violation),
                }
            }
        }
    }

    fn reject(&mut self, violation: Violation) {
        self.stats.rejections += 1;
        self.rejections.record(violation);
    }

    /// Examine the current consistent state: prune it, accept it as a
    /// solution, or open a frame for its next decision.
    fn explore(&mut self) {
        let ctx = self.ctx;
        if let Some(best) = self.incumbent.as_ref().filter(|_| self.prune) {
            if objective::lower_bound(ctx, &self.asg).cannot_improve(&best.cost) {
                self.stats.pruned += 1;
                trace!("pruned at depth {}", self.stack.len());
                return;
            }
        }
        let Some(decision) = self.next_decision() else {
            self.complete();
            return;
        };
        match self.domain(decision) {
            Ok(choices) => self.stack.push(Frame {
                mark: self.asg.checkpoint(),
                choices,
                next: 0,
            }),
            Err(violation) => self.reject(violation),
        }
    }

    fn complete(&mut self) {
        let ctx = self.ctx;
        if let Err(violation) = expand::final_checks(ctx, &mut self.asg) {
            self.reject(violation);
            return;
        }
        let cost = objective::evaluate(ctx, &self.asg);
        if self.incumbent.as_ref().is_some_and(|best| best.cost <= cost) {
            return;
        }
        let Some(solution) = Solution::extract(ctx, &self.asg, cost, SearchStats::default()) else {
            return;
        };
        self.stats.solutions += 1;
        debug!(
            "incumbent #{} with cost {} after {} decisions",
            self.stats.solutions, solution.cost, self.stats.decisions
        );
        self.incumbent = Some(solution);
    }

    fn next_decision(&self) -> Option<Decision> {
        let asg = &self.asg;
        if let Some(vid) = asg.unresolved_virtual() {
            return Some(Decision::Provider(vid));
        }
        for id in asg.node_ids() {
            let node = asg.node(id);
            if node.origin.is_none() {
                return Some(Decision::Origin(id));
            }
            if let Some(index) = node.variants.iter().position(Option::is_none) {
                return Some(Decision::Variant(id, index));
            }
        }
        for id in asg.topological_order() {
            let node = asg.node(id);
            if node.platform.is_none() {
                return Some(Decision::Platform(id));
            }
            if node.os.is_none() {
                return Some(Decision::Os(id));
            }
            if node.compiler.is_none() {
                return Some(Decision::Compiler(id));
            }
            if node.target.is_none() {
                return Some(Decision::Target(id));
            }
        }
        None
    }

    fn domain(&self, decision: Decision) -> std::result::Result<Vec<Choice>, Violation> {
        let (ctx, asg) = (self.ctx, &self.asg);
        let choices = match decision {
            Decision::Provider(vid) => expand::provider_domain(ctx, asg, vid)?
                .into_iter()
                .map(|pkg| Choice::Provider(vid, pkg))
                .collect(),
            Decision::Origin(id) => attributes::origin_domain(ctx, asg, id)?
                .into_iter()
                .map(|origin| Choice::Origin(id, origin))
                .collect(),
            Decision::Variant(id, index) => attributes::variant_domain(ctx, asg, id, index)?
                .into_iter()
                .map(|mask| Choice::Variant(id, index, mask))
                .collect(),
            Decision::Platform(id) => attributes::platform_domain(ctx, asg, id)?
                .into_iter()
                .map(|p| Choice::Platform(id, p))
                .collect(),
            Decision::Os(id) => attributes::os_domain(ctx, asg, id)?
                .into_iter()
                .map(|os| Choice::Os(id, os))
                .collect(),
            Decision::Compiler(id) => attributes::compiler_domain(ctx, asg, id)?
                .into_iter()
                .map(|c| Choice::Compiler(id, c))
                .collect(),
            Decision::Target(id) => attributes::target_domain(ctx, asg, id)?
                .into_iter()
                .map(|t| Choice::Target(id, t))
                .collect(),
        };
        Ok(choices)
    }

    fn apply(&mut self, choice: Choice) -> std::result::Result<(), Violation> {
        let ctx = self.ctx;
        let asg = &mut self.asg;
        match choice {
            Choice::Provider(vid, pkg) => expand::choose_provider(ctx, asg, vid, pkg)?,
            Choice::Origin(id, origin) => {
                asg.set_origin(id, origin);
                if let Origin::External(eid) = origin {
                    attributes::apply_external(ctx, asg, id, eid);
                }
            }
            Choice::Variant(id, index, mask) => asg.set_variant(id, index, mask),
            Choice::Platform(id, platform) => asg.set_platform(id, platform),
            Choice::Os(id, os) => asg.set_os(id, os),
            Choice::Compiler(id, compiler) => asg.set_compiler(id, Some(compiler)),
            Choice::Target(id, target) => asg.set_target(id, target),
        }
        expand::propagate(ctx, asg)
    }

    fn describe(&self, choice: Choice) -> String {
        let catalog = self.ctx.catalog;
        let asg = &self.asg;
        match choice {
            Choice::Provider(vid, pkg) => format!(
                "{} provided by {}",
                catalog.virtual_entry(vid).name,
                catalog.package(pkg).def.name
            ),
            Choice::Origin(id, Origin::Built(index)) => format!(
                "{}@{}",
                asg.package_name(id),
                catalog.package(asg.node(id).package).def.versions[index].version
            ),
            Choice::Origin(id, Origin::External(eid)) => format!(
                "{}@{} (external {})",
                asg.package_name(id),
                catalog.external(eid).version,
                catalog.external(eid).prefix
            ),
            Choice::Variant(id, index, mask) => {
                let def = &catalog.package(asg.node(id).package).def.variants[index];
                format!(
                    "{} {}={}",
                    asg.package_name(id),
                    def.name,
                    def.values_of(mask).join(",")
                )
            }
            Choice::Platform(id, p) => {
                format!("{} platform={}", asg.package_name(id), catalog.platform_name(p))
            }
            Choice::Os(id, os) => format!("{} os={}", asg.package_name(id), catalog.os_name(os)),
            Choice::Compiler(id, c) => format!("{} %{}", asg.package_name(id), catalog.compiler(c)),
            Choice::Target(id, t) => {
                format!("{} target={}", asg.package_name(id), catalog.target(t).name)
            }
        }
    }

    fn finish(self, exhausted: bool) -> Result<Solution> {
        let Search {
            ctx,
            incumbent,
            stats,
            rejections,
            ..
        } = self;
        if let Some(mut solution) = incumbent {
            solution.optimal = !exhausted;
            solution.stats = stats;
            info!(
                "concretized {} nodes with cost {} ({} decisions, {} pruned, {}optimal)",
                solution.nodes.len(),
                solution.cost,
                solution.stats.decisions,
                solution.stats.pruned,
                if solution.optimal { "" } else { "not proven " }
            );
            return Ok(solution);
        }

        debug_assert_eq!(rejections.total(), stats.rejections);
        let explanation = if ctx.policy.explain {
            let explanation = feasibility::explain(ctx);
            debug!(
                "version-level relaxation is {}",
                if explanation.is_some() { "unsatisfiable" } else { "satisfiable" }
            );
            explanation
        } else {
            None
        };
        if exhausted && explanation.is_none() {
            info!("search budget exhausted after {} decisions", stats.decisions);
            return Err(ConcretizeError::BudgetExhausted {
                decisions: stats.decisions,
            });
        }
        let report = rejections.report(explanation);
        info!("unsatisfiable: {} ({})", report.detail, report.family);
        Err(ConcretizeError::Unsatisfiable(report))
    }
}
