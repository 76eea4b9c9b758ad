//! Graph expansion and virtual provider resolution.
//!
//! After every decision [`propagate`] runs to a fixpoint: dependency
//! templates whose trigger now holds are instantiated (creating nodes and
//! edges and imposing their assertions), virtual dependencies are routed to
//! the chosen provider, and every hard rule over decided attributes is
//! checked.

use log::trace;

use crate::assignment::{Assignment, NodeId, Requirement, VirtualNeed};
use crate::attributes;
use crate::catalog::{DependencyKind, DependencyTarget, PackageId, VirtualId};
use crate::condition::{holds, Assertion, Truth};
use crate::error::{ConstraintFamily, Violation};
use crate::solver::SolveContext;

/// Penalty for a provider no preference ranks.
pub const PROVIDER_PENALTY: u32 = 100;

/// Create the node of `package` if needed, attaching the request's
/// `^package` constraints to a new node.
pub(crate) fn ensure_node(
    ctx: &SolveContext<'_>,
    asg: &mut Assignment<'_>,
    package: PackageId,
) -> NodeId {
    if let Some(id) = asg.node_for(package) {
        return id;
    }
    let id = asg.add_node(package);
    trace!("new node {}", asg.package_name(id));
    if let Some(constraints) = ctx.request.package_constraints.get(&package) {
        for assertion in constraints {
            asg.push_requirement(id, explicit(assertion));
        }
    }
    id
}

fn explicit(assertion: &Assertion) -> Requirement {
    Requirement {
        assertion: assertion.clone(),
        explicit: true,
    }
}

fn imposed(assertion: &Assertion) -> Requirement {
    Requirement {
        assertion: assertion.clone(),
        explicit: false,
    }
}

/// Commit the roots of the request.
pub(crate) fn seed(ctx: &SolveContext<'_>, asg: &mut Assignment<'_>) -> Result<(), Violation> {
    for root in &ctx.request.roots {
        match root.target {
            DependencyTarget::Package(pid) => {
                let id = ensure_node(ctx, asg, pid);
                asg.mark_root(id);
                for assertion in &root.assertions {
                    asg.push_requirement(id, explicit(assertion));
                }
            }
            DependencyTarget::Virtual(vid) => asg.push_need(VirtualNeed {
                consumer: None,
                virtual_id: vid,
                kind: DependencyKind::Run,
                imposes: root.assertions.clone(),
                explicit: true,
            }),
        }
    }
    Ok(())
}

/// Run expansion and all checks to a fixpoint.
pub(crate) fn propagate(ctx: &SolveContext<'_>, asg: &mut Assignment<'_>) -> Result<(), Violation> {
    while fire_templates(ctx, asg)? {}
    for id in asg.node_ids() {
        attributes::check_node(ctx, asg, id)?;
    }
    attributes::check_os_inheritance(ctx, asg, false)?;
    check_conflicts(ctx, asg)?;
    check_providers(ctx, asg)
}

/// One pass over all built nodes; returns whether anything fired.
fn fire_templates(ctx: &SolveContext<'_>, asg: &mut Assignment<'_>) -> Result<bool, Violation> {
    let catalog = ctx.catalog;
    let mut fired_any = false;
    let mut index = 0;
    while index < asg.node_count() {
        let id = NodeId::from_index(index);
        index += 1;
        let node = asg.node(id);
        if node.origin.is_none() || node.is_external() {
            continue;
        }
        let root = node.root;
        let entry = catalog.package(node.package);
        for (t, template) in entry.def.dependencies.iter().enumerate() {
            if asg.node(id).fired[t] {
                continue;
            }
            if template.kind == DependencyKind::Test
                && !(root && ctx.policy.include_test_dependencies)
            {
                continue;
            }
            if !holds(&template.when, &*asg, id, Some(&template.name)) {
                continue;
            }
            asg.mark_fired(id, t);
            fired_any = true;
            trace!("{} depends on {}", asg.package_name(id), template.name);
            match entry.dependency_targets[t] {
                DependencyTarget::Package(pid) => {
                    let child = ensure_node(ctx, asg, pid);
                    asg.connect(id, child, template.kind, None)?;
                    for assertion in &template.imposes {
                        asg.push_requirement(child, imposed(assertion));
                    }
                }
                DependencyTarget::Virtual(vid) => {
                    asg.push_need(VirtualNeed {
                        consumer: Some(id),
                        virtual_id: vid,
                        kind: template.kind,
                        imposes: template.imposes.clone(),
                        explicit: false,
                    });
                    if let Some(provider) = asg.provider(vid) {
                        asg.connect(id, provider, template.kind, Some(vid))?;
                        for assertion in &template.imposes {
                            asg.push_requirement(provider, imposed(assertion));
                        }
                    }
                }
            }
        }
    }
    Ok(fired_any)
}

fn check_conflicts(ctx: &SolveContext<'_>, asg: &Assignment<'_>) -> Result<(), Violation> {
    for id in asg.node_ids() {
        let node = asg.node(id);
        if node.origin.is_none() || node.is_external() {
            continue;
        }
        for conflict in &ctx.catalog.package(node.package).def.conflicts {
            if holds(&conflict.when, asg, id, None) {
                return Err(Violation::new(
                    ConstraintFamily::Conflict,
                    format!("{}: {}", asg.package_name(id), conflict.message),
                ));
            }
        }
    }
    Ok(())
}

/// Truth of "`node` provides `virtual_id`" under its current attributes.
fn provides(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    node: NodeId,
    virtual_id: VirtualId,
) -> Truth {
    match ctx.catalog.provides_decl(asg.node(node).package, virtual_id) {
        Some(decl) => decl.when.evaluate(asg, node, None),
        None => Truth::False,
    }
}

fn check_providers(ctx: &SolveContext<'_>, asg: &Assignment<'_>) -> Result<(), Violation> {
    let catalog = ctx.catalog;
    for (vid, provider) in asg.chosen_providers() {
        let virtual_name = &catalog.virtual_entry(vid).name;
        if provides(ctx, asg, provider, vid) == Truth::False {
            return Err(Violation::new(
                ConstraintFamily::Provider,
                format!(
                    "{} does not provide {virtual_name} in this configuration",
                    asg.package_name(provider)
                ),
            ));
        }
        for other in asg.node_ids() {
            if other != provider && provides(ctx, asg, other, vid) == Truth::True {
                return Err(Violation::new(
                    ConstraintFamily::Provider,
                    format!(
                        "both {} and {} would provide {virtual_name}",
                        asg.package_name(provider),
                        asg.package_name(other)
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Provider weight of `package` for `virtual_id` given the current
/// consumers.
pub(crate) fn provider_weight(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    virtual_id: VirtualId,
    package: PackageId,
    external: bool,
) -> u32 {
    if external {
        return 0;
    }
    let specific = asg
        .needs()
        .iter()
        .filter(|need| need.virtual_id == virtual_id)
        .filter_map(|need| need.consumer)
        .filter_map(|consumer| {
            ctx.policy
                .package_provider_rank(asg.node(consumer).package, virtual_id, package)
        })
        .min();
    specific
        .or_else(|| ctx.policy.global_provider_rank(virtual_id, package))
        .unwrap_or(PROVIDER_PENALTY)
}

/// Providers that may be chosen for `virtual_id`, best first.
pub(crate) fn provider_domain(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    virtual_id: VirtualId,
) -> Result<Vec<PackageId>, Violation> {
    let catalog = ctx.catalog;
    let mut options: Vec<(u32, usize, PackageId)> = Vec::new();
    for &(pid, _) in &catalog.virtual_entry(virtual_id).providers {
        let entry = catalog.package(pid);
        if !ctx.policy.buildable(pid) && entry.externals.is_empty() {
            continue;
        }
        if let Some(existing) = asg.node_for(pid) {
            if provides(ctx, asg, existing, virtual_id) == Truth::False {
                continue;
            }
        }
        let weight = provider_weight(ctx, asg, virtual_id, pid, false);
        options.push((weight, pid.index(), pid));
    }
    options.sort();
    if options.is_empty() {
        return Err(Violation::new(
            ConstraintFamily::Provider,
            format!(
                "no package can provide {}",
                catalog.virtual_entry(virtual_id).name
            ),
        ));
    }
    Ok(options.into_iter().map(|(.., pid)| pid).collect())
}

/// Make `package` the provider of `virtual_id` and route every consumer to it.
pub(crate) fn choose_provider(
    ctx: &SolveContext<'_>,
    asg: &mut Assignment<'_>,
    virtual_id: VirtualId,
    package: PackageId,
) -> Result<(), Violation> {
    let provider = ensure_node(ctx, asg, package);
    asg.set_provider(virtual_id, provider);
    if let Some(constraints) = ctx.request.virtual_constraints.get(&virtual_id) {
        for assertion in constraints {
            asg.push_requirement(provider, explicit(assertion));
        }
    }
    let needs: Vec<VirtualNeed> = asg
        .needs()
        .iter()
        .filter(|need| need.virtual_id == virtual_id)
        .cloned()
        .collect();
    for need in needs {
        match need.consumer {
            Some(consumer) => asg.connect(consumer, provider, need.kind, Some(virtual_id))?,
            None => asg.mark_root(provider),
        }
        for assertion in &need.imposes {
            let requirement = Requirement {
                assertion: assertion.clone(),
                explicit: need.explicit,
            };
            asg.push_requirement(provider, requirement);
        }
    }
    Ok(())
}

/// Node a root request resolved to.
pub(crate) fn root_node(asg: &Assignment<'_>, target: DependencyTarget) -> Option<NodeId> {
    match target {
        DependencyTarget::Package(pid) => asg.node_for(pid),
        DependencyTarget::Virtual(vid) => asg.provider(vid),
    }
}

/// Closed-world checks on a complete assignment.
pub(crate) fn final_checks(
    ctx: &SolveContext<'_>,
    asg: &mut Assignment<'_>,
) -> Result<(), Violation> {
    asg.set_closed_world(true);
    let result = closed_world_checks(ctx, asg);
    asg.set_closed_world(false);
    result
}

fn closed_world_checks(ctx: &SolveContext<'_>, asg: &Assignment<'_>) -> Result<(), Violation> {
    let catalog = ctx.catalog;
    if let Some(vid) = asg.unresolved_virtual() {
        return Err(Violation::new(
            ConstraintFamily::Provider,
            format!("no provider chosen for {}", catalog.virtual_entry(vid).name),
        ));
    }
    check_providers(ctx, asg)?;
    for id in asg.node_ids() {
        attributes::check_node(ctx, asg, id)?;
    }
    attributes::check_os_inheritance(ctx, asg, true)?;

    for root in &ctx.request.roots {
        let Some(root_id) = root_node(asg, root.target) else {
            return Err(Violation::new(
                ConstraintFamily::Reachability,
                "a requested root is missing from the graph",
            ));
        };
        for &required in &root.required {
            let reachable = root_node(asg, required)
                .is_some_and(|dep| dep != root_id && asg.reaches(root_id, dep));
            if !reachable {
                let name = match required {
                    DependencyTarget::Package(pid) => catalog.package(pid).def.name.as_str(),
                    DependencyTarget::Virtual(vid) => catalog.virtual_entry(vid).name.as_str(),
                };
                return Err(Violation::new(
                    ConstraintFamily::Reachability,
                    format!(
                        "{} does not depend on {name}",
                        asg.package_name(root_id)
                    ),
                ));
            }
        }
    }

    for id in asg.node_ids() {
        let node = asg.node(id);
        if !node.root && node.parents.is_empty() {
            return Err(Violation::new(
                ConstraintFamily::Reachability,
                format!("{} is not reachable from any root", asg.package_name(id)),
            ));
        }
    }
    Ok(())
}
