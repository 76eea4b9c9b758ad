//! Lexicographic objective.
//!
//! A [`Cost`] is a fixed-size vector compared lexicographically; every
//! component is minimised, so "maximise" criteria are stored negated. The
//! components, highest priority first:
//!
//! | index | criterion                                                  |
//! |-------|------------------------------------------------------------|
//! | 0     | version weight of root nodes                               |
//! | 1     | non-default variant values on root nodes                   |
//! | 2     | −retained multi-valued defaults on root nodes              |
//! | 3     | provider weight of root providers                          |
//! | 4     | non-default variant values on other nodes                  |
//! | 5     | provider weight of other providers                         |
//! | 6     | −retained multi-valued defaults on other nodes             |
//! | 7     | node count − nodes whose compiler matches its preference   |
//! | 8     | version weight of all nodes                                |
//! | 9     | compiler weight of all nodes                               |
//! | 10    | nodes whose target misses its preference                   |
//! | 11    | target weight of all nodes                                 |

use std::fmt;

use crate::assignment::{Assignment, NodeId, Origin};
use crate::attributes::{
    explicit_variant_mask, has_compiler_requirement, has_target_requirement, preferred_targets,
    variant_cost,
};
use crate::catalog::{PackageId, VariantDef, VirtualId};
use crate::condition::{Assertion, Truth};
use crate::expand::provider_weight;
use crate::solver::SolveContext;

pub const TIERS: usize = 12;

const ROOT_VERSION: usize = 0;
const ROOT_VARIANT: usize = 1;
const ROOT_RETAINED: usize = 2;
const ROOT_PROVIDER: usize = 3;
const VARIANT: usize = 4;
const PROVIDER: usize = 5;
const RETAINED: usize = 6;
const NODES_COMPILER: usize = 7;
const VERSION: usize = 8;
const COMPILER: usize = 9;
const TARGET_MISMATCH: usize = 10;
const TARGET_WEIGHT: usize = 11;

/// Cost of a complete graph; smaller is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cost([i64; TIERS]);

impl Cost {
    #[cfg(test)]
    pub(crate) fn from_tiers(tiers: [i64; TIERS]) -> Self {
        Cost(tiers)
    }

    pub fn tiers(&self) -> &[i64; TIERS] {
        &self.0
    }

    pub fn root_version_weight(&self) -> i64 {
        self.0[ROOT_VERSION]
    }

    pub fn root_variant_penalty(&self) -> i64 {
        self.0[ROOT_VARIANT]
    }

    pub fn root_provider_weight(&self) -> i64 {
        self.0[ROOT_PROVIDER]
    }

    pub fn variant_penalty(&self) -> i64 {
        self.0[VARIANT]
    }

    pub fn provider_weight(&self) -> i64 {
        self.0[PROVIDER]
    }

    pub fn version_weight(&self) -> i64 {
        self.0[VERSION]
    }

    pub fn compiler_weight(&self) -> i64 {
        self.0[COMPILER]
    }

    pub fn target_weight(&self) -> i64 {
        self.0[TARGET_WEIGHT]
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}

/// Componentwise lower bound on every completion of a partial assignment.
/// Only the first `valid` components are meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LowerBound {
    bound: [i64; TIERS],
    valid: usize,
}

impl LowerBound {
    /// Whether no completion can be strictly better than `incumbent`.
    pub fn cannot_improve(&self, incumbent: &Cost) -> bool {
        for tier in 0..TIERS {
            if tier >= self.valid {
                return false;
            }
            match self.bound[tier].cmp(&incumbent.0[tier]) {
                std::cmp::Ordering::Greater => return true,
                std::cmp::Ordering::Less => return false,
                std::cmp::Ordering::Equal => {}
            }
        }
        true
    }
}

fn version_weight(ctx: &SolveContext<'_>, asg: &Assignment<'_>, id: NodeId) -> Option<i64> {
    let node = asg.node(id);
    match node.origin? {
        Origin::Built(index) => Some(i64::from(ctx.policy.version_weight(
            ctx.catalog,
            node.package,
            index,
        ))),
        Origin::External(_) => Some(0),
    }
}

/// `(non-default, retained)` summed over the decided variants of a node,
/// plus the most defaults its undecided variants could still retain.
fn variant_terms(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
    pending: bool,
) -> (i64, i64, i64) {
    let node = asg.node(id);
    let def = &ctx.catalog.package(node.package).def;
    let (mut non_default, mut retained, mut open) = (0i64, 0i64, 0i64);
    for (index, variant) in def.variants.iter().enumerate() {
        let default = ctx.policy.variant_default(ctx.catalog, node.package, index);
        match node.variants[index] {
            Some(mask) => {
                let mut explicit = explicit_variant_mask(node, variant);
                if pending {
                    explicit |= pending_explicit_mask(ctx, asg, node.package, variant);
                }
                let (nd, kept) = variant_cost(variant, mask, default, explicit);
                non_default += i64::from(nd);
                retained += i64::from(kept);
            }
            None if variant.multi => open += i64::from(default.count_ones()),
            None => {}
        }
    }
    (non_default, retained, open)
}

/// Compiler preference match; `None` while undecided. Externals always
/// match.
fn compiler_match(asg: &Assignment<'_>, id: NodeId) -> Option<bool> {
    let node = asg.node(id);
    if node.is_external() {
        return Some(true);
    }
    let Some(compiler) = node.compiler? else {
        return Some(false);
    };
    if has_compiler_requirement(node) || node.root {
        return Some(true);
    }
    let mut inherited = Vec::new();
    for parent in &node.parents {
        if let Some(c) = asg.node(*parent).compiler? {
            inherited.push(c);
        }
    }
    if !inherited.is_empty() {
        return Some(inherited.contains(&compiler));
    }
    let mut from_roots = Vec::new();
    for root in asg.roots() {
        if let Some(c) = asg.node(root).compiler? {
            from_roots.push(c);
        }
    }
    Some(from_roots.is_empty() || from_roots.contains(&compiler))
}

/// Target preference match; `None` while undecided.
fn target_match(asg: &Assignment<'_>, id: NodeId) -> Option<bool> {
    let node = asg.node(id);
    let target = node.target?;
    if has_target_requirement(node) || node.root {
        return Some(true);
    }
    if node.parents.iter().any(|p| asg.node(*p).target.is_none()) {
        return None;
    }
    let preferred = preferred_targets(asg, id);
    Some(preferred.is_empty() || preferred.contains(&target))
}

fn provider_terms(ctx: &SolveContext<'_>, asg: &Assignment<'_>, exact: bool) -> Vec<(bool, i64)> {
    asg.chosen_providers()
        .map(|(vid, provider)| {
            let node = asg.node(provider);
            let weight = match node.origin {
                Some(origin) if origin.is_external() => 0,
                None if !ctx.catalog.package(node.package).externals.is_empty() => 0,
                Some(_) if exact => provider_weight(ctx, asg, vid, node.package, false),
                _ => {
                    let current = provider_weight(ctx, asg, vid, node.package, false);
                    ctx.policy
                        .best_package_provider_rank(vid, node.package)
                        .map_or(current, |best| best.min(current))
                }
            };
            (node.root, i64::from(weight))
        })
        .collect()
}

/// Variant values the request may still mark explicit on a package through
/// a virtual it could end up providing.
fn pending_explicit_mask(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    package: PackageId,
    def: &VariantDef,
) -> u32 {
    let catalog = ctx.catalog;
    let open = |vid: VirtualId| {
        asg.provider(vid).is_none() && catalog.provides_decl(package, vid).is_some()
    };
    let from_needs = asg
        .needs()
        .iter()
        .filter(|need| need.explicit && open(need.virtual_id))
        .flat_map(|need| need.imposes.iter());
    let from_request = ctx
        .request
        .virtual_constraints
        .iter()
        .filter(|(vid, _)| open(**vid))
        .flat_map(|(_, assertions)| assertions.iter());
    from_needs
        .chain(from_request)
        .filter_map(|assertion| match assertion {
            Assertion::Variant { name, values } if *name == def.name => {
                def.mask_of(values.iter().map(String::as_str))
            }
            _ => None,
        })
        .fold(0, |acc, mask| acc | mask)
}

/// Cost of a complete assignment.
pub(crate) fn evaluate(ctx: &SolveContext<'_>, asg: &Assignment<'_>) -> Cost {
    let mut cost = [0i64; TIERS];
    for id in asg.node_ids() {
        let node = asg.node(id);
        let version = version_weight(ctx, asg, id).unwrap_or(0);
        let (non_default, retained, _) = variant_terms(ctx, asg, id, false);
        cost[VERSION] += version;
        if node.root {
            cost[ROOT_VERSION] += version;
            cost[ROOT_VARIANT] += non_default;
            cost[ROOT_RETAINED] -= retained;
        } else {
            cost[VARIANT] += non_default;
            cost[RETAINED] -= retained;
        }
        cost[NODES_COMPILER] += 1;
        if compiler_match(asg, id) == Some(true) {
            cost[NODES_COMPILER] -= 1;
        }
        if let Some(Some(cid)) = node.compiler {
            cost[COMPILER] += i64::from(ctx.policy.compiler_weight(cid));
        }
        if target_match(asg, id) != Some(true) {
            cost[TARGET_MISMATCH] += 1;
        }
        if let Some(target) = node.target {
            cost[TARGET_WEIGHT] += i64::from(ctx.policy.target_weight(target));
        }
    }
    for (root, weight) in provider_terms(ctx, asg, true) {
        cost[if root { ROOT_PROVIDER } else { PROVIDER }] += weight;
    }
    Cost(cost)
}

/// Whether no further node or edge can appear in any completion.
fn graph_closed(ctx: &SolveContext<'_>, asg: &Assignment<'_>) -> bool {
    if asg.unresolved_virtual().is_some() {
        return false;
    }
    asg.node_ids().all(|id| {
        let node = asg.node(id);
        if !node.structural_decided() {
            return false;
        }
        if node.is_external() {
            return true;
        }
        let def = &ctx.catalog.package(node.package).def;
        def.dependencies.iter().enumerate().all(|(t, template)| {
            node.fired[t] || template.when.evaluate(asg, id, Some(&template.name)) != Truth::Unknown
        })
    })
}

/// Lower bound on the cost of every completion of `asg`.
pub(crate) fn lower_bound(ctx: &SolveContext<'_>, asg: &Assignment<'_>) -> LowerBound {
    let catalog = ctx.catalog;
    let closed = graph_closed(ctx, asg);
    let mut bound = [0i64; TIERS];

    let mut absent_retained: i64 = i64::from(catalog.total_retained_defaults());
    for id in asg.node_ids() {
        let node = asg.node(id);
        absent_retained -= i64::from(catalog.package(node.package).max_retained_defaults);
        let version = version_weight(ctx, asg, id).unwrap_or(0);
        let (non_default, retained, open) = variant_terms(ctx, asg, id, true);
        bound[VERSION] += version;
        if node.root {
            bound[ROOT_VERSION] += version;
            bound[ROOT_VARIANT] += non_default;
            bound[ROOT_RETAINED] -= retained + open;
        } else {
            bound[VARIANT] += non_default;
            bound[RETAINED] -= retained + open;
        }
        match node.compiler {
            Some(None) if !node.is_external() => bound[NODES_COMPILER] += 1,
            Some(None) => {}
            Some(Some(cid)) => {
                bound[COMPILER] += i64::from(ctx.policy.compiler_weight(cid));
                if closed && compiler_match(asg, id) == Some(false) {
                    bound[NODES_COMPILER] += 1;
                }
            }
            None => {}
        }
        if closed {
            if target_match(asg, id) == Some(false) {
                bound[TARGET_MISMATCH] += 1;
            }
            if let Some(target) = node.target {
                bound[TARGET_WEIGHT] += i64::from(ctx.policy.target_weight(target));
            }
        }
    }
    bound[RETAINED] -= absent_retained.max(0);
    for (root, weight) in provider_terms(ctx, asg, closed) {
        bound[if root { ROOT_PROVIDER } else { PROVIDER }] += weight;
    }

    let root_need_open = asg
        .needs()
        .iter()
        .any(|need| need.consumer.is_none() && asg.provider(need.virtual_id).is_none());
    let valid = if root_need_open {
        ROOT_RETAINED
    } else if closed {
        TIERS
    } else {
        TARGET_MISMATCH
    };
    LowerBound { bound, valid }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(values: [i64; TIERS]) -> Cost {
        Cost(values)
    }

    #[test]
    fn earlier_tier_dominates() {
        let mut a = [0; TIERS];
        let mut b = [0; TIERS];
        a[ROOT_VERSION] = 1;
        b[VERSION] = 1000;
        assert!(cost(b) < cost(a));
    }

    #[test]
    fn bound_prunes_only_on_valid_prefix() {
        let mut incumbent = [0; TIERS];
        incumbent[VARIANT] = 2;
        let mut values = [0; TIERS];
        values[VARIANT] = 3;
        let lb = LowerBound {
            bound: values,
            valid: TIERS,
        };
        assert!(lb.cannot_improve(&cost(incumbent)));

        let lb = LowerBound {
            bound: values,
            valid: ROOT_PROVIDER,
        };
        assert!(!lb.cannot_improve(&cost(incumbent)));
    }

    #[test]
    fn equal_bound_prunes_ties() {
        let incumbent = cost([1; TIERS]);
        let lb = LowerBound {
            bound: [1; TIERS],
            valid: TIERS,
        };
        assert!(lb.cannot_improve(&incumbent));
    }

    #[test]
    fn lower_bound_below_incumbent_keeps_branch() {
        let incumbent = cost([0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let lb = LowerBound {
            bound: [0, 1, 0, 0, 0, 0, 0, 9, 9, 9, 0, 0],
            valid: TIERS,
        };
        assert!(!lb.cannot_improve(&incumbent));
    }

    #[test]
    fn display_lists_tiers() {
        assert_eq!(
            cost([0, 1, -2, 0, 0, 0, 0, 3, 0, 0, 0, 0]).to_string(),
            "[0 1 -2 0 0 0 0 3 0 0 0 0]"
        );
    }
}
