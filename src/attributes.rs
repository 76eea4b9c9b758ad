//! Attribute domains, per-node checks and derived attributes.
//!
//! Domains are computed lazily when the search decides an attribute. Each
//! domain is ordered best-first and an empty domain is reported as a
//! [`Violation`] of the attribute's constraint family.

use std::collections::BTreeMap;

use portage_atom::Version;

use crate::assignment::{Assignment, NodeId, NodeState, Origin};
use crate::catalog::{
    CompilerId, ExternalId, ExternalSpec, FlagType, OsId, PlatformId, TargetId, VariantDef,
    DEV_PATH_VARIANT, PATCHES_VARIANT,
};
use crate::condition::{Assertion, AttributeView};
use crate::error::{ConstraintFamily, Violation};
use crate::solver::SolveContext;
use crate::version_match::VersionRange;

fn version_ranges(node: &NodeState) -> Vec<&VersionRange> {
    node.assertions()
        .filter_map(|a| match a {
            Assertion::Version(range) => Some(range),
            _ => None,
        })
        .collect()
}

fn required_names<'a>(node: &'a NodeState, pick: fn(&Assertion) -> Option<&String>) -> Vec<&'a str> {
    let mut names: Vec<&str> = Vec::new();
    for name in node.assertions().filter_map(pick) {
        if !names.contains(&name.as_str()) {
            names.push(name);
        }
    }
    names
}

fn platform_of(a: &Assertion) -> Option<&String> {
    match a {
        Assertion::Platform(name) => Some(name),
        _ => None,
    }
}

fn os_of(a: &Assertion) -> Option<&String> {
    match a {
        Assertion::Os(name) => Some(name),
        _ => None,
    }
}

fn target_of(a: &Assertion) -> Option<&String> {
    match a {
        Assertion::Target(name) => Some(name),
        _ => None,
    }
}

/// Whether the node carries an OS requirement.
pub(crate) fn has_explicit_os(node: &NodeState) -> bool {
    node.assertions().any(|a| matches!(a, Assertion::Os(_)))
}

pub(crate) fn has_compiler_requirement(node: &NodeState) -> bool {
    node.assertions().any(|a| {
        matches!(
            a,
            Assertion::Compiler(_) | Assertion::CompilerVersion { .. }
        )
    })
}

pub(crate) fn has_target_requirement(node: &NodeState) -> bool {
    node.assertions().any(|a| matches!(a, Assertion::Target(_)))
}

fn compiler_satisfies(name: &str, version: &Version, assertion: &Assertion) -> bool {
    match assertion {
        Assertion::Compiler(wanted) => wanted == name,
        Assertion::CompilerVersion { name: wanted, range } => {
            wanted == name && range.satisfied_by(version)
        }
        _ => true,
    }
}

/// Mask of variant values set by the request itself.
pub(crate) fn explicit_variant_mask(node: &NodeState, def: &VariantDef) -> u32 {
    node.requirements
        .iter()
        .filter(|r| r.explicit)
        .filter_map(|r| match &r.assertion {
            Assertion::Variant { name, values } if *name == def.name => {
                def.mask_of(values.iter().map(String::as_str))
            }
            _ => None,
        })
        .fold(0, |acc, mask| acc | mask)
}

/// `(non-default values, retained multi-valued defaults)` of a choice.
pub(crate) fn variant_cost(def: &VariantDef, mask: u32, default: u32, explicit: u32) -> (u32, u32) {
    let non_default = (mask & !default & !explicit).count_ones();
    let retained = if def.multi {
        (mask & default).count_ones()
    } else {
        0
    };
    (non_default, retained)
}

// --- origin ---

fn external_variant_mask(
    ctx: &SolveContext<'_>,
    node: &NodeState,
    index: usize,
    external: &ExternalSpec,
) -> u32 {
    let def = &ctx.catalog.package(node.package).def.variants[index];
    external
        .variants
        .get(&def.name)
        .and_then(|values| def.mask_of(values.iter().map(String::as_str)))
        .unwrap_or_else(|| ctx.policy.variant_default(ctx.catalog, node.package, index))
}

fn external_ids(ctx: &SolveContext<'_>, external: &ExternalSpec) -> (PlatformId, OsId, TargetId) {
    let catalog = ctx.catalog;
    let platform = external
        .platform
        .as_deref()
        .and_then(|p| catalog.platform_id(p))
        .unwrap_or(ctx.policy.default_platform);
    let os = external
        .os
        .as_deref()
        .and_then(|o| catalog.os_id(o))
        .unwrap_or(ctx.policy.default_os);
    let target = external
        .target
        .as_deref()
        .and_then(|t| catalog.target_id(t))
        .unwrap_or(ctx.policy.default_target);
    (platform, os, target)
}

/// Whether an external agrees with every non-version requirement on `node`.
fn external_fits(ctx: &SolveContext<'_>, node: &NodeState, external: &ExternalSpec) -> bool {
    let catalog = ctx.catalog;
    let def = &catalog.package(node.package).def;
    let (platform, os, target) = external_ids(ctx, external);
    node.assertions().all(|assertion| match assertion {
        Assertion::Variant { name, values } => match def.variant_index(name) {
            Some(index) => {
                let have = external_variant_mask(ctx, node, index, external);
                def.variants[index]
                    .mask_of(values.iter().map(String::as_str))
                    .is_some_and(|want| have & want == want)
            }
            None => false,
        },
        Assertion::Platform(name) => catalog.platform_name(platform) == name,
        Assertion::Os(name) => catalog.os_name(os) == name,
        Assertion::Target(name) => catalog.target(target).name == *name,
        _ => true,
    })
}

/// Versions and externals admissible for the node, best first.
pub(crate) fn origin_domain(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
) -> Result<Vec<Origin>, Violation> {
    let catalog = ctx.catalog;
    let node = asg.node(id);
    let entry = catalog.package(node.package);
    let name = &entry.def.name;
    let ranges = version_ranges(node);
    let admits = |version: &Version| ranges.iter().all(|r| r.satisfied_by(version));

    let mut options: Vec<(u32, u8, usize, Origin)> = Vec::new();
    let mut external_version_ok = false;
    for &eid in &entry.externals {
        let external = catalog.external(eid);
        if !admits(&external.version) {
            continue;
        }
        external_version_ok = true;
        if external_fits(ctx, node, external) {
            options.push((0, 0, eid.index(), Origin::External(eid)));
        }
    }
    if ctx.policy.buildable(node.package) {
        for (index, declared) in entry.def.versions.iter().enumerate() {
            if declared.deprecated && !ctx.policy.allow_deprecated {
                continue;
            }
            if admits(&declared.version) {
                let weight = ctx.policy.version_weight(catalog, node.package, index);
                options.push((weight, 1, index, Origin::Built(index)));
            }
        }
    }
    options.sort_by_key(|&(weight, kind, index, _)| (weight, kind, index));

    if options.is_empty() {
        let family = if external_version_ok {
            ConstraintFamily::External
        } else {
            ConstraintFamily::Version
        };
        let message = if ranges.is_empty() {
            format!("no buildable version or external of {name} is available")
        } else {
            let wanted: Vec<String> = ranges.iter().map(|r| format!("@{r}")).collect();
            format!("no version of {name} satisfies {}", wanted.join(" "))
        };
        return Err(Violation::new(family, message));
    }
    Ok(options.into_iter().map(|(.., origin)| origin).collect())
}

/// Fix every attribute of an external node from its spec.
pub(crate) fn apply_external(
    ctx: &SolveContext<'_>,
    asg: &mut Assignment<'_>,
    id: NodeId,
    eid: ExternalId,
) {
    let catalog = ctx.catalog;
    let external = catalog.external(eid);
    let masks: Vec<u32> = (0..asg.node(id).variants.len())
        .map(|index| external_variant_mask(ctx, asg.node(id), index, external))
        .collect();
    for (index, mask) in masks.into_iter().enumerate() {
        asg.set_variant(id, index, mask);
    }
    let (platform, os, target) = external_ids(ctx, external);
    asg.set_platform(id, platform);
    asg.set_os(id, os);
    asg.set_target(id, target);
    let compiler = external
        .compiler
        .as_ref()
        .and_then(|(name, version)| catalog.compiler_exact(name, version));
    asg.set_compiler(id, compiler);
}

// --- variants ---

/// Admissible value masks for one variant, best first.
pub(crate) fn variant_domain(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
    index: usize,
) -> Result<Vec<u32>, Violation> {
    let node = asg.node(id);
    let entry = ctx.catalog.package(node.package);
    let def = &entry.def.variants[index];
    let package = &entry.def.name;

    let mut required = 0u32;
    for assertion in node.assertions() {
        if let Assertion::Variant { name, values } = assertion {
            if *name != def.name {
                continue;
            }
            for value in values {
                let bit = def.value_index(value).ok_or_else(|| {
                    Violation::new(
                        ConstraintFamily::Variant,
                        format!("`{value}` is not a valid value of {package} variant `{name}`"),
                    )
                })?;
                required |= 1 << bit;
            }
        }
    }
    let default = ctx.policy.variant_default(ctx.catalog, node.package, index);
    let explicit = explicit_variant_mask(node, def);

    let mut masks: Vec<u32> = if def.multi {
        let none = def.none_mask();
        (1..(1u32 << def.values.len()))
            .filter(|mask| mask & required == required)
            .filter(|mask| none.is_none_or(|n| mask & n == 0 || *mask == n))
            .collect()
    } else if required.count_ones() > 1 {
        Vec::new()
    } else if required != 0 {
        vec![required]
    } else {
        (0..def.values.len()).map(|i| 1 << i).collect()
    };
    masks.sort_by_key(|&mask| {
        let (non_default, retained) = variant_cost(def, mask, default, explicit);
        (non_default, std::cmp::Reverse(retained), mask.count_ones(), mask)
    });

    if masks.is_empty() {
        let wanted = def.values_of(required).join(",");
        return Err(Violation::new(
            ConstraintFamily::Variant,
            format!("{package} variant `{}` cannot take value(s) {wanted}", def.name),
        ));
    }
    Ok(masks)
}

// --- platform / os ---

pub(crate) fn platform_domain(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
) -> Result<Vec<PlatformId>, Violation> {
    let node = asg.node(id);
    let names = required_names(node, platform_of);
    match names.as_slice() {
        [] => Ok(vec![ctx.policy.default_platform]),
        [name] => ctx
            .catalog
            .platform_id(name)
            .map(|p| vec![p])
            .ok_or_else(|| Violation::new(ConstraintFamily::Platform, format!("unknown platform {name}"))),
        _ => Err(Violation::new(
            ConstraintFamily::Platform,
            format!(
                "{} requires conflicting platforms {}",
                asg.package_name(id),
                names.join(", ")
            ),
        )),
    }
}

/// For every node, the OS it hands down to its children: its own OS when it
/// is explicit or itself inherited, otherwise `None`.
pub(crate) fn os_carriers(asg: &Assignment<'_>) -> Vec<Option<OsId>> {
    let mut carry = vec![None; asg.node_count()];
    for id in asg.topological_order() {
        let node = asg.node(id);
        if node.is_external() {
            continue;
        }
        let Some(os) = node.os else { continue };
        if has_explicit_os(node) || node.parents.iter().any(|p| carry[p.index()].is_some()) {
            carry[id.index()] = Some(os);
        }
    }
    carry
}

fn inherited_os(
    asg: &Assignment<'_>,
    carriers: &[Option<OsId>],
    id: NodeId,
) -> Result<Option<OsId>, Violation> {
    let mut inherited: Option<OsId> = None;
    for parent in &asg.node(id).parents {
        if let Some(os) = carriers[parent.index()] {
            match inherited {
                Some(seen) if seen != os => {
                    let catalog = asg.catalog();
                    return Err(Violation::new(
                        ConstraintFamily::Os,
                        format!(
                            "{} inherits conflicting operating systems {} and {}",
                            asg.package_name(id),
                            catalog.os_name(seen),
                            catalog.os_name(os)
                        ),
                    ));
                }
                _ => inherited = Some(os),
            }
        }
    }
    Ok(inherited)
}

pub(crate) fn os_domain(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
) -> Result<Vec<OsId>, Violation> {
    let node = asg.node(id);
    let names = required_names(node, os_of);
    match names.as_slice() {
        [] => {}
        [name] => {
            return ctx.catalog.os_id(name).map(|o| vec![o]).ok_or_else(|| {
                Violation::new(ConstraintFamily::Os, format!("unknown operating system {name}"))
            });
        }
        _ => {
            return Err(Violation::new(
                ConstraintFamily::Os,
                format!(
                    "{} requires conflicting operating systems {}",
                    asg.package_name(id),
                    names.join(", ")
                ),
            ));
        }
    }
    let carriers = os_carriers(asg);
    Ok(vec![
        inherited_os(asg, &carriers, id)?.unwrap_or(ctx.policy.default_os),
    ])
}

// --- compiler / target ---

/// Targets allowed by the node's target requirements.
fn target_candidates(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
) -> Result<Vec<TargetId>, Violation> {
    let names = required_names(asg.node(id), target_of);
    match names.as_slice() {
        [] => Ok(ctx.catalog.target_ids().collect()),
        [name] => ctx.catalog.target_id(name).map(|t| vec![t]).ok_or_else(|| {
            Violation::new(ConstraintFamily::Target, format!("unknown target {name}"))
        }),
        _ => Err(Violation::new(
            ConstraintFamily::Target,
            format!(
                "{} requires conflicting targets {}",
                asg.package_name(id),
                names.join(", ")
            ),
        )),
    }
}

fn parent_compilers(asg: &Assignment<'_>, id: NodeId) -> Vec<CompilerId> {
    asg.node(id)
        .parents
        .iter()
        .filter_map(|p| asg.node(*p).compiler.flatten())
        .collect()
}

/// Admissible compilers for a built node, best first.
pub(crate) fn compiler_domain(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
) -> Result<Vec<CompilerId>, Violation> {
    let catalog = ctx.catalog;
    let node = asg.node(id);
    let package = asg.package_name(id);

    let requested: Vec<CompilerId> = catalog
        .compiler_ids()
        .filter(|&cid| {
            let compiler = catalog.compiler(cid);
            node.assertions()
                .all(|a| compiler_satisfies(&compiler.name, &compiler.version, a))
        })
        .collect();
    if requested.is_empty() {
        let wanted: Vec<String> = node
            .assertions()
            .filter(|a| matches!(a, Assertion::Compiler(_) | Assertion::CompilerVersion { .. }))
            .map(|a| a.to_string())
            .collect();
        let message = if wanted.is_empty() {
            format!("no compiler is available for {package}")
        } else {
            format!("no compiler satisfies {} for {package}", wanted.join(" "))
        };
        return Err(Violation::new(ConstraintFamily::Compiler, message));
    }

    let on_os: Vec<CompilerId> = requested
        .into_iter()
        .filter(|&cid| match node.os {
            Some(os) => {
                ctx.policy.compiler_allowed_anywhere(cid) || catalog.compiler_supports_os(cid, os)
            }
            None => true,
        })
        .collect();
    if on_os.is_empty() {
        let os = node.os.map(|o| catalog.os_name(o)).unwrap_or("?");
        return Err(Violation::new(
            ConstraintFamily::CompilerOs,
            format!("no admissible compiler for {package} supports operating system {os}"),
        ));
    }

    let targets = target_candidates(ctx, asg, id)?;
    let mut usable: Vec<CompilerId> = on_os
        .into_iter()
        .filter(|&cid| targets.iter().any(|&t| catalog.compiler_supports_target(cid, t)))
        .collect();
    if usable.is_empty() {
        let names: Vec<&str> = targets.iter().map(|&t| catalog.target(t).name.as_str()).collect();
        return Err(Violation::new(
            ConstraintFamily::TargetCompiler,
            format!(
                "no admissible compiler for {package} supports target {}",
                names.join(" or ")
            ),
        ));
    }

    let inherited = parent_compilers(asg, id);
    usable.sort_by_key(|&cid| {
        (
            !inherited.contains(&cid),
            ctx.policy.compiler_weight(cid),
            cid,
        )
    });
    Ok(usable)
}

/// Targets the node prefers: its parents' targets, or the roots' targets
/// when no parent has one.
pub(crate) fn preferred_targets(asg: &Assignment<'_>, id: NodeId) -> Vec<TargetId> {
    let node = asg.node(id);
    let from_parents: Vec<TargetId> = node
        .parents
        .iter()
        .filter_map(|p| asg.node(*p).target)
        .collect();
    if !from_parents.is_empty() || node.root {
        return from_parents;
    }
    asg.roots().filter_map(|r| asg.node(r).target).collect()
}

/// Admissible targets for a built node, best first.
pub(crate) fn target_domain(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
) -> Result<Vec<TargetId>, Violation> {
    let catalog = ctx.catalog;
    let candidates = target_candidates(ctx, asg, id)?;
    let mut usable: Vec<TargetId> = match asg.node(id).compiler.flatten() {
        Some(cid) => candidates
            .iter()
            .copied()
            .filter(|&t| catalog.compiler_supports_target(cid, t))
            .collect(),
        None => candidates.clone(),
    };
    if usable.is_empty() {
        let compiler = asg
            .node(id)
            .compiler
            .flatten()
            .map(|c| catalog.compiler(c).to_string())
            .unwrap_or_default();
        let names: Vec<&str> = candidates
            .iter()
            .map(|&t| catalog.target(t).name.as_str())
            .collect();
        return Err(Violation::new(
            ConstraintFamily::TargetCompiler,
            format!(
                "{compiler} cannot generate code for {} ({})",
                names.join(" or "),
                asg.package_name(id)
            ),
        ));
    }
    let preferred = preferred_targets(asg, id);
    let default = ctx.policy.default_target;
    usable.sort_by_key(|&t| {
        (
            !preferred.contains(&t),
            ctx.policy.target_weight(t),
            t != default,
            t,
        )
    });
    Ok(usable)
}

// --- checks ---

/// Check every decided attribute of a node against its requirements and
/// the compatibility tables.
pub(crate) fn check_node(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    id: NodeId,
) -> Result<(), Violation> {
    let catalog = ctx.catalog;
    let node = asg.node(id);
    let def = &catalog.package(node.package).def;
    let package = def.name.as_str();
    let external = node.is_external();
    let mismatch = |family: ConstraintFamily| {
        if external {
            ConstraintFamily::External
        } else {
            family
        }
    };

    let mut dev_paths: Vec<&str> = Vec::new();
    for assertion in node.assertions() {
        match assertion {
            Assertion::Version(range) => {
                if let Some(version) = asg.version(id) {
                    if !range.satisfied_by(version) {
                        return Err(Violation::new(
                            mismatch(ConstraintFamily::Version),
                            format!("{package}@{version} does not satisfy @{range}"),
                        ));
                    }
                }
            }
            Assertion::Variant { name, values } => match def.variant_index(name) {
                Some(index) => {
                    let variant = &def.variants[index];
                    let Some(want) = variant.mask_of(values.iter().map(String::as_str)) else {
                        return Err(Violation::new(
                            ConstraintFamily::Variant,
                            format!(
                                "{package} variant `{name}` has no value {}",
                                values.join(",")
                            ),
                        ));
                    };
                    if let Some(have) = node.variants[index] {
                        if have & want != want {
                            return Err(Violation::new(
                                mismatch(ConstraintFamily::Variant),
                                format!(
                                    "{package} has {name}={} but {} is required",
                                    variant.values_of(have).join(","),
                                    values.join(",")
                                ),
                            ));
                        }
                    }
                }
                None if name == DEV_PATH_VARIANT => {
                    for value in values {
                        if !dev_paths.contains(&value.as_str()) {
                            dev_paths.push(value);
                        }
                    }
                }
                None if name == PATCHES_VARIANT => {}
                None => {
                    return Err(Violation::new(
                        ConstraintFamily::Variant,
                        format!("{package} has no variant `{name}`"),
                    ));
                }
            },
            Assertion::Platform(name) => {
                if let Some(platform) = asg.platform(id) {
                    if platform != name {
                        return Err(Violation::new(
                            mismatch(ConstraintFamily::Platform),
                            format!("{package} is on platform {platform}, not {name}"),
                        ));
                    }
                }
            }
            Assertion::Os(name) => {
                if let Some(os) = asg.os(id) {
                    if os != name {
                        return Err(Violation::new(
                            mismatch(ConstraintFamily::Os),
                            format!("{package} is on operating system {os}, not {name}"),
                        ));
                    }
                }
            }
            Assertion::Target(name) => {
                if let Some(target) = asg.target(id) {
                    if target != name {
                        return Err(Violation::new(
                            mismatch(ConstraintFamily::Target),
                            format!("{package} targets {target}, not {name}"),
                        ));
                    }
                }
            }
            Assertion::Compiler(_) | Assertion::CompilerVersion { .. } => {
                if let Some(Some((name, version))) = asg.compiler(id) {
                    if !compiler_satisfies(name, version, assertion) {
                        return Err(Violation::new(
                            ConstraintFamily::Compiler,
                            format!("{package} is built with {name}@{version}, not {assertion}"),
                        ));
                    }
                }
            }
            Assertion::Flag { .. } => {}
        }
    }
    if dev_paths.len() > 1 {
        return Err(Violation::new(
            ConstraintFamily::Variant,
            format!("{package} has conflicting dev_path values {}", dev_paths.join(", ")),
        ));
    }

    if external {
        return Ok(());
    }
    if let (Some(os), Some(Some(cid))) = (node.os, node.compiler) {
        let allowed =
            ctx.policy.compiler_allowed_anywhere(cid) || catalog.compiler_supports_os(cid, os);
        if !allowed {
            return Err(Violation::new(
                ConstraintFamily::CompilerOs,
                format!(
                    "{} is not available on {} ({package})",
                    catalog.compiler(cid),
                    catalog.os_name(os)
                ),
            ));
        }
    }
    if let (Some(target), Some(Some(cid))) = (node.target, node.compiler) {
        if !catalog.compiler_supports_target(cid, target) {
            return Err(Violation::new(
                ConstraintFamily::TargetCompiler,
                format!(
                    "{} cannot generate code for {} ({package})",
                    catalog.compiler(cid),
                    catalog.target(target).name
                ),
            ));
        }
    }
    Ok(())
}

/// Every decided, non-explicit OS must agree with the OS its parents hand
/// down. With `closed`, nodes nobody hands an OS to must use the default.
pub(crate) fn check_os_inheritance(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
    closed: bool,
) -> Result<(), Violation> {
    let carriers = os_carriers(asg);
    for id in asg.node_ids() {
        let node = asg.node(id);
        if node.is_external() || has_explicit_os(node) {
            continue;
        }
        let Some(os) = node.os else { continue };
        let expected = match inherited_os(asg, &carriers, id)? {
            Some(inherited) => inherited,
            None if closed => ctx.policy.default_os,
            None => continue,
        };
        if os != expected {
            let catalog = ctx.catalog;
            return Err(Violation::new(
                ConstraintFamily::Os,
                format!(
                    "{} is on {} but must use {}",
                    asg.package_name(id),
                    catalog.os_name(os),
                    catalog.os_name(expected)
                ),
            ));
        }
    }
    Ok(())
}

// --- flags ---

/// Effective flags per node (indexed by node), derived parents-first.
pub(crate) fn derive_flags(
    ctx: &SolveContext<'_>,
    asg: &Assignment<'_>,
) -> Vec<BTreeMap<FlagType, Vec<String>>> {
    let catalog = ctx.catalog;
    let count = asg.node_count();
    // Flags a node hands down: explicit or inherited, never compiler defaults.
    let mut propagated: Vec<BTreeMap<FlagType, Vec<String>>> = vec![BTreeMap::new(); count];
    let mut effective: Vec<BTreeMap<FlagType, Vec<String>>> = vec![BTreeMap::new(); count];

    for id in asg.topological_order() {
        let node = asg.node(id);
        let compiler = node.compiler.flatten();
        for flag_type in FlagType::ALL {
            let mut explicit: Vec<String> = Vec::new();
            for assertion in node.assertions() {
                if let Assertion::Flag { flag_type: ft, flags } = assertion {
                    if *ft == flag_type {
                        push_unique(&mut explicit, flags);
                    }
                }
            }
            if !explicit.is_empty() {
                propagated[id.index()].insert(flag_type, explicit.clone());
                effective[id.index()].insert(flag_type, explicit);
                continue;
            }
            let Some(cid) = compiler else { continue };
            let mut inherited: Vec<String> = Vec::new();
            let name = &catalog.compiler(cid).name;
            for parent in &node.parents {
                let same = asg
                    .node(*parent)
                    .compiler
                    .flatten()
                    .is_some_and(|pc| catalog.compiler(pc).name == *name);
                if !same {
                    continue;
                }
                if let Some(flags) = propagated[parent.index()].get(&flag_type) {
                    push_unique(&mut inherited, flags);
                }
            }
            if !inherited.is_empty() {
                propagated[id.index()].insert(flag_type, inherited.clone());
                effective[id.index()].insert(flag_type, inherited);
            } else if let Some(defaults) = catalog.compiler(cid).flags.get(&flag_type) {
                if !defaults.is_empty() {
                    effective[id.index()].insert(flag_type, defaults.clone());
                }
            }
        }
    }
    effective
}

fn push_unique(into: &mut Vec<String>, flags: &[String]) {
    for flag in flags {
        if !into.contains(flag) {
            into.push(flag.clone());
        }
    }
}
