//! Concrete output graph.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

use portage_atom::Version;

use crate::assignment::{Assignment, Origin};
use crate::attributes::derive_flags;
use crate::catalog::{DependencyKind, FlagType, DEV_PATH_VARIANT, PATCHES_VARIANT};
use crate::condition::Assertion;
use crate::objective::Cost;
use crate::solver::{SearchStats, SolveContext};

/// Kahn's algorithm over `count` nodes and `(from, to)` edges, always
/// taking the smallest ready index. `None` if the edges contain a cycle.
pub(crate) fn kahn_order(count: usize, edges: &[(usize, usize)]) -> Option<Vec<usize>> {
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];
    for &(from, to) in edges {
        adj[from].push(to);
        in_degree[to] += 1;
    }
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(count);
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &next in &adj[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    (order.len() == count).then_some(order)
}

/// Compiler identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompilerSpec {
    pub name: String,
    pub version: Version,
}

impl fmt::Display for CompilerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A fully resolved package instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteNode {
    pub name: String,
    pub version: Version,
    /// Chosen values per variant, including ad hoc variants that were set.
    pub variants: BTreeMap<String, Vec<String>>,
    pub platform: String,
    pub os: String,
    pub target: String,
    /// `None` only for externals whose spec names no compiler.
    pub compiler: Option<CompilerSpec>,
    pub flags: BTreeMap<FlagType, Vec<String>>,
    /// Install prefix when the node is an external.
    pub external: Option<String>,
    pub root: bool,
}

impl ConcreteNode {
    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }

    /// Values of a variant, empty if the node has no such variant.
    pub fn variant(&self, name: &str) -> &[String] {
        self.variants.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Display for ConcreteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)?;
        if let Some(compiler) = &self.compiler {
            write!(f, " %{compiler}")?;
        }
        for (name, values) in &self.variants {
            write!(f, " {name}={}", values.join(","))?;
        }
        write!(f, " arch={}-{}-{}", self.platform, self.os, self.target)
    }
}

/// Dependency edge between two nodes of a [`Solution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteEdge {
    pub parent: usize,
    pub child: usize,
    pub kinds: Vec<DependencyKind>,
    /// The virtual this edge satisfies, if any.
    pub virtual_name: Option<String>,
}

/// The concretized graph.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Nodes in the order the search created them.
    pub nodes: Vec<ConcreteNode>,
    pub edges: Vec<ConcreteEdge>,
    /// Virtual name to provider node index.
    pub providers: BTreeMap<String, usize>,
    pub cost: Cost,
    /// False when the budget ran out before optimality was proven.
    pub optimal: bool,
    pub stats: SearchStats,
}

impl Solution {
    pub fn node(&self, name: &str) -> Option<&ConcreteNode> {
        self.node_index(name).map(|i| &self.nodes[i])
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Names of the direct dependencies of `name`.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        let Some(index) = self.node_index(name) else {
            return Vec::new();
        };
        self.edges
            .iter()
            .filter(|e| e.parent == index)
            .map(|e| self.nodes[e.child].name.as_str())
            .collect()
    }

    pub fn roots(&self) -> impl Iterator<Item = &ConcreteNode> {
        self.nodes.iter().filter(|n| n.root)
    }

    /// Node indices with every dependency before its dependents; ties go to
    /// the earlier-created node.
    pub fn topological_order(&self) -> Vec<usize> {
        let edges: Vec<(usize, usize)> = self.edges.iter().map(|e| (e.child, e.parent)).collect();
        kahn_order(self.nodes.len(), &edges).unwrap_or_else(|| (0..self.nodes.len()).collect())
    }

    /// Check the structural invariants of the graph.
    pub fn validate(&self) -> Result<(), String> {
        let count = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if self.nodes[..i].iter().any(|other| other.name == node.name) {
                return Err(format!("{} appears more than once", node.name));
            }
            if node.compiler.is_none() && !node.is_external() {
                return Err(format!("{} is built without a compiler", node.name));
            }
        }
        for edge in &self.edges {
            if edge.parent >= count || edge.child >= count {
                return Err("edge refers to a missing node".to_string());
            }
            if edge.kinds.is_empty() {
                return Err(format!(
                    "edge {} -> {} has no dependency kind",
                    self.nodes[edge.parent].name, self.nodes[edge.child].name
                ));
            }
        }
        let pairs: Vec<(usize, usize)> = self.edges.iter().map(|e| (e.parent, e.child)).collect();
        if kahn_order(count, &pairs).is_none() {
            return Err("dependency graph contains a cycle".to_string());
        }

        let mut reached = vec![false; count];
        let mut stack: Vec<usize> = (0..count).filter(|&i| self.nodes[i].root).collect();
        while let Some(i) = stack.pop() {
            if std::mem::replace(&mut reached[i], true) {
                continue;
            }
            stack.extend(self.edges.iter().filter(|e| e.parent == i).map(|e| e.child));
        }
        if let Some(i) = reached.iter().position(|r| !r) {
            return Err(format!("{} is not reachable from a root", self.nodes[i].name));
        }

        for edge in &self.edges {
            if let Some(name) = &edge.virtual_name {
                if self.providers.get(name) != Some(&edge.child) {
                    return Err(format!(
                        "{} is served by {} but the provider of {name} is another node",
                        self.nodes[edge.parent].name, self.nodes[edge.child].name
                    ));
                }
            }
        }
        Ok(())
    }

    /// Read the solution out of a complete assignment.
    pub(crate) fn extract(
        ctx: &SolveContext<'_>,
        asg: &Assignment<'_>,
        cost: Cost,
        stats: SearchStats,
    ) -> Option<Solution> {
        let catalog = ctx.catalog;
        let mut flags = derive_flags(ctx, asg);
        let mut nodes = Vec::with_capacity(asg.node_count());
        for id in asg.node_ids() {
            let node = asg.node(id);
            let def = &catalog.package(node.package).def;
            let mut variants = BTreeMap::new();
            for (index, variant) in def.variants.iter().enumerate() {
                let mask = node.variants[index].unwrap_or(0);
                variants.insert(variant.name.clone(), variant.values_of(mask));
            }
            for assertion in node.assertions() {
                if let Assertion::Variant { name, values } = assertion {
                    if name == DEV_PATH_VARIANT || name == PATCHES_VARIANT {
                        let entry: &mut Vec<String> = variants.entry(name.clone()).or_default();
                        for value in values {
                            if !entry.contains(value) {
                                entry.push(value.clone());
                            }
                        }
                    }
                }
            }
            let (version, external) = match node.origin? {
                Origin::External(eid) => {
                    let spec = catalog.external(eid);
                    (spec.version.clone(), Some(spec.prefix.clone()))
                }
                Origin::Built(index) => (def.versions[index].version.clone(), None),
            };
            nodes.push(ConcreteNode {
                name: def.name.clone(),
                version,
                variants,
                platform: node
                    .platform
                    .map(|p| catalog.platform_name(p).to_string())
                    .unwrap_or_default(),
                os: node.os.map(|o| catalog.os_name(o).to_string()).unwrap_or_default(),
                target: node
                    .target
                    .map(|t| catalog.target(t).name.clone())
                    .unwrap_or_default(),
                compiler: node.compiler.flatten().map(|cid| {
                    let compiler = catalog.compiler(cid);
                    CompilerSpec {
                        name: compiler.name.clone(),
                        version: compiler.version.clone(),
                    }
                }),
                flags: std::mem::take(&mut flags[id.index()]),
                external,
                root: node.root,
            });
        }
        let edges = asg
            .edges()
            .iter()
            .map(|e| ConcreteEdge {
                parent: e.parent.index(),
                child: e.child.index(),
                kinds: DependencyKind::from_bits(e.kinds),
                virtual_name: e.virtual_id.map(|v| catalog.virtual_entry(v).name.clone()),
            })
            .collect();
        let providers = asg
            .chosen_providers()
            .map(|(vid, node)| (catalog.virtual_entry(vid).name.clone(), node.index()))
            .collect();
        Some(Solution {
            nodes,
            edges,
            providers,
            cost,
            optimal: true,
            stats,
        })
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in self.topological_order() {
            let node = &self.nodes[index];
            writeln!(f, "{}{node}", if node.root { "" } else { "  ^" })?;
        }
        Ok(())
    }
}
