//! Trail-backed partial assignment.
//!
//! Every mutation of the in-progress graph (node, edge, attribute,
//! requirement, provider choice) pushes an undo record. A checkpoint is the
//! trail length; rolling back pops records until the trail is that long
//! again, so backtracking costs exactly the work done since the checkpoint.

use std::collections::HashMap;

use portage_atom::Version;

use crate::catalog::{
    Catalog, CompilerId, DependencyKind, DependencyTarget, ExternalId, OsId, PackageId, PlatformId,
    TargetId, VirtualId, DEV_PATH_VARIANT, PATCHES_VARIANT,
};
use crate::condition::{Assertion, AttributeView, Truth};
use crate::error::{ConstraintFamily, Violation};
use crate::solution::kahn_order;

/// Index of a node in the partial graph (creation order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct NodeId(u32);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a node's artifact comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Built from the declared version at this index.
    Built(usize),
    External(ExternalId),
}

impl Origin {
    pub fn is_external(self) -> bool {
        matches!(self, Origin::External(_))
    }
}

/// A hard fact on a node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Requirement {
    pub assertion: Assertion,
    /// Set by the request rather than imposed by a template.
    pub explicit: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeState {
    pub package: PackageId,
    pub root: bool,
    pub origin: Option<Origin>,
    /// Chosen value mask per declared variant.
    pub variants: Vec<Option<u32>>,
    pub platform: Option<PlatformId>,
    pub os: Option<OsId>,
    /// `Some(None)` for nodes without a compiler.
    pub compiler: Option<Option<CompilerId>>,
    pub target: Option<TargetId>,
    pub requirements: Vec<Requirement>,
    /// Per dependency template: already instantiated.
    pub fired: Vec<bool>,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
}

impl NodeState {
    pub fn is_external(&self) -> bool {
        self.origin.is_some_and(Origin::is_external)
    }

    pub fn assertions(&self) -> impl Iterator<Item = &Assertion> {
        self.requirements.iter().map(|r| &r.assertion)
    }

    pub fn structural_decided(&self) -> bool {
        self.origin.is_some() && self.variants.iter().all(Option::is_some)
    }

    pub fn environment_decided(&self) -> bool {
        self.platform.is_some() && self.os.is_some() && self.compiler.is_some() && self.target.is_some()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EdgeState {
    pub parent: NodeId,
    pub child: NodeId,
    pub kinds: u8,
    pub virtual_id: Option<VirtualId>,
}

/// A consumer waiting on (or served by) the provider of a virtual.
#[derive(Debug, Clone)]
pub(crate) struct VirtualNeed {
    /// `None` for a root-level request.
    pub consumer: Option<NodeId>,
    pub virtual_id: VirtualId,
    pub kind: DependencyKind,
    pub imposes: Vec<Assertion>,
    pub explicit: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Attr {
    Origin,
    Variant(usize),
    Platform,
    Os,
    Compiler,
    Target,
}

#[derive(Debug, Clone)]
enum Undo {
    Node,
    Edge,
    EdgeUpdate {
        edge: usize,
        kinds: u8,
        virtual_id: Option<VirtualId>,
    },
    Attribute(NodeId, Attr),
    Requirement(NodeId),
    Fired(NodeId, usize),
    Provider(VirtualId),
    Need,
    Root(NodeId),
}

pub(crate) struct Assignment<'c> {
    catalog: &'c Catalog,
    nodes: Vec<NodeState>,
    by_package: Vec<Option<NodeId>>,
    edges: Vec<EdgeState>,
    edge_index: HashMap<(NodeId, NodeId), usize>,
    providers: Vec<Option<NodeId>>,
    needs: Vec<VirtualNeed>,
    trail: Vec<Undo>,
    closed: bool,
}

impl<'c> Assignment<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            nodes: Vec::new(),
            by_package: vec![None; catalog.package_count()],
            edges: Vec::new(),
            edge_index: HashMap::new(),
            providers: vec![None; catalog.virtual_count()],
            needs: Vec::new(),
            trail: Vec::new(),
            closed: false,
        }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    // --- trail ---

    pub fn checkpoint(&self) -> usize {
        self.trail.len()
    }

    pub fn rollback(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let Some(undo) = self.trail.pop() else { break };
            match undo {
                Undo::Node => {
                    if let Some(node) = self.nodes.pop() {
                        self.by_package[node.package.index()] = None;
                    }
                }
                Undo::Edge => {
                    if let Some(edge) = self.edges.pop() {
                        self.edge_index.remove(&(edge.parent, edge.child));
                        self.nodes[edge.parent.index()].children.pop();
                        self.nodes[edge.child.index()].parents.pop();
                    }
                }
                Undo::EdgeUpdate {
                    edge,
                    kinds,
                    virtual_id,
                } => {
                    self.edges[edge].kinds = kinds;
                    self.edges[edge].virtual_id = virtual_id;
                }
                Undo::Attribute(id, attr) => {
                    let node = &mut self.nodes[id.index()];
                    match attr {
                        Attr::Origin => node.origin = None,
                        Attr::Variant(i) => node.variants[i] = None,
                        Attr::Platform => node.platform = None,
                        Attr::Os => node.os = None,
                        Attr::Compiler => node.compiler = None,
                        Attr::Target => node.target = None,
                    }
                }
                Undo::Requirement(id) => {
                    self.nodes[id.index()].requirements.pop();
                }
                Undo::Fired(id, template) => self.nodes[id.index()].fired[template] = false,
                Undo::Provider(vid) => self.providers[vid.index()] = None,
                Undo::Need => {
                    self.needs.pop();
                }
                Undo::Root(id) => self.nodes[id.index()].root = false,
            }
        }
    }

    // --- nodes ---

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId::from_index)
    }

    pub fn node(&self, id: NodeId) -> &NodeState {
        &self.nodes[id.index()]
    }

    pub fn node_for(&self, package: PackageId) -> Option<NodeId> {
        self.by_package[package.index()]
    }

    /// Create the node of `package`; the caller ensures it does not exist.
    pub fn add_node(&mut self, package: PackageId) -> NodeId {
        let entry = self.catalog.package(package);
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(NodeState {
            package,
            root: false,
            origin: None,
            variants: vec![None; entry.def.variants.len()],
            platform: None,
            os: None,
            compiler: None,
            target: None,
            requirements: Vec::new(),
            fired: vec![false; entry.def.dependencies.len()],
            parents: Vec::new(),
            children: Vec::new(),
        });
        self.by_package[package.index()] = Some(id);
        self.trail.push(Undo::Node);
        id
    }

    pub fn mark_root(&mut self, id: NodeId) {
        if !self.nodes[id.index()].root {
            self.nodes[id.index()].root = true;
            self.trail.push(Undo::Root(id));
        }
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_ids().filter(|&id| self.nodes[id.index()].root)
    }

    pub fn package_name(&self, id: NodeId) -> &'c str {
        &self.catalog.package(self.nodes[id.index()].package).def.name
    }

    // --- attributes ---

    fn record(&mut self, id: NodeId, attr: Attr) {
        self.trail.push(Undo::Attribute(id, attr));
    }

    pub fn set_origin(&mut self, id: NodeId, origin: Origin) {
        self.nodes[id.index()].origin = Some(origin);
        self.record(id, Attr::Origin);
    }

    pub fn set_variant(&mut self, id: NodeId, variant: usize, mask: u32) {
        self.nodes[id.index()].variants[variant] = Some(mask);
        self.record(id, Attr::Variant(variant));
    }

    pub fn set_platform(&mut self, id: NodeId, platform: PlatformId) {
        self.nodes[id.index()].platform = Some(platform);
        self.record(id, Attr::Platform);
    }

    pub fn set_os(&mut self, id: NodeId, os: OsId) {
        self.nodes[id.index()].os = Some(os);
        self.record(id, Attr::Os);
    }

    pub fn set_compiler(&mut self, id: NodeId, compiler: Option<CompilerId>) {
        self.nodes[id.index()].compiler = Some(compiler);
        self.record(id, Attr::Compiler);
    }

    pub fn set_target(&mut self, id: NodeId, target: TargetId) {
        self.nodes[id.index()].target = Some(target);
        self.record(id, Attr::Target);
    }

    pub fn push_requirement(&mut self, id: NodeId, requirement: Requirement) {
        self.nodes[id.index()].requirements.push(requirement);
        self.trail.push(Undo::Requirement(id));
    }

    pub fn mark_fired(&mut self, id: NodeId, template: usize) {
        self.nodes[id.index()].fired[template] = true;
        self.trail.push(Undo::Fired(id, template));
    }

    // --- edges ---

    pub fn edges(&self) -> &[EdgeState] {
        &self.edges
    }

    /// Whether `to` is reachable from `from` along edges.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            stack.extend(self.nodes[id.index()].children.iter().copied());
        }
        false
    }

    /// Add (or merge into) the edge `parent -> child`.
    pub fn connect(
        &mut self,
        parent: NodeId,
        child: NodeId,
        kind: DependencyKind,
        virtual_id: Option<VirtualId>,
    ) -> Result<(), Violation> {
        if let Some(&index) = self.edge_index.get(&(parent, child)) {
            let edge = &self.edges[index];
            let kinds = edge.kinds | kind.bit();
            let merged_virtual = edge.virtual_id.or(virtual_id);
            if kinds != edge.kinds || merged_virtual != edge.virtual_id {
                self.trail.push(Undo::EdgeUpdate {
                    edge: index,
                    kinds: edge.kinds,
                    virtual_id: edge.virtual_id,
                });
                self.edges[index].kinds = kinds;
                self.edges[index].virtual_id = merged_virtual;
            }
            return Ok(());
        }
        if parent == child || self.reaches(child, parent) {
            return Err(Violation::new(
                ConstraintFamily::Cycle,
                format!(
                    "{} -> {} closes a dependency cycle",
                    self.package_name(parent),
                    self.package_name(child)
                ),
            ));
        }
        self.edge_index.insert((parent, child), self.edges.len());
        self.edges.push(EdgeState {
            parent,
            child,
            kinds: kind.bit(),
            virtual_id,
        });
        self.nodes[parent.index()].children.push(child);
        self.nodes[child.index()].parents.push(parent);
        self.trail.push(Undo::Edge);
        Ok(())
    }

    /// Nodes ordered parents-first; ties by creation order.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let edges: Vec<(usize, usize)> = self
            .edges
            .iter()
            .map(|e| (e.parent.index(), e.child.index()))
            .collect();
        kahn_order(self.nodes.len(), &edges)
            .unwrap_or_else(|| (0..self.nodes.len()).collect())
            .into_iter()
            .map(NodeId::from_index)
            .collect()
    }

    // --- virtual providers ---

    pub fn provider(&self, virtual_id: VirtualId) -> Option<NodeId> {
        self.providers[virtual_id.index()]
    }

    pub fn set_provider(&mut self, virtual_id: VirtualId, node: NodeId) {
        self.providers[virtual_id.index()] = Some(node);
        self.trail.push(Undo::Provider(virtual_id));
    }

    /// Virtuals with a chosen provider, in id order.
    pub fn chosen_providers(&self) -> impl Iterator<Item = (VirtualId, NodeId)> + '_ {
        self.providers
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|node| (VirtualId::from_index(i), node)))
    }

    pub fn push_need(&mut self, need: VirtualNeed) {
        self.needs.push(need);
        self.trail.push(Undo::Need);
    }

    pub fn needs(&self) -> &[VirtualNeed] {
        &self.needs
    }

    /// First virtual that is needed but has no provider yet.
    pub fn unresolved_virtual(&self) -> Option<VirtualId> {
        self.needs
            .iter()
            .map(|n| n.virtual_id)
            .find(|&v| self.providers[v.index()].is_none())
    }

    pub fn is_needed(&self, virtual_id: VirtualId) -> bool {
        self.needs.iter().any(|n| n.virtual_id == virtual_id)
    }

    // --- world ---

    pub fn set_closed_world(&mut self, closed: bool) {
        self.closed = closed;
    }
}

impl AttributeView for Assignment<'_> {
    type Node = NodeId;

    fn lookup(&self, name: &str) -> Option<NodeId> {
        match self.catalog.dependency_target(name)? {
            DependencyTarget::Package(pid) => self.by_package[pid.index()],
            DependencyTarget::Virtual(vid) => self.providers[vid.index()],
        }
    }

    fn version(&self, node: NodeId) -> Option<&Version> {
        let state = &self.nodes[node.index()];
        match state.origin? {
            Origin::Built(index) => Some(&self.catalog.package(state.package).def.versions[index].version),
            Origin::External(eid) => Some(&self.catalog.external(eid).version),
        }
    }

    fn variant_value(&self, node: NodeId, variant: &str, value: &str) -> Truth {
        let state = &self.nodes[node.index()];
        let def = &self.catalog.package(state.package).def;
        if let Some(index) = def.variant_index(variant) {
            let Some(bit) = def.variants[index].value_index(value) else {
                return Truth::False;
            };
            return match state.variants[index] {
                Some(mask) if mask & (1 << bit) != 0 => Truth::True,
                Some(_) => Truth::False,
                None => Truth::Unknown,
            };
        }
        if variant != DEV_PATH_VARIANT && variant != PATCHES_VARIANT {
            return Truth::False;
        }
        let set = state.assertions().any(|a| {
            matches!(a, Assertion::Variant { name, values }
                if name == variant && values.iter().any(|v| v == value))
        });
        match (set, self.closed) {
            (true, _) => Truth::True,
            (false, true) => Truth::False,
            (false, false) => Truth::Unknown,
        }
    }

    fn compiler(&self, node: NodeId) -> Option<Option<(&str, &Version)>> {
        self.nodes[node.index()].compiler.map(|compiler| {
            compiler.map(|cid| {
                let def = self.catalog.compiler(cid);
                (def.name.as_str(), &def.version)
            })
        })
    }

    fn platform(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.index()]
            .platform
            .map(|p| self.catalog.platform_name(p))
    }

    fn os(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.index()].os.map(|o| self.catalog.os_name(o))
    }

    fn target(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.index()]
            .target
            .map(|t| self.catalog.target(t).name.as_str())
    }

    fn is_external(&self, node: NodeId) -> Option<bool> {
        self.nodes[node.index()].origin.map(Origin::is_external)
    }

    fn closed_world(&self) -> bool {
        self.closed
    }
}
