//! Trigger conditions and imposed assertions.
//!
//! A [`Condition`] is a conjunction of `(Slot, Predicate)` atoms evaluated
//! against an [`AttributeView`] of the partial graph. Evaluation is
//! three-valued: while a node or attribute is undecided the atom is
//! [`Truth::Unknown`]. Only positive predicates exist, so a condition that is
//! `True` stays `True` as the assignment grows.

use std::fmt;

use portage_atom::Version;

use crate::catalog::FlagType;
use crate::error::RequestError;
use crate::version_match::VersionRange;

/// Which node an atom talks about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The package declaring the template.
    This,
    /// The dependency of the candidate edge.
    Dependency,
    /// A named package (or virtual, meaning its provider).
    Package(String),
}

/// Atomic attribute predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// The slot is a node of the graph.
    Present,
    Version(VersionRange),
    Variant { name: String, value: String },
    Compiler(String),
    CompilerVersion { name: String, range: VersionRange },
    Platform(String),
    Os(String),
    Target(String),
    /// The node is an external.
    External,
}

impl Predicate {
    pub fn version(text: &str) -> Result<Self, RequestError> {
        Ok(Predicate::Version(VersionRange::parse(text)?))
    }

    pub fn variant(name: &str, value: &str) -> Self {
        Predicate::Variant {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Three-valued truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn of(value: bool) -> Self {
        if value { Truth::True } else { Truth::False }
    }

    /// Conjunction: `False` dominates `Unknown`, which dominates `True`.
    pub fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::Unknown, _) | (_, Truth::Unknown) => Truth::Unknown,
            (Truth::True, Truth::True) => Truth::True,
        }
    }
}

/// Read access to a (partial) assignment.
///
/// `None` results mean "not decided yet".
pub trait AttributeView {
    type Node: Copy;

    /// Node bound to a package or virtual name.
    fn lookup(&self, name: &str) -> Option<Self::Node>;
    fn version(&self, node: Self::Node) -> Option<&Version>;
    fn variant_value(&self, node: Self::Node, variant: &str, value: &str) -> Truth;
    /// `Some(None)` for nodes that have no compiler (externals).
    fn compiler(&self, node: Self::Node) -> Option<Option<(&str, &Version)>>;
    fn platform(&self, node: Self::Node) -> Option<&str>;
    fn os(&self, node: Self::Node) -> Option<&str>;
    fn target(&self, node: Self::Node) -> Option<&str>;
    fn is_external(&self, node: Self::Node) -> Option<bool>;
    /// Under a closed world an absent node is known to stay absent.
    fn closed_world(&self) -> bool;
}

/// Conjunction of slot predicates. The empty conjunction always holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Condition {
    terms: Vec<(Slot, Predicate)>,
    never: bool,
}

impl Condition {
    pub fn always() -> Self {
        Self::default()
    }

    /// A condition that never holds.
    pub fn never() -> Self {
        Self {
            terms: Vec::new(),
            never: true,
        }
    }

    pub fn this(predicate: Predicate) -> Self {
        Self::always().and_this(predicate)
    }

    pub fn and_this(self, predicate: Predicate) -> Self {
        self.and(Slot::This, predicate)
    }

    pub fn and_dependency(self, predicate: Predicate) -> Self {
        self.and(Slot::Dependency, predicate)
    }

    pub fn and_package(self, name: &str, predicate: Predicate) -> Self {
        self.and(Slot::Package(name.to_string()), predicate)
    }

    pub fn and(mut self, slot: Slot, predicate: Predicate) -> Self {
        self.terms.push((slot, predicate));
        self
    }

    pub fn terms(&self) -> &[(Slot, Predicate)] {
        &self.terms
    }

    pub fn is_never(&self) -> bool {
        self.never
    }

    pub fn is_always(&self) -> bool {
        !self.never && self.terms.is_empty()
    }

    /// Evaluate with `this` bound to the template owner and `dependency` to
    /// the name of the candidate edge's target, if any.
    pub fn evaluate<V: AttributeView>(
        &self,
        view: &V,
        this: V::Node,
        dependency: Option<&str>,
    ) -> Truth {
        if self.never {
            return Truth::False;
        }
        let mut truth = Truth::True;
        for (slot, predicate) in &self.terms {
            let node = match slot {
                Slot::This => Some(this),
                Slot::Dependency => dependency.and_then(|name| view.lookup(name)),
                Slot::Package(name) => view.lookup(name),
            };
            let atom = match node {
                Some(node) => evaluate_atom(view, node, predicate),
                None if view.closed_world() => Truth::False,
                None => Truth::Unknown,
            };
            truth = truth.and(atom);
            if truth == Truth::False {
                break;
            }
        }
        truth
    }
}

/// Whether `condition` definitely holds.
pub fn holds<V: AttributeView>(
    condition: &Condition,
    view: &V,
    this: V::Node,
    dependency: Option<&str>,
) -> bool {
    condition.evaluate(view, this, dependency) == Truth::True
}

fn evaluate_atom<V: AttributeView>(view: &V, node: V::Node, predicate: &Predicate) -> Truth {
    let named = |value: Option<&str>, expected: &str| match value {
        Some(actual) => Truth::of(actual == expected),
        None => Truth::Unknown,
    };
    match predicate {
        Predicate::Present => Truth::True,
        Predicate::Version(range) => match view.version(node) {
            Some(version) => Truth::of(range.satisfied_by(version)),
            None => Truth::Unknown,
        },
        Predicate::Variant { name, value } => view.variant_value(node, name, value),
        Predicate::Compiler(expected) => match view.compiler(node) {
            Some(Some((name, _))) => Truth::of(name == expected),
            Some(None) => Truth::False,
            None => Truth::Unknown,
        },
        Predicate::CompilerVersion { name: expected, range } => match view.compiler(node) {
            Some(Some((name, version))) => {
                Truth::of(name == expected && range.satisfied_by(version))
            }
            Some(None) => Truth::False,
            None => Truth::Unknown,
        },
        Predicate::Platform(expected) => named(view.platform(node), expected),
        Predicate::Os(expected) => named(view.os(node), expected),
        Predicate::Target(expected) => named(view.target(node), expected),
        Predicate::External => match view.is_external(node) {
            Some(external) => Truth::of(external),
            None => Truth::Unknown,
        },
    }
}

/// Hard fact attached to a node, either requested explicitly or imposed by a
/// fired dependency template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Assertion {
    Version(VersionRange),
    /// Every listed value must be present.
    Variant { name: String, values: Vec<String> },
    Compiler(String),
    /// Implies the compiler name.
    CompilerVersion { name: String, range: VersionRange },
    Platform(String),
    Os(String),
    Target(String),
    Flag { flag_type: FlagType, flags: Vec<String> },
}

impl Assertion {
    pub fn version(text: &str) -> Result<Self, RequestError> {
        Ok(Assertion::Version(VersionRange::parse(text)?))
    }

    pub fn variant(name: &str, value: &str) -> Self {
        Assertion::Variant {
            name: name.to_string(),
            values: vec![value.to_string()],
        }
    }

    pub fn compiler_version(name: &str, range: &str) -> Result<Self, RequestError> {
        Ok(Assertion::CompilerVersion {
            name: name.to_string(),
            range: VersionRange::parse(range)?,
        })
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Version(range) => write!(f, "@{}", range),
            Assertion::Variant { name, values } => write!(f, "{}={}", name, values.join(",")),
            Assertion::Compiler(name) => write!(f, "%{}", name),
            Assertion::CompilerVersion { name, range } => write!(f, "%{}@{}", name, range),
            Assertion::Platform(name) => write!(f, "platform={}", name),
            Assertion::Os(name) => write!(f, "os={}", name),
            Assertion::Target(name) => write!(f, "target={}", name),
            Assertion::Flag { flag_type, flags } => {
                write!(f, "{}=\"{}\"", flag_type, flags.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeNode {
        version: Option<Version>,
        variants: HashMap<String, String>,
        compiler: Option<Option<(String, Version)>>,
        os: Option<String>,
        external: Option<bool>,
    }

    #[derive(Default)]
    struct FakeView {
        nodes: Vec<FakeNode>,
        names: HashMap<String, usize>,
        closed: bool,
    }

    impl FakeView {
        fn add(&mut self, name: &str, node: FakeNode) -> usize {
            self.nodes.push(node);
            self.names.insert(name.to_string(), self.nodes.len() - 1);
            self.nodes.len() - 1
        }
    }

    impl AttributeView for FakeView {
        type Node = usize;

        fn lookup(&self, name: &str) -> Option<usize> {
            self.names.get(name).copied()
        }
        fn version(&self, node: usize) -> Option<&Version> {
            self.nodes[node].version.as_ref()
        }
        fn variant_value(&self, node: usize, variant: &str, value: &str) -> Truth {
            match self.nodes[node].variants.get(variant) {
                Some(v) => Truth::of(v == value),
                None => Truth::Unknown,
            }
        }
        fn compiler(&self, node: usize) -> Option<Option<(&str, &Version)>> {
            self.nodes[node]
                .compiler
                .as_ref()
                .map(|c| c.as_ref().map(|(n, v)| (n.as_str(), v)))
        }
        fn platform(&self, _node: usize) -> Option<&str> {
            Some("linux")
        }
        fn os(&self, node: usize) -> Option<&str> {
            self.nodes[node].os.as_deref()
        }
        fn target(&self, _node: usize) -> Option<&str> {
            None
        }
        fn is_external(&self, node: usize) -> Option<bool> {
            self.nodes[node].external
        }
        fn closed_world(&self) -> bool {
            self.closed
        }
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn empty_condition_holds() {
        let mut view = FakeView::default();
        let a = view.add("a", FakeNode::default());
        assert!(holds(&Condition::always(), &view, a, None));
        assert_eq!(Condition::never().evaluate(&view, a, None), Truth::False);
    }

    #[test]
    fn undecided_version_is_unknown_then_true() {
        let mut view = FakeView::default();
        let a = view.add("a", FakeNode::default());
        let cond = Condition::this(Predicate::version(":1.9").unwrap());
        assert_eq!(cond.evaluate(&view, a, None), Truth::Unknown);

        view.nodes[a].version = Some(v("1.0"));
        assert_eq!(cond.evaluate(&view, a, None), Truth::True);
    }

    #[test]
    fn false_short_circuits_unknown() {
        let mut view = FakeView::default();
        let a = view.add(
            "a",
            FakeNode {
                version: Some(v("2.0")),
                ..FakeNode::default()
            },
        );
        let cond = Condition::this(Predicate::variant("mpi", "true"))
            .and_this(Predicate::version(":1.9").unwrap());
        assert_eq!(cond.evaluate(&view, a, None), Truth::False);
    }

    #[test]
    fn absent_package_closed_world() {
        let mut view = FakeView::default();
        let a = view.add("a", FakeNode::default());
        let cond = Condition::always().and_package("b", Predicate::Present);
        assert_eq!(cond.evaluate(&view, a, None), Truth::Unknown);
        view.closed = true;
        assert_eq!(cond.evaluate(&view, a, None), Truth::False);
    }

    #[test]
    fn dependency_slot_binds_edge_target() {
        let mut view = FakeView::default();
        let a = view.add("a", FakeNode::default());
        view.add(
            "zlib",
            FakeNode {
                version: Some(v("1.3")),
                ..FakeNode::default()
            },
        );
        let cond = Condition::always().and_dependency(Predicate::version("1.3").unwrap());
        assert!(holds(&cond, &view, a, Some("zlib")));
        assert_eq!(cond.evaluate(&view, a, Some("bzip2")), Truth::Unknown);
    }

    #[test]
    fn compiler_predicates_on_external() {
        let mut view = FakeView::default();
        let a = view.add(
            "a",
            FakeNode {
                compiler: Some(None),
                external: Some(true),
                ..FakeNode::default()
            },
        );
        let b = view.add(
            "b",
            FakeNode {
                compiler: Some(Some(("gcc".into(), v("12.2")))),
                os: Some("ubuntu22.04".into()),
                ..FakeNode::default()
            },
        );
        let gcc = Condition::this(Predicate::Compiler("gcc".into()));
        assert_eq!(gcc.evaluate(&view, a, None), Truth::False);
        assert!(holds(&gcc, &view, b, None));
        let new_gcc = Condition::this(Predicate::CompilerVersion {
            name: "gcc".into(),
            range: VersionRange::parse("13:").unwrap(),
        });
        assert_eq!(new_gcc.evaluate(&view, b, None), Truth::False);
        assert!(holds(&Condition::this(Predicate::External), &view, a, None));
        assert!(holds(
            &Condition::this(Predicate::Os("ubuntu22.04".into())),
            &view,
            b,
            None
        ));
    }

    #[test]
    fn truth_conjunction_table() {
        assert_eq!(Truth::True.and(Truth::Unknown), Truth::Unknown);
        assert_eq!(Truth::Unknown.and(Truth::False), Truth::False);
        assert_eq!(Truth::True.and(Truth::True), Truth::True);
    }

    #[test]
    fn assertion_display() {
        assert_eq!(Assertion::version("1.0:").unwrap().to_string(), "@1.0:");
        assert_eq!(Assertion::variant("shared", "true").to_string(), "shared=true");
        assert_eq!(
            Assertion::compiler_version("gcc", "12").unwrap().to_string(),
            "%gcc@12"
        );
    }
}
