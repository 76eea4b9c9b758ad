//! Error taxonomy.
//!
//! Catalog and request problems are reported before any search happens.
//! Search outcomes that are not a solution are either a proven
//! [`Infeasibility`] or an exhausted budget; the two are never conflated.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Inconsistencies in the static catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("package `{0}` is defined twice")]
    DuplicatePackage(String),

    #[error("package `{package}` references unknown {kind} `{name}`")]
    UnknownReference {
        package: String,
        kind: &'static str,
        name: String,
    },

    #[error("package `{package}` depends on `{dependency}`, which is neither a package nor a virtual")]
    UnknownDependency { package: String, dependency: String },

    #[error("package `{package}` declares variant `{variant}` with a default outside its values")]
    InvalidVariantDefault { package: String, variant: String },

    #[error("variant `{package}.{variant}` has too many values ({count}) to enumerate")]
    VariantTooWide {
        package: String,
        variant: String,
        count: usize,
    },

    #[error("external `{package}@{version}` does not match any catalog package")]
    UnknownExternal { package: String, version: String },

    #[error("environment has no {0}")]
    EmptyEnvironment(&'static str),

    #[error("default {kind} `{name}` is not in the environment")]
    UnknownDefault { kind: &'static str, name: String },
}

/// Problems with a request or its configuration, found before searching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid version `{0}`")]
    InvalidVersion(String),

    #[error("invalid version range `{0}`")]
    InvalidRange(String),

    #[error("request names unknown package `{0}`")]
    UnknownPackage(String),

    #[error("request references unknown {kind} `{name}`")]
    UnknownReference { kind: &'static str, name: String },

    #[error("request is empty")]
    Empty,

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The family of hard constraints that rejected a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintFamily {
    /// A conflict template fired.
    Conflict,
    /// No version or external satisfies the version requirements.
    Version,
    /// An external spec clashes with a requirement on its node.
    External,
    /// A variant has no admissible value, or an unknown variant was set.
    Variant,
    /// No provider available, provider condition false, or two providers.
    Provider,
    /// An edge would close a dependency cycle.
    Cycle,
    /// An explicitly requested dependency is absent or unreachable.
    Reachability,
    /// No admissible platform.
    Platform,
    /// Explicit and inherited operating systems disagree.
    Os,
    /// No compiler satisfies the compiler requirements.
    Compiler,
    /// Every compiler candidate is unsupported on the node's OS.
    CompilerOs,
    /// The chosen target is not supported by any admissible compiler.
    TargetCompiler,
    /// No admissible target.
    Target,
}

impl fmt::Display for ConstraintFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintFamily::Conflict => "conflict",
            ConstraintFamily::Version => "version",
            ConstraintFamily::External => "external",
            ConstraintFamily::Variant => "variant",
            ConstraintFamily::Provider => "virtual provider",
            ConstraintFamily::Cycle => "dependency cycle",
            ConstraintFamily::Reachability => "reachability",
            ConstraintFamily::Platform => "platform",
            ConstraintFamily::Os => "operating system",
            ConstraintFamily::Compiler => "compiler",
            ConstraintFamily::CompilerOs => "compiler/os compatibility",
            ConstraintFamily::TargetCompiler => "target/compiler compatibility",
            ConstraintFamily::Target => "target",
        };
        f.write_str(name)
    }
}

/// A hard-constraint violation observed during search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub family: ConstraintFamily,
    pub message: String,
}

impl Violation {
    pub fn new(family: ConstraintFamily, message: impl Into<String>) -> Self {
        Self {
            family,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.family, self.message)
    }
}

/// Structured report for a request with no feasible graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Infeasibility {
    /// The family that rejected the most branches (ties: declaration order).
    pub family: ConstraintFamily,
    /// First violation message recorded for `family`.
    pub detail: String,
    /// Number of rejected branches per family.
    pub rejections: BTreeMap<ConstraintFamily, u64>,
    /// Version/conflict-level explanation from the relaxed problem, when the
    /// relaxation itself is unsatisfiable.
    pub explanation: Option<String>,
}

impl fmt::Display for Infeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.detail, self.family)?;
        if let Some(explanation) = &self.explanation {
            write!(f, "\n{}", explanation)?;
        }
        Ok(())
    }
}

/// Top-level error returned by the concretizer.
#[derive(Error, Debug, Clone)]
pub enum ConcretizeError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("unsatisfiable request: {0}")]
    Unsatisfiable(Infeasibility),

    #[error("no solution found within the search budget ({decisions} decisions)")]
    BudgetExhausted { decisions: u64 },
}

impl ConcretizeError {
    /// The constraint family for unsatisfiable outcomes.
    pub fn family(&self) -> Option<ConstraintFamily> {
        match self {
            ConcretizeError::Unsatisfiable(report) => Some(report.family),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConcretizeError>;
