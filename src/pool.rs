//! Arena storage backing the resolvo ids of the version-level relaxation.
//!
//! Every package of the catalog is one resolvo name (the [`NameId`] index is
//! the [`PackageId`] index). Solvables are the candidate origins of that
//! package: each eligible declared version and each external spec.

use std::collections::HashMap;
use std::fmt;

use portage_atom::Version;
use resolvo::{
    ArenaId, Condition, ConditionId, NameId, SolvableId, StringId, VersionSetId, VersionSetUnionId,
};

use crate::catalog::{ExternalId, PackageId};
use crate::version_match::VersionRange;

/// One candidate origin of a package.
#[derive(Debug, Clone)]
pub(crate) struct RelaxedSolvable {
    pub package: PackageId,
    pub version: Version,
    /// Version weight; externals weigh 0.
    pub weight: u32,
    pub external: Option<ExternalId>,
}

/// Versions of one package.
///
/// `inverted` flips the match before resolvo applies its own `inverse`
/// flag, so a constrain over an inverted set forbids the candidates that
/// match `range`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct VersionSet {
    pub package: PackageId,
    pub range: VersionRange,
    pub inverted: bool,
}

impl VersionSet {
    pub fn matches(&self, version: &Version) -> bool {
        self.range.satisfied_by(version) != self.inverted
    }
}

#[derive(Default)]
pub(crate) struct RelaxedPool {
    names: Vec<String>,
    solvables: Vec<RelaxedSolvable>,
    version_sets: Vec<VersionSet>,
    version_sets_rev: HashMap<VersionSet, VersionSetId>,
    version_set_unions: Vec<Vec<VersionSetId>>,
    conditions: Vec<Condition>,
    strings: Vec<String>,
}

impl RelaxedPool {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            ..Self::default()
        }
    }

    pub fn name_of(package: PackageId) -> NameId {
        NameId::from_usize(package.index())
    }

    pub fn resolve_name(&self, id: NameId) -> &str {
        &self.names[id.to_usize()]
    }

    pub fn intern_solvable(&mut self, solvable: RelaxedSolvable) -> SolvableId {
        let id = SolvableId::from_usize(self.solvables.len());
        self.solvables.push(solvable);
        id
    }

    pub fn resolve_solvable(&self, id: SolvableId) -> &RelaxedSolvable {
        &self.solvables[id.to_usize()]
    }

    pub fn solvable_name(&self, id: SolvableId) -> NameId {
        Self::name_of(self.solvables[id.to_usize()].package)
    }

    /// Intern a version set, deduplicating by value.
    pub fn intern_version_set(&mut self, set: VersionSet) -> VersionSetId {
        if let Some(&id) = self.version_sets_rev.get(&set) {
            return id;
        }
        let id = VersionSetId::from_usize(self.version_sets.len());
        self.version_sets_rev.insert(set.clone(), id);
        self.version_sets.push(set);
        id
    }

    pub fn resolve_version_set(&self, id: VersionSetId) -> &VersionSet {
        &self.version_sets[id.to_usize()]
    }

    pub fn version_set_name(&self, id: VersionSetId) -> NameId {
        Self::name_of(self.version_sets[id.to_usize()].package)
    }

    pub fn intern_version_set_union(&mut self, sets: Vec<VersionSetId>) -> VersionSetUnionId {
        let id = VersionSetUnionId::from_usize(self.version_set_unions.len());
        self.version_set_unions.push(sets);
        id
    }

    pub fn resolve_version_set_union(&self, id: VersionSetUnionId) -> &[VersionSetId] {
        &self.version_set_unions[id.to_usize()]
    }

    pub fn intern_condition(&mut self, condition: Condition) -> ConditionId {
        let id = ConditionId::from_usize(self.conditions.len());
        self.conditions.push(condition);
        id
    }

    pub fn resolve_condition(&self, id: ConditionId) -> &Condition {
        &self.conditions[id.to_usize()]
    }

    pub fn intern_string(&mut self, s: String) -> StringId {
        let id = StringId::from_usize(self.strings.len());
        self.strings.push(s);
        id
    }

    pub fn resolve_string(&self, id: StringId) -> &str {
        &self.strings[id.to_usize()]
    }
}

pub(crate) struct DisplaySolvable<'a>(pub &'a RelaxedPool, pub SolvableId);

impl fmt::Display for DisplaySolvable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let solvable = self.0.resolve_solvable(self.1);
        write!(
            f,
            "{}@{}",
            self.0.resolve_name(self.0.solvable_name(self.1)),
            solvable.version
        )?;
        if solvable.external.is_some() {
            write!(f, " (external)")?;
        }
        Ok(())
    }
}

pub(crate) struct DisplayVersionSet<'a>(pub &'a RelaxedPool, pub VersionSetId);

impl fmt::Display for DisplayVersionSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.0.resolve_version_set(self.1);
        if set.inverted {
            write!(f, "!")?;
        }
        write!(f, "{}", self.0.resolve_name(self.0.version_set_name(self.1)))?;
        if !set.range.is_any() {
            write!(f, "@{}", set.range)?;
        }
        Ok(())
    }
}
