//! Version predicates.
//!
//! Versions are [`portage_atom::Version`] values; this module layers the
//! range syntax used by requests and catalog templates on top of the PMS
//! version ordering:
//!
//! | Syntax      | Meaning                                             |
//! |-------------|-----------------------------------------------------|
//! | *(empty)*   | any version                                         |
//! | `=1.2.3`    | exactly `1.2.3`                                     |
//! | `1.2`       | `1.2` or anything it prefixes (`1.2.0`, `1.2.7`)    |
//! | `1.0:2.0`   | `>= 1.0` and `<= 2.0`, the upper bound prefix-inclusive |
//! | `:2.0`      | up to and including the `2.0` series                |
//! | `1.0:`      | `1.0` or newer                                      |

use std::cmp::Ordering;
use std::fmt;

use portage_atom::Version;

use crate::error::RequestError;

/// Parse a bare version string.
pub fn parse_version(text: &str) -> Result<Version, RequestError> {
    Version::parse(text.trim()).map_err(|_| RequestError::InvalidVersion(text.to_string()))
}

fn glob_of(version: &Version) -> Version {
    let mut glob = version.clone();
    glob.glob = true;
    glob
}

/// A glob version compares equal to every version it prefixes.
fn has_prefix(candidate: &Version, prefix: &Version) -> bool {
    candidate.cmp(&glob_of(prefix)) == Ordering::Equal
}

/// A set of versions expressed as a range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum VersionRange {
    /// Every version.
    #[default]
    Any,
    /// Exactly one version.
    Exact(Version),
    /// The version itself and every version it is a prefix of.
    Prefix(Version),
    /// Inclusive bounds; the upper bound also admits versions it prefixes.
    Between {
        /// Lowest admitted version.
        lower: Option<Version>,
        /// Highest admitted version series.
        upper: Option<Version>,
    },
}

impl VersionRange {
    /// Parse the range syntax described in the module docs.
    pub fn parse(text: &str) -> Result<Self, RequestError> {
        let text = text.trim();
        if text.is_empty() || text == ":" {
            return Ok(VersionRange::Any);
        }
        if let Some(exact) = text.strip_prefix('=') {
            return Ok(VersionRange::Exact(parse_version(exact)?));
        }
        if let Some((lo, hi)) = text.split_once(':') {
            if hi.contains(':') {
                return Err(RequestError::InvalidRange(text.to_string()));
            }
            let lower = if lo.trim().is_empty() {
                None
            } else {
                Some(parse_version(lo)?)
            };
            let upper = if hi.trim().is_empty() {
                None
            } else {
                Some(parse_version(hi)?)
            };
            if let (Some(l), Some(u)) = (&lower, &upper) {
                if l > u && !has_prefix(l, u) {
                    return Err(RequestError::InvalidRange(text.to_string()));
                }
            }
            return Ok(VersionRange::Between { lower, upper });
        }
        Ok(VersionRange::Prefix(parse_version(text)?))
    }

    /// Range matching one exact version.
    pub fn exact(version: Version) -> Self {
        VersionRange::Exact(version)
    }

    /// Whether `version` lies in the range.
    pub fn satisfied_by(&self, version: &Version) -> bool {
        match self {
            VersionRange::Any => true,
            VersionRange::Exact(v) => version.cmp(v) == Ordering::Equal,
            VersionRange::Prefix(p) => has_prefix(version, p),
            VersionRange::Between { lower, upper } => {
                let above = lower.as_ref().is_none_or(|l| version >= l);
                let below = upper
                    .as_ref()
                    .is_none_or(|u| version <= u || has_prefix(version, u));
                above && below
            }
        }
    }

    /// Whether the range admits every version.
    pub fn is_any(&self) -> bool {
        matches!(self, VersionRange::Any)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Any => write!(f, ":"),
            VersionRange::Exact(v) => write!(f, "={}", v),
            VersionRange::Prefix(v) => write!(f, "{}", v),
            VersionRange::Between { lower, upper } => {
                if let Some(l) = lower {
                    write!(f, "{}", l)?;
                }
                write!(f, ":")?;
                if let Some(u) = upper {
                    write!(f, "{}", u)?;
                }
                Ok(())
            }
        }
    }
}
