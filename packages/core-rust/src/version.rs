//! Semantic versions and change classification.
//!
//! [`increment`] is the lenient entry point used when publishing a new
//! schema version: it never fails, and heals malformed input to
//! [`FALLBACK_VERSION`]. Callers that want strict parsing use [`SemVer`]
//! directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Returned by [`increment`] when the current version does not parse.
pub const FALLBACK_VERSION: &str = "1.0.0";

/// Severity of a schema change. Ordered `Patch < Minor < Major`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeClass {
    /// No structural field change.
    #[default]
    Patch,
    /// Additive or non-breaking attribute change.
    Minor,
    /// Breaking: a field removed, renamed, or its type changed.
    Major,
}

impl fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeClass::Patch => f.write_str("PATCH"),
            ChangeClass::Minor => f.write_str("MINOR"),
            ChangeClass::Major => f.write_str("MAJOR"),
        }
    }
}

/// Reasons a version string fails strict parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("expected MAJOR.MINOR.PATCH, got {count} component(s) in {input:?}")]
    WrongComponentCount { input: String, count: usize },
    #[error("invalid {component} component {value:?} in {input:?}")]
    InvalidComponent {
        input: String,
        component: &'static str,
        value: String,
    },
}

/// A parsed `MAJOR.MINOR.PATCH` version.
///
/// Ordering is lexicographic over `(major, minor, patch)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next version for a change of the given class.
    ///
    /// Returns `None` if the bumped component would overflow.
    #[must_use]
    pub fn bump(self, class: ChangeClass) -> Option<Self> {
        match class {
            ChangeClass::Major => Some(Self::new(self.major.checked_add(1)?, 0, 0)),
            ChangeClass::Minor => Some(Self::new(self.major, self.minor.checked_add(1)?, 0)),
            ChangeClass::Patch => Some(Self::new(
                self.major,
                self.minor,
                self.patch.checked_add(1)?,
            )),
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionParseError::WrongComponentCount {
                input: s.to_string(),
                count: parts.len(),
            });
        }

        let component = |name: &'static str, raw: &str| -> Result<u64, VersionParseError> {
            // `u64::from_str` accepts a leading '+', which is not a version digit.
            if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionParseError::InvalidComponent {
                    input: s.to_string(),
                    component: name,
                    value: raw.to_string(),
                });
            }
            raw.parse::<u64>()
                .map_err(|_| VersionParseError::InvalidComponent {
                    input: s.to_string(),
                    component: name,
                    value: raw.to_string(),
                })
        };

        Ok(Self::new(
            component("major", parts[0])?,
            component("minor", parts[1])?,
            component("patch", parts[2])?,
        ))
    }
}

/// Computes the version that follows `current` for a change of `class`.
///
/// Malformed input (anything that is not three dot-separated non-negative
/// integers, or a component that would overflow) yields
/// [`FALLBACK_VERSION`] whatever the class, so a corrupted legacy version
/// never blocks an edit.
#[must_use]
pub fn increment(current: &str, class: ChangeClass) -> String {
    match current.parse::<SemVer>().ok().and_then(|v| v.bump(class)) {
        Some(next) => next.to_string(),
        None => {
            tracing::debug!(
                current,
                %class,
                fallback = FALLBACK_VERSION,
                "unparseable version, using fallback"
            );
            FALLBACK_VERSION.to_string()
        }
    }
}
