//! Version ranges with floating behaviors.
//!
//! Supports bracket notation (`[1.0,2.0)`, `[1.5]`, `(,2.0]`), bare minimum
//! versions (`1.0` means `[1.0, )`), and floating forms (`*`, `1.0.*`,
//! `1.0.0-beta*`) that drift upward from a declared floor at resolve time.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use nupak_util::errors::{NupakError, NupakResult};

use crate::version::Version;

/// Which component of a floating range is allowed to drift, in increasing
/// specificity. `Major` is the bare `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FloatBehavior {
    Prerelease,
    Revision,
    Patch,
    Minor,
    Major,
}

/// A floating version expression, e.g. `1.0.*` or `1.0.0-beta*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatRange {
    pub behavior: FloatBehavior,
    /// The declared floor the float drifts up from.
    pub min_version: Version,
    /// Prerelease prefix for prerelease floats (`beta` in `1.0.0-beta*`).
    pub release_prefix: String,
}

/// One end of a version range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

/// A requested version range: optional lower and upper bounds plus an
/// optional floating directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
    pub float: Option<FloatRange>,
}

impl VersionRange {
    /// An unbounded range that accepts any release version.
    pub fn any() -> Self {
        Self {
            lower: None,
            upper: None,
            float: None,
        }
    }

    /// `[version, )` — the common bare-minimum request.
    pub fn at_least(version: Version) -> Self {
        Self {
            lower: Some(Bound {
                version,
                inclusive: true,
            }),
            upper: None,
            float: None,
        }
    }

    /// `[version]` — an exact pin.
    pub fn exact(version: Version) -> Self {
        Self {
            lower: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            upper: Some(Bound {
                version,
                inclusive: true,
            }),
            float: None,
        }
    }

    /// Parse a range expression.
    pub fn parse(spec: &str) -> NupakResult<Self> {
        let s = spec.trim();
        if s.is_empty() {
            return Err(NupakError::Version {
                message: "empty version range".to_string(),
            }
            .into());
        }

        if s.starts_with('[') || s.starts_with('(') {
            return parse_bracketed(s);
        }
        if s.contains('*') {
            return parse_floating(s);
        }
        Ok(Self::at_least(Version::parse(s)?))
    }

    /// Whether `version` falls inside this range.
    pub fn satisfies(&self, version: &Version) -> bool {
        if let Some(ref lower) = self.lower {
            let cmp = version.cmp(&lower.version);
            if lower.inclusive {
                if cmp == Ordering::Less {
                    return false;
                }
            } else if cmp != Ordering::Greater {
                return false;
            }
        }
        if let Some(ref upper) = self.upper {
            let cmp = version.cmp(&upper.version);
            if upper.inclusive {
                if cmp == Ordering::Greater {
                    return false;
                }
            } else if cmp != Ordering::Less {
                return false;
            }
        }
        if version.is_prerelease() && !self.admits_prereleases() {
            return false;
        }
        true
    }

    /// A range only admits prerelease candidates when it mentions a
    /// prerelease itself, either in a bound or through a prerelease float.
    fn admits_prereleases(&self) -> bool {
        if let Some(ref float) = self.float {
            if float.behavior == FloatBehavior::Prerelease {
                return true;
            }
        }
        let bound_is_prerelease =
            |bound: &Option<Bound>| bound.as_ref().is_some_and(|b| b.version.is_prerelease());
        bound_is_prerelease(&self.lower) || bound_is_prerelease(&self.upper)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref float) = self.float {
            let v = &float.min_version;
            return match float.behavior {
                FloatBehavior::Major => write!(f, "*"),
                FloatBehavior::Minor => write!(f, "{}.*", v.major),
                FloatBehavior::Patch => write!(f, "{}.{}.*", v.major, v.minor),
                FloatBehavior::Revision => write!(f, "{}.{}.{}.*", v.major, v.minor, v.patch),
                FloatBehavior::Prerelease => write!(
                    f,
                    "{}.{}.{}-{}*",
                    v.major, v.minor, v.patch, float.release_prefix
                ),
            };
        }
        match (&self.lower, &self.upper) {
            (Some(l), Some(u)) if l.version == u.version && l.inclusive && u.inclusive => {
                write!(f, "[{}]", l.version)
            }
            (Some(l), None) if l.inclusive => write!(f, "{}", l.version),
            (lower, upper) => {
                let open = if lower.as_ref().is_some_and(|b| b.inclusive) {
                    '['
                } else {
                    '('
                };
                let close = if upper.as_ref().is_some_and(|b| b.inclusive) {
                    ']'
                } else {
                    ')'
                };
                write!(f, "{open}")?;
                if let Some(l) = lower {
                    write!(f, "{}", l.version)?;
                }
                write!(f, ", ")?;
                if let Some(u) = upper {
                    write!(f, "{}", u.version)?;
                }
                write!(f, "{close}")
            }
        }
    }
}

fn parse_bracketed(s: &str) -> NupakResult<VersionRange> {
    let open_inclusive = s.starts_with('[');
    let close_inclusive = match s.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => {
            return Err(NupakError::Version {
                message: format!("{s}: unterminated range"),
            }
            .into());
        }
    };
    let inner = &s[1..s.len() - 1];

    if let Some((lower, upper)) = inner.split_once(',') {
        let lower = lower.trim();
        let upper = upper.trim();
        Ok(VersionRange {
            lower: if lower.is_empty() {
                None
            } else {
                Some(Bound {
                    version: Version::parse(lower)?,
                    inclusive: open_inclusive,
                })
            },
            upper: if upper.is_empty() {
                None
            } else {
                Some(Bound {
                    version: Version::parse(upper)?,
                    inclusive: close_inclusive,
                })
            },
            float: None,
        })
    } else {
        // Exact pin: [1.5] means exactly 1.5
        if !open_inclusive || !close_inclusive {
            return Err(NupakError::Version {
                message: format!("{s}: an exact pin must use square brackets"),
            }
            .into());
        }
        Ok(VersionRange::exact(Version::parse(inner.trim())?))
    }
}

fn parse_floating(s: &str) -> NupakResult<VersionRange> {
    if s == "*" {
        let min = Version::new(0, 0, 0);
        return Ok(float_range(FloatBehavior::Major, min, String::new()));
    }

    if let Some((numbers, label)) = s.split_once('-') {
        // Prerelease float: `1.0.0-*` or `1.0.0-beta*`
        let Some(prefix) = label.strip_suffix('*') else {
            return Err(NupakError::Version {
                message: format!("{s}: a floating prerelease must end with `*`"),
            }
            .into());
        };
        let mut min = Version::parse(numbers)?;
        min.release = Some(if prefix.is_empty() {
            "0".to_string()
        } else {
            prefix.trim_end_matches('.').to_string()
        });
        return Ok(float_range(
            FloatBehavior::Prerelease,
            min,
            prefix.to_string(),
        ));
    }

    let Some(numbers) = s.strip_suffix(".*") else {
        return Err(NupakError::Version {
            message: format!("{s}: unsupported floating form"),
        }
        .into());
    };
    let parts: Vec<&str> = numbers.split('.').collect();
    let behavior = match parts.len() {
        1 => FloatBehavior::Minor,
        2 => FloatBehavior::Patch,
        3 => FloatBehavior::Revision,
        _ => {
            return Err(NupakError::Version {
                message: format!("{s}: too many components before the wildcard"),
            }
            .into());
        }
    };
    let min = Version::parse(numbers)?;
    Ok(float_range(behavior, min, String::new()))
}

fn float_range(behavior: FloatBehavior, min_version: Version, release_prefix: String) -> VersionRange {
    VersionRange {
        lower: Some(Bound {
            version: min_version.clone(),
            inclusive: true,
        }),
        upper: None,
        float: Some(FloatRange {
            behavior,
            min_version,
            release_prefix,
        }),
    }
}

/// Range-vs-range ordering used by downgrade detection: does `near` request
/// at least as high a floor as `far`?
///
/// An absent lower bound always wins; floating ranges are compared through a
/// canonical floor for the floating part, with prerelease prefixes breaking
/// ties (the empty prefix outranks any nonempty one).
pub fn is_greater_or_equal(near: &VersionRange, far: &VersionRange) -> bool {
    if near.lower.is_none() {
        return true;
    }
    if far.lower.is_none() {
        return false;
    }

    if near.float.is_some() || far.float.is_some() {
        let near_floor = floating_floor(near);
        let far_floor = floating_floor(far);
        return match near_floor.cmp(&far_floor) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => {
                release_prefix_outranks(&release_prefix_of(near), &release_prefix_of(far))
            }
        };
    }

    let near_lower = near.lower.as_ref().map(|b| &b.version);
    let far_lower = far.lower.as_ref().map(|b| &b.version);
    near_lower >= far_lower
}

/// Canonical floor substituted for a floating part: `*` floats to the top of
/// its component, a prerelease float keeps its declared numeric floor.
fn floating_floor(range: &VersionRange) -> Version {
    let lower = range
        .lower
        .as_ref()
        .map(|b| b.version.clone())
        .unwrap_or_else(|| Version::new(0, 0, 0));
    let Some(ref float) = range.float else {
        return lower;
    };
    let v = &float.min_version;
    match float.behavior {
        FloatBehavior::Major => Version {
            major: u64::MAX,
            minor: u64::MAX,
            patch: u64::MAX,
            revision: u64::MAX,
            release: None,
        },
        FloatBehavior::Minor => Version {
            major: v.major,
            minor: u64::MAX,
            patch: u64::MAX,
            revision: u64::MAX,
            release: None,
        },
        FloatBehavior::Patch => Version {
            major: v.major,
            minor: v.minor,
            patch: u64::MAX,
            revision: u64::MAX,
            release: None,
        },
        FloatBehavior::Revision => Version {
            major: v.major,
            minor: v.minor,
            patch: v.patch,
            revision: u64::MAX,
            release: None,
        },
        FloatBehavior::Prerelease => Version {
            major: v.major,
            minor: v.minor,
            patch: v.patch,
            revision: v.revision,
            release: None,
        },
    }
}

fn release_prefix_of(range: &VersionRange) -> String {
    if let Some(ref float) = range.float {
        return float.release_prefix.to_lowercase();
    }
    range
        .lower
        .as_ref()
        .and_then(|b| b.version.release.as_deref())
        .map(|label| label.to_lowercase())
        .unwrap_or_default()
}

/// Case-insensitive prefix ordering: the empty prefix outranks any nonempty
/// prefix, a broader prefix outranks a more specific one, otherwise
/// lexicographic.
fn release_prefix_outranks(a: &str, b: &str) -> bool {
    if a.is_empty() {
        return true;
    }
    if b.is_empty() {
        return false;
    }
    if b.starts_with(a) {
        return true;
    }
    if a.starts_with(b) {
        return false;
    }
    a >= b
}
