//! Package version parsing, comparison, and display.
//!
//! Versions carry up to four numeric components (`major.minor.patch.revision`)
//! and an optional prerelease label:
//! - Numeric components compare component-wise; missing components are zero,
//!   so `1.0` equals `1.0.0.0`.
//! - Labels compare dot-segment-wise: numeric segments as numbers, text
//!   segments case-insensitively, and numeric segments sort below text.
//! - A version without a label outranks any labeled version.
//! - Build metadata (`+sha`) is parsed and ignored for ordering.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use nupak_util::errors::{NupakError, NupakResult};

/// A package version: `major[.minor[.patch[.revision]]][-label][+metadata]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    /// Prerelease label without the leading `-`, e.g. `beta.2`.
    pub release: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            release: None,
        }
    }

    /// Parse a version string.
    pub fn parse(input: &str) -> NupakResult<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(NupakError::Version {
                message: "empty version string".to_string(),
            }
            .into());
        }

        // Build metadata does not participate in ordering.
        let s = s.split_once('+').map_or(s, |(head, _)| head);

        let (numbers, release) = match s.split_once('-') {
            Some((_, label)) if label.is_empty() => {
                return Err(NupakError::Version {
                    message: format!("{input}: empty prerelease label"),
                }
                .into());
            }
            Some((head, label)) => (head, Some(label.to_string())),
            None => (s, None),
        };

        let mut components = [0u64; 4];
        let mut count = 0;
        for part in numbers.split('.') {
            if count == 4 {
                return Err(NupakError::Version {
                    message: format!("{input}: more than four numeric components"),
                }
                .into());
            }
            components[count] = part.parse::<u64>().map_err(|_| NupakError::Version {
                message: format!("{input}: component `{part}` is not a number"),
            })?;
            count += 1;
        }

        Ok(Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
            revision: components[3],
            release,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.release.is_some()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision > 0 {
            write!(f, ".{}", self.revision)?;
        }
        if let Some(ref release) = self.release {
            write!(f, "-{release}")?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(self.revision.cmp(&other.revision))
            .then_with(|| compare_release(self.release.as_deref(), other.release.as_deref()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_release(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        // absent label outranks any prerelease
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_labels(a, b),
    }
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.split('.').collect();
    let right: Vec<&str> = b.split('.').collect();
    let max_len = left.len().max(right.len());
    for i in 0..max_len {
        let ord = match (left.get(i), right.get(i)) {
            (None, None) => Ordering::Equal,
            // a longer label with an equal prefix sorts higher
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (Some(a), Some(b)) => compare_label_segments(a, b),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_label_segments(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        // numeric segments sort below text segments
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}
