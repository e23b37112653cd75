//! Version comparison for catalog content.
//!
//! Catalog versions are dotted strings ("3.0.2", "1.1") or bare numbers
//! ("2"), never guaranteed to be semver. Segments are compared numerically
//! when both sides are numeric and as strings otherwise; missing trailing
//! segments count as zero, so "1.0" equals "1.0.0" and "2" is older than
//! "10".

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

fn segments(version: &str) -> Vec<&str> {
    version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split(['.', '-', '+'])
        .collect()
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Numeric-aware ordering of two version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let x = left.get(i).copied().unwrap_or("0");
        let y = right.get(i).copied().unwrap_or("0");
        match compare_segment(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether two versions denote different releases.
pub fn versions_differ(installed: &str, available: &str) -> bool {
    compare_versions(installed, available) != Ordering::Equal
}

/// Installed vs. available version of a matched entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDelta {
    pub installed: String,
    pub available: String,
}

impl VersionDelta {
    pub fn new(installed: &str, available: &str) -> Self {
        VersionDelta {
            installed: installed.to_string(),
            available: available.to_string(),
        }
    }

    /// The workspace holds a newer version than the catalog offers.
    pub fn is_downgrade(&self) -> bool {
        compare_versions(&self.installed, &self.available) == Ordering::Greater
    }
}

impl std::fmt::Display for VersionDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.installed, self.available)
    }
}
