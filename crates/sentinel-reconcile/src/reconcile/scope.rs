//! Package scoping for dependent stages.

use std::collections::{BTreeSet, HashSet};

use sentinel_catalog::SolutionEntry;

/// Which packages a rules or workbooks pass may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PackageScope {
    /// Every template in the catalog.
    #[default]
    All,
    /// Only templates whose package id is in the set (lowercased).
    Packages(BTreeSet<String>),
}

impl PackageScope {
    /// Resolve solution display names to the package ids their templates
    /// reference, through the solutions catalog.
    ///
    /// A template's `packageId` carries the solution's content id; some
    /// catalog revisions use the catalog resource name instead, so both are
    /// admitted. Names the catalog does not know contribute nothing.
    pub fn for_solutions<S: AsRef<str>>(
        catalog: &[SolutionEntry],
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        let wanted: HashSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .collect();

        let packages = catalog
            .iter()
            .filter(|entry| wanted.contains(&entry.display_name.trim().to_lowercase()))
            .flat_map(|entry| [entry.content_id.to_lowercase(), entry.id.to_lowercase()])
            .filter(|id| !id.is_empty())
            .collect();

        PackageScope::Packages(packages)
    }

    pub fn contains(&self, package_id: Option<&str>) -> bool {
        match self {
            PackageScope::All => true,
            PackageScope::Packages(set) => package_id
                .map(|p| set.contains(&p.to_lowercase()))
                .unwrap_or(false),
        }
    }

    /// An explicit scope that admits nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, PackageScope::Packages(set) if set.is_empty())
    }
}

/// Solution names a dependent stage is scoped to: everything that changed,
/// plus what was already installed when the stage is forced.
///
/// Duplicates are dropped case-insensitively; first spelling wins.
pub fn dependent_names(changed: &[String], already_installed: &[String], force: bool) -> Vec<String> {
    let mut seen = HashSet::new();
    let extra: &[String] = if force { already_installed } else { &[] };
    changed
        .iter()
        .chain(extra.iter())
        .filter(|name| seen.insert(name.to_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, content_id: &str, name: &str) -> SolutionEntry {
        SolutionEntry {
            id: id.to_string(),
            content_id: content_id.to_string(),
            display_name: name.to_string(),
            version: Some("1.0.0".to_string()),
            packaged_content: None,
        }
    }

    #[test]
    fn test_scope_resolves_names_to_package_ids() {
        let catalog = [
            entry("azure-activity-sl", "azuresentinel.azure-activity", "Azure Activity"),
            entry("dns-sl", "azuresentinel.dns", "DNS"),
        ];
        let scope = PackageScope::for_solutions(&catalog, ["azure activity"]);

        assert!(scope.contains(Some("AzureSentinel.Azure-Activity")));
        assert!(scope.contains(Some("azure-activity-sl")));
        assert!(!scope.contains(Some("azuresentinel.dns")));
        assert!(!scope.contains(None));
    }

    #[test]
    fn test_unknown_names_give_empty_scope() {
        let scope = PackageScope::for_solutions(&[], ["Nope"]);
        assert!(scope.is_empty());
        assert!(!PackageScope::All.is_empty());
        assert!(PackageScope::All.contains(None));
    }

    #[test]
    fn test_dependent_names_union() {
        let changed = vec!["A".to_string(), "B".to_string()];
        let installed = vec!["b".to_string(), "C".to_string()];

        assert_eq!(dependent_names(&changed, &installed, false), vec!["A", "B"]);
        assert_eq!(dependent_names(&changed, &installed, true), vec!["A", "B", "C"]);
        assert!(dependent_names(&[], &installed, false).is_empty());
    }
}
