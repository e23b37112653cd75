//! Classification to action mapping.
//!
//! Policy flags are applied here and nowhere else. The classifier never sees
//! them, and orchestrators only execute what [`decide`] returns.

use serde::{Deserialize, Serialize};

use crate::classify::{ResourceStatus, Status};

/// What an orchestrator does with one classified entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum Action {
    Install,
    Update,
    Skip(SkipReason),
}

/// Why an entry is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A linked, up-to-date copy is installed.
    Current,
    Deprecated,
    /// Preview or deprecated solution without the force flag.
    Special,
    /// Stale, but updates are suppressed.
    UpdateSuppressed,
    /// Same display name, different source. Needs manual attention.
    NameMatch,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::Current => "already current",
            SkipReason::Deprecated => "deprecated",
            SkipReason::Special => "preview or deprecated solution",
            SkipReason::UpdateSuppressed => "update suppressed",
            SkipReason::NameMatch => "display name collides with an unlinked resource",
        };
        f.write_str(s)
    }
}

/// Kind-neutral view of the policy flags that affect the action mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyFlags {
    /// Install `Special` solutions.
    pub force_special: bool,
    /// Leave `NeedsUpdate` entries as they are.
    pub skip_update: bool,
    /// Update entries that are already current.
    pub redeploy_current: bool,
}

/// Map a classification onto an action.
pub fn decide(status: Status, flags: &PolicyFlags) -> Action {
    match status {
        Status::Deprecated => Action::Skip(SkipReason::Deprecated),
        Status::Installed | Status::Current | Status::PreviewCurrent => {
            if flags.redeploy_current {
                Action::Update
            } else {
                Action::Skip(SkipReason::Current)
            }
        }
        Status::NeedsUpdate if flags.skip_update => Action::Skip(SkipReason::UpdateSuppressed),
        Status::NeedsUpdate => Action::Update,
        Status::NotInstalled | Status::Missing | Status::PreviewMissing => Action::Install,
        Status::Special if flags.force_special => Action::Install,
        Status::Special => Action::Skip(SkipReason::Special),
        Status::NameMatch => Action::Skip(SkipReason::NameMatch),
    }
}

/// One classified entry with its decided action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction<E> {
    pub entry: E,
    pub status: ResourceStatus,
    pub action: Action,
}

/// Pair every classification with its decided action.
pub fn plan<E>(classified: Vec<(E, ResourceStatus)>, flags: &PolicyFlags) -> Vec<PlannedAction<E>> {
    classified
        .into_iter()
        .map(|(entry, status)| {
            let action = decide(status.status, flags);
            PlannedAction {
                entry,
                status,
                action,
            }
        })
        .collect()
}
