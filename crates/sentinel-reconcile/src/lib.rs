//! Sentinel-Reconcile: reconciliation core for Sentinel content
//!
//! Brings a workspace's solutions, analytics rules and workbooks in line
//! with the Content Hub catalog, installing or updating only what is
//! missing or stale.
//!
//! ## Key Components
//!
//! - `classify`: kind-neutral status classification of catalog entries
//! - `normalize`: write-shape repair of rule and workbook templates
//! - `policy`: mapping of classifications and policy flags onto actions
//! - `reconcile`: one orchestrator per resource kind
//! - `Coordinator`: sequences the orchestrators for a full run
//! - `obs`, `metrics`, `telemetry`: structured logging and counters

pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod obs;
pub mod outcome;
pub mod patterns;
pub mod policy;
pub mod reconcile;
pub mod telemetry;
pub mod version;

pub use classify::{
    classify, Classifiable, InstalledResource, ResourceKind, ResourceStatus, Status,
};
pub use config::{
    ExpectedPattern, Policies, ReconcileConfig, RulePolicy, SolutionPolicy, WorkbookPolicy,
};
pub use coordinator::{Coordinator, RunReport, StageSkip, StatusEntry, StatusReport};
pub use error::{ReconcileError, Result};
pub use outcome::{DeploymentOutcome, ExpectedSkip, FailedEntry, SkippedEntry};
pub use patterns::{ErrorPatterns, ExpectedFailure, FailureDisposition};
pub use policy::{decide, Action, PlannedAction, PolicyFlags, SkipReason};
pub use reconcile::{
    PackageScope, RulesOrchestrator, SolutionAssessment, SolutionsOrchestrator,
    WorkbooksOrchestrator,
};
pub use version::{compare_versions, VersionDelta};
