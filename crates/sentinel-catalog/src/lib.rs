//! Sentinel-Catalog: content catalog boundary for Sentinel reconciliation
//!
//! This crate owns every interaction with the remote management API. It
//! resolves the loosely shaped catalog payloads into typed entries once, at
//! the boundary, and exposes reads and writes through the [`CatalogClient`]
//! trait.
//!
//! ## Key Components
//!
//! - `CatalogClient`: async read/write contract consumed by the reconciler
//! - `ArmCatalogClient`: HTTP implementation over Azure Resource Manager
//! - `Session`: explicit credentials and target workspace
//! - `fakes::MemoryCatalog`: in-memory implementation for tests

pub mod arm;
mod client;
mod error;
pub mod fakes;
mod session;
mod types;

pub use arm::ArmCatalogClient;
pub use client::{CatalogClient, CatalogResult};
pub use error::CatalogError;
pub use session::{Session, DEFAULT_ARM_ENDPOINT};
pub use types::{
    InstalledRule, InstalledRuleRef, InstalledSolution, InstalledWorkbookMetadata,
    RuleTemplateEntry, Severity, SolutionEntry, SourceRef, WorkbookTemplateDetail,
    WorkbookTemplateEntry, WorkspaceParams,
};
