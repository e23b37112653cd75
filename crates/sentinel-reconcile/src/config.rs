//! Reconciliation configuration.
//!
//! Loaded from TOML or assembled by the CLI. Target environment identity is
//! not part of this struct; it travels in [`sentinel_catalog::Session`].
//!
//! ```toml
//! solutions = ["Azure Activity", "Microsoft Entra ID"]
//! severities = ["High", "Medium"]
//! settle_delay_secs = 60
//!
//! [policy.solutions]
//! skip_update = true
//!
//! [policy.workbooks]
//! force_deployment = true
//! ```

use std::path::Path;
use std::time::Duration;

use sentinel_catalog::Severity;
use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};
use crate::patterns::{ErrorPatterns, ExpectedFailure};
use crate::policy::PolicyFlags;

fn default_severities() -> Vec<Severity> {
    Severity::ALL.to_vec()
}

fn default_settle_delay_secs() -> u64 {
    60
}

fn default_pacing_delay_ms() -> u64 {
    1000
}

fn default_max_concurrent_installs() -> usize {
    4
}

/// Solution policy flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolutionPolicy {
    /// Install preview and deprecated solutions too.
    pub force_update: bool,
    pub skip_update: bool,
    /// Do not write solutions; they are still read to scope later stages.
    pub skip_deployment: bool,
}

impl SolutionPolicy {
    pub fn flags(&self) -> PolicyFlags {
        PolicyFlags {
            force_special: self.force_update,
            skip_update: self.skip_update,
            redeploy_current: false,
        }
    }
}

/// Analytics rule policy flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePolicy {
    /// Also reconcile rules of solutions that were already installed.
    pub force_deployment: bool,
    pub skip_update: bool,
    pub skip_deployment: bool,
}

impl RulePolicy {
    pub fn flags(&self) -> PolicyFlags {
        PolicyFlags {
            force_special: false,
            skip_update: self.skip_update,
            redeploy_current: false,
        }
    }
}

/// Workbook policy flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbookPolicy {
    /// Also reconcile workbooks of solutions that were already installed.
    pub force_deployment: bool,
    /// Redeploy workbooks that are already current.
    pub force_redeploy: bool,
    pub skip_update: bool,
    pub skip_deployment: bool,
}

impl WorkbookPolicy {
    pub fn flags(&self) -> PolicyFlags {
        PolicyFlags {
            force_special: false,
            skip_update: self.skip_update,
            redeploy_current: self.force_redeploy,
        }
    }
}

/// Per-kind policies, `[policy.*]` in TOML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policies {
    pub solutions: SolutionPolicy,
    pub rules: RulePolicy,
    pub workbooks: WorkbookPolicy,
}

/// An additional rejection message to treat as expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedPattern {
    pub cause: ExpectedFailure,
    pub pattern: String,
}

/// Everything a reconciliation run needs besides the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Display names of the solutions to reconcile.
    #[serde(default)]
    pub solutions: Vec<String>,

    /// Rule template severities to deploy.
    #[serde(default = "default_severities")]
    pub severities: Vec<Severity>,

    #[serde(default)]
    pub policy: Policies,

    /// Wait between the solutions stage and dependent stages.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// Wait between solution install dispatches.
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,

    #[serde(default = "default_max_concurrent_installs")]
    pub max_concurrent_installs: usize,

    /// Classify and plan without writing.
    #[serde(default)]
    pub dry_run: bool,

    /// Appended to the built-in expected-failure patterns.
    #[serde(default)]
    pub expected_patterns: Vec<ExpectedPattern>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            solutions: Vec::new(),
            severities: default_severities(),
            policy: Policies::default(),
            settle_delay_secs: default_settle_delay_secs(),
            pacing_delay_ms: default_pacing_delay_ms(),
            max_concurrent_installs: default_max_concurrent_installs(),
            dry_run: false,
            expected_patterns: Vec::new(),
        }
    }
}

impl ReconcileConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ReconcileConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_installs == 0 {
            return Err(ReconcileError::InvalidConfig(
                "max_concurrent_installs must be at least 1".to_string(),
            ));
        }
        if self.severities.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "severities must not be empty; omit the key to deploy every severity".to_string(),
            ));
        }
        if let Some(blank) = self.solutions.iter().find(|s| s.trim().is_empty()) {
            return Err(ReconcileError::InvalidConfig(format!(
                "solution names must not be blank: {blank:?}"
            )));
        }
        self.error_patterns().map(|_| ())
    }

    /// Built-in expected-failure patterns plus the configured ones.
    pub fn error_patterns(&self) -> Result<ErrorPatterns> {
        self.expected_patterns
            .iter()
            .try_fold(ErrorPatterns::default(), |acc, extra| {
                acc.with_pattern(extra.cause, &extra.pattern).map_err(|e| {
                    ReconcileError::InvalidConfig(format!(
                        "invalid expected pattern {:?}: {e}",
                        extra.pattern
                    ))
                })
            })
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}
