//! Error taxonomy for the reconciliation core.

use sentinel_catalog::CatalogError;

/// Reconciliation errors.
///
/// Per-entry write failures never surface here; they are recorded in the
/// kind's [`DeploymentOutcome`](crate::DeploymentOutcome). These variants
/// cover failures that stop a whole pass or prevent one from starting.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("catalog unavailable for {kind}: {source}")]
    CatalogUnavailable {
        kind: crate::ResourceKind,
        #[source]
        source: CatalogError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceKind;

    #[test]
    fn test_catalog_unavailable_names_kind_and_cause() {
        let err = ReconcileError::CatalogUnavailable {
            kind: ResourceKind::Rule,
            source: CatalogError::Transport("connection refused".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("rule"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = ReconcileError::InvalidConfig("max_concurrent_installs must be > 0".to_string());
        assert!(err.to_string().contains("invalid configuration"));
    }
}
