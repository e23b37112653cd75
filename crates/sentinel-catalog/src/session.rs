//! Explicit session context for the management API.

use serde::{Deserialize, Serialize};

use crate::types::WorkspaceParams;

/// Public-cloud Azure Resource Manager endpoint.
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Credentials and target workspace for one reconciliation run.
///
/// Built once by the caller and handed to the client constructor. Nothing in
/// this crate reads process environment on its own.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// Resource manager base URL (no trailing slash).
    pub arm_endpoint: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub workspace_name: String,
    /// Azure region of the workspace, e.g. `westeurope`.
    pub location: String,
    /// Bearer token for the resource manager audience.
    #[serde(default, skip_serializing)]
    pub access_token: String,
}

impl Session {
    /// Create a session against the public-cloud endpoint.
    pub fn new(
        subscription_id: &str,
        resource_group: &str,
        workspace_name: &str,
        location: &str,
        access_token: &str,
    ) -> Self {
        Session {
            arm_endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            workspace_name: workspace_name.to_string(),
            location: location.to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Point the session at a different resource manager endpoint.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.arm_endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// `/subscriptions/{sub}/resourceGroups/{rg}`
    pub fn resource_group_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group
        )
    }

    /// Full resource id of the Log Analytics workspace.
    pub fn workspace_resource_id(&self) -> String {
        format!(
            "{}/providers/Microsoft.OperationalInsights/workspaces/{}",
            self.resource_group_id(),
            self.workspace_name
        )
    }

    /// Scope under which all Sentinel resources of the workspace live.
    pub fn security_insights_scope(&self) -> String {
        format!(
            "{}/providers/Microsoft.SecurityInsights",
            self.workspace_resource_id()
        )
    }

    pub fn workspace_params(&self) -> WorkspaceParams {
        WorkspaceParams {
            workspace_name: self.workspace_name.clone(),
            location: self.location.clone(),
            workspace_resource_id: self.workspace_resource_id(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("arm_endpoint", &self.arm_endpoint)
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("workspace_name", &self.workspace_name)
            .field("location", &self.location)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("sub-1", "rg-sec", "law-prod", "westeurope", "secret-token")
    }

    #[test]
    fn test_workspace_resource_id() {
        assert_eq!(
            session().workspace_resource_id(),
            "/subscriptions/sub-1/resourceGroups/rg-sec/providers/Microsoft.OperationalInsights/workspaces/law-prod"
        );
        assert!(session()
            .security_insights_scope()
            .ends_with("/workspaces/law-prod/providers/Microsoft.SecurityInsights"));
    }

    #[test]
    fn test_endpoint_override_strips_trailing_slash() {
        let s = session().with_endpoint("https://management.usgovcloudapi.net/");
        assert_eq!(s.arm_endpoint, "https://management.usgovcloudapi.net");
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", session());
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_workspace_params() {
        let params = session().workspace_params();
        assert_eq!(params.workspace_name, "law-prod");
        assert_eq!(params.location, "westeurope");
        assert!(params.workspace_resource_id.ends_with("/workspaces/law-prod"));
    }
}
