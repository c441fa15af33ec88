use assetflow_model::{AssetRecord, WorkflowState};
use serde::{Deserialize, Serialize};

/// Scope for asset listings. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFilter {
    pub project: Option<String>,
    pub state: Option<WorkflowState>,
}

impl AssetFilter {
    pub fn project(project: &str) -> Self {
        AssetFilter {
            project: Some(project.to_string()),
            state: None,
        }
    }

    pub fn state(state: WorkflowState) -> Self {
        AssetFilter {
            project: None,
            state: Some(state),
        }
    }

    pub fn matches(&self, asset: &AssetRecord) -> bool {
        let project_ok = match &self.project {
            Some(p) => asset.project.as_deref() == Some(p.as_str()),
            None => true,
        };
        let state_ok = match self.state {
            Some(s) => asset.workflow_state == s,
            None => true,
        };
        project_ok && state_ok
    }
}
