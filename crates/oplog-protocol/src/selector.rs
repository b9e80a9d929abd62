//! Selectors narrow which operations a view fetches and follows.

use serde::{Deserialize, Serialize};

use crate::types::{FlowId, OperationId, OperationRecord};

/// Every set field must match; an empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSelector {
    #[serde(default)]
    pub ids: Vec<OperationId>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub repo_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub flow_id: Option<FlowId>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
}

impl OperationSelector {
    pub fn for_plan(repo_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            repo_id: Some(repo_id.into()),
            plan_id: Some(plan_id.into()),
            ..Default::default()
        }
    }

    pub fn for_repo(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: Some(repo_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, op: &OperationRecord) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&op.id) {
            return false;
        }
        if let Some(ref instance_id) = self.instance_id {
            if &op.instance_id != instance_id {
                return false;
            }
        }
        if let Some(ref repo_id) = self.repo_id {
            if &op.repo_id != repo_id {
                return false;
            }
        }
        if let Some(ref plan_id) = self.plan_id {
            if &op.plan_id != plan_id {
                return false;
            }
        }
        if let Some(ref flow_id) = self.flow_id {
            if &op.flow_id != flow_id {
                return false;
            }
        }
        if let Some(ref snapshot_id) = self.snapshot_id {
            if op.snapshot_id.as_ref() != Some(snapshot_id) {
                return false;
            }
        }
        true
    }
}
