//! # GrowthbookInstance Status
//!
//! Status types for tracking reconciliation state and conditions.

use serde::{Deserialize, Serialize};

/// Status of a GrowthbookInstance
///
/// Every field is always serialized so a merge patch clears stale values.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrowthbookInstanceStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation of the spec last reconciled
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Wall-clock time of the last reconcile pass, e.g. `1.25s`
    #[serde(default)]
    pub last_reconcile_duration: Option<String>,
    /// Child resources the last pass took ownership of
    #[serde(default)]
    pub sub_resource_catalog: Vec<ResourceReference>,
}

impl GrowthbookInstanceStatus {
    /// Condition of the given type, if present
    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }
}

/// Observation about an Instance
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Machine-readable reason: Synchronized or Failed
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
    /// Generation the condition was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last time the status flipped (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

/// Reference to a child resource in the catalog
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub kind: String,
    pub name: String,
    /// `group/version`
    pub api_version: String,
}
