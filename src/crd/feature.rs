//! # GrowthbookFeature
//!
//! A feature flag with per-environment targeting rules.

use serde::{Deserialize, Serialize};

#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "GrowthbookFeature",
    group = "growthbook.infra.doodle.com",
    version = "v1beta1",
    namespaced,
    shortname = "gbf"
)]
#[serde(rename_all = "camelCase")]
pub struct GrowthbookFeatureSpec {
    /// Store ID; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub value_type: FeatureValueType,
    #[serde(default = "default_environments")]
    pub environments: Vec<Environment>,
}

#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum FeatureValueType {
    #[default]
    Boolean,
    String,
    Number,
    Json,
}

impl FeatureValueType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureValueType::Boolean => "boolean",
            FeatureValueType::String => "string",
            FeatureValueType::Number => "number",
            FeatureValueType::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FeatureRule>,
}

/// Targeting rule of one environment
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureRule {
    /// Rules with the same ID as a store rule replace it
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<FeatureRuleType>,
    pub description: String,
    pub condition: String,
    pub enabled: bool,
    pub schedule_rules: Vec<ScheduleRule>,
    pub saved_groups: Vec<SavedGroupTargeting>,
    pub prerequisites: Vec<FeaturePrerequisite>,
    pub value: String,
    /// Fraction of traffic between 0 and 1, as a decimal string
    pub coverage: String,
    pub hash_attribute: String,
    pub tracking_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_sticky_bucketing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_bucket_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<NamespaceValue>,
    pub values: Vec<ExperimentValue>,
}

#[derive(
    Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum FeatureRuleType {
    Force,
    Rollout,
    Experiment,
}

impl FeatureRuleType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureRuleType::Force => "force",
            FeatureRuleType::Rollout => "rollout",
            FeatureRuleType::Experiment => "experiment",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    /// RFC3339 timestamp, empty for "immediately"
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedGroupTargeting {
    pub r#match: SavedGroupMatch,
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SavedGroupMatch {
    All,
    None,
    Any,
}

impl SavedGroupMatch {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SavedGroupMatch::All => "all",
            SavedGroupMatch::None => "none",
            SavedGroupMatch::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePrerequisite {
    pub id: String,
    #[serde(default)]
    pub condition: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceValue {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub range: Vec<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentValue {
    pub value: String,
    #[serde(default)]
    pub weight: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_environments() -> Vec<Environment> {
    vec![Environment {
        name: "dev".to_string(),
        enabled: true,
        rules: Vec::new(),
    }]
}
