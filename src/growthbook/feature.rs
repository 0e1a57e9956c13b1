//! # Features
//!
//! Store shape of a feature flag. Environment settings are keyed by
//! environment name; rule fields are omitted when empty so rules written by
//! the GrowthBook UI and by this controller share one layout.

use crate::constants::{COLLECTION_FEATURES, FEATURE_OWNER};
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{self, GrowthbookFeature};
use crate::growthbook::{effective_id, StoreEntity};
use kube::ResourceExt;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[allow(
    clippy::trivially_copy_pass_by_ref,
    reason = "serde skip_serializing_if passes a reference"
)]
fn is_false(value: &bool) -> bool {
    !*value
}

#[allow(
    clippy::trivially_copy_pass_by_ref,
    clippy::float_cmp,
    reason = "omitted only when exactly zero"
)]
fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

#[allow(
    clippy::trivially_copy_pass_by_ref,
    reason = "serde skip_serializing_if passes a reference"
)]
fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Feature {
    pub id: String,
    pub owner: String,
    pub description: String,
    pub tags: Vec<String>,
    pub default_value: String,
    pub value_type: String,
    pub organization: String,
    #[serde(rename = "environment")]
    pub environments: Vec<String>,
    pub environment_settings: BTreeMap<String, EnvironmentSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<DateTime>,
    pub archived: bool,
    #[serde(rename = "__v")]
    pub version: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSetting {
    pub enabled: bool,
    pub rules: Vec<FeatureRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureRule {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schedule_rules: Vec<ScheduleRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub saved_groups: Vec<SavedGroupTargeting>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<FeaturePrerequisite>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "is_zero_f64")]
    pub coverage: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash_attribute: String,
    #[serde(skip_serializing_if = "String::is_empty")]
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
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ExperimentValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleRule {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedGroupTargeting {
    #[serde(rename = "match", skip_serializing_if = "String::is_empty")]
    pub match_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturePrerequisite {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceValue {
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub range: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentValue {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub weight: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Unparsable or empty coverage maps to 0
fn parse_coverage(coverage: &str) -> f64 {
    coverage.trim().parse().unwrap_or(0.0)
}

impl From<&crd::FeatureRule> for FeatureRule {
    fn from(rule: &crd::FeatureRule) -> Self {
        Self {
            id: rule.id.clone(),
            r#type: rule.r#type.map(|t| t.as_str().to_string()).unwrap_or_default(),
            description: rule.description.clone(),
            condition: rule.condition.clone(),
            enabled: rule.enabled,
            schedule_rules: rule
                .schedule_rules
                .iter()
                .map(|s| ScheduleRule {
                    timestamp: s.timestamp.clone(),
                    enabled: s.enabled,
                })
                .collect(),
            saved_groups: rule
                .saved_groups
                .iter()
                .map(|g| SavedGroupTargeting {
                    match_type: g.r#match.as_str().to_string(),
                    ids: g.ids.clone(),
                })
                .collect(),
            prerequisites: rule
                .prerequisites
                .iter()
                .map(|p| FeaturePrerequisite {
                    id: p.id.clone(),
                    condition: p.condition.clone(),
                })
                .collect(),
            value: rule.value.clone(),
            coverage: parse_coverage(&rule.coverage),
            hash_attribute: rule.hash_attribute.clone(),
            tracking_key: rule.tracking_key.clone(),
            fallback_attribute: rule.fallback_attribute.clone(),
            disable_sticky_bucketing: rule.disable_sticky_bucketing,
            bucket_version: rule.bucket_version,
            min_bucket_version: rule.min_bucket_version,
            namespace: rule.namespace.as_ref().map(|n| NamespaceValue {
                enabled: n.enabled,
                name: n.name.clone(),
                range: n.range.clone(),
            }),
            values: rule
                .values
                .iter()
                .map(|v| ExperimentValue {
                    value: v.value.clone(),
                    weight: v.weight,
                    name: v.name.clone(),
                })
                .collect(),
        }
    }
}

impl Feature {
    /// Map a declared Feature owned by `organization`
    #[must_use]
    pub fn from_resource(feature: &GrowthbookFeature, organization: &str) -> Self {
        let environment_settings = feature
            .spec
            .environments
            .iter()
            .map(|env| {
                (
                    env.name.clone(),
                    EnvironmentSetting {
                        enabled: env.enabled,
                        rules: env.rules.iter().map(FeatureRule::from).collect(),
                    },
                )
            })
            .collect();

        Self {
            id: effective_id(feature.spec.id.as_deref(), &feature.name_any()),
            owner: FEATURE_OWNER.to_string(),
            description: feature.spec.description.clone(),
            tags: feature.spec.tags.clone(),
            default_value: feature.spec.default_value.clone(),
            value_type: feature.spec.value_type.as_str().to_string(),
            organization: organization.to_string(),
            environments: feature.spec.environments.iter().map(|e| e.name.clone()).collect(),
            environment_settings,
            ..Self::default()
        }
    }
}

/// Existing rules with an ID survive unless a declared rule claims the same
/// ID; declared rules follow in order
fn merge_rules(existing: &[FeatureRule], declared: &[FeatureRule]) -> Vec<FeatureRule> {
    existing
        .iter()
        .filter(|rule| !rule.id.is_empty() && !declared.iter().any(|d| d.id == rule.id))
        .chain(declared)
        .cloned()
        .collect()
}

impl StoreEntity for Feature {
    const COLLECTION: &'static str = COLLECTION_FEATURES;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_into(&self, existing: &mut Self) -> Result<(), ReconcilerError> {
        existing.description.clone_from(&self.description);
        existing.default_value.clone_from(&self.default_value);
        existing.value_type.clone_from(&self.value_type);
        existing.tags.clone_from(&self.tags);
        existing.environments.clone_from(&self.environments);

        existing
            .environment_settings
            .retain(|env, _| self.environment_settings.contains_key(env));
        for (env, declared) in &self.environment_settings {
            let setting = existing.environment_settings.entry(env.clone()).or_default();
            setting.enabled = declared.enabled;
            setting.rules = merge_rules(&setting.rules, &declared.rules);
        }
        Ok(())
    }

    fn prepare_insert(&mut self, now: DateTime) -> Result<(), ReconcilerError> {
        self.date_created = Some(now);
        self.date_updated = Some(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime) {
        self.date_updated = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Environment, FeatureRuleType, GrowthbookFeatureSpec};
    use crate::growthbook::{upsert, UpsertOutcome};
    use crate::storage::MemoryDatabase;
    use mongodb::bson::{doc, Bson};

    fn declared(rules: Vec<crd::FeatureRule>) -> GrowthbookFeature {
        GrowthbookFeature::new(
            "dark-mode",
            GrowthbookFeatureSpec {
                description: "Dark mode".to_string(),
                default_value: "false".to_string(),
                environments: vec![Environment {
                    name: "production".to_string(),
                    enabled: true,
                    rules,
                }],
                ..GrowthbookFeatureSpec::default()
            },
        )
    }

    fn force(value: &str) -> crd::FeatureRule {
        crd::FeatureRule {
            r#type: Some(FeatureRuleType::Force),
            value: value.to_string(),
            ..crd::FeatureRule::default()
        }
    }

    fn rule_ids(document: &mongodb::bson::Document, env: &str) -> Vec<String> {
        document
            .get_document("environmentSettings")
            .unwrap()
            .get_document(env)
            .unwrap()
            .get_array("rules")
            .unwrap()
            .iter()
            .map(|rule| match rule {
                Bson::Document(rule) => rule.get_str("id").unwrap_or("").to_string(),
                _ => panic!("rule is not a document"),
            })
            .collect()
    }

    #[test]
    fn test_mapping() {
        let feature = Feature::from_resource(&declared(vec![force("true")]), "org-1");

        assert_eq!(feature.id, "dark-mode");
        assert_eq!(feature.owner, "growthbook-controller");
        assert_eq!(feature.organization, "org-1");
        assert_eq!(feature.value_type, "boolean");
        assert!(feature.tags.is_empty());
        let rules = &feature.environment_settings["production"].rules;
        assert_eq!(rules[0].r#type, "force");
        assert_eq!(rules[0].value, "true");
    }

    #[test]
    fn test_coverage_is_lenient() {
        let mut rule = force("true");
        rule.coverage = "0.25".to_string();
        assert!((FeatureRule::from(&rule).coverage - 0.25).abs() < f64::EPSILON);

        rule.coverage = "lots".to_string();
        assert!(FeatureRule::from(&rule).coverage.abs() < f64::EPSILON);

        rule.coverage = String::new();
        assert!(FeatureRule::from(&rule).coverage.abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_rule_fields_are_omitted() {
        let document = mongodb::bson::to_document(&FeatureRule::from(&force("on"))).unwrap();
        assert_eq!(document, doc! {"type": "force", "value": "on"});
    }

    #[test]
    fn test_merge_rules_supersedes_by_id() {
        let existing = vec![
            FeatureRule { id: "r1".to_string(), value: "old".to_string(), ..FeatureRule::default() },
            FeatureRule { id: String::new(), value: "anonymous".to_string(), ..FeatureRule::default() },
            FeatureRule { id: "r2".to_string(), ..FeatureRule::default() },
        ];
        let declared = vec![
            FeatureRule { id: "r2".to_string(), value: "new".to_string(), ..FeatureRule::default() },
            FeatureRule { value: "plain".to_string(), ..FeatureRule::default() },
        ];

        let merged = merge_rules(&existing, &declared);
        let values: Vec<&str> = merged.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["old", "new", "plain"]);
    }

    #[tokio::test]
    async fn test_store_rules_are_preserved() {
        let database = MemoryDatabase::new();
        database.seed(
            "features",
            doc! {
                "id": "dark-mode",
                "owner": "someone",
                "organization": "org-1",
                "environmentSettings": {
                    "production": {"enabled": false, "rules": [{"id": "r1", "type": "force", "value": "true"}]},
                    "staging": {"enabled": true, "rules": []},
                },
                "__v": 2,
            },
        );

        let outcome = upsert(
            &database,
            Feature::from_resource(&declared(vec![force("false")]), "org-1"),
        )
        .await
        .unwrap();

        let stored = database.find_by_id("features", "dark-mode").unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(rule_ids(&stored, "production"), vec!["r1".to_string(), String::new()]);
        assert!(stored
            .get_document("environmentSettings")
            .unwrap()
            .get_document("staging")
            .is_err());
        assert_eq!(stored.get_str("owner").unwrap(), "someone");
        assert_eq!(stored.get_i32("__v").unwrap(), 2);
        assert!(stored.get_datetime("dateUpdated").is_ok());
    }

    #[tokio::test]
    async fn test_declared_rules_do_not_accumulate() {
        let database = MemoryDatabase::new();
        let feature = || Feature::from_resource(&declared(vec![force("false")]), "org-1");

        assert_eq!(upsert(&database, feature()).await.unwrap(), UpsertOutcome::Created);
        // Declared rules without an ID are replaced on every pass
        assert_eq!(upsert(&database, feature()).await.unwrap(), UpsertOutcome::Unchanged);

        let stored = database.find_by_id("features", "dark-mode").unwrap();
        assert_eq!(rule_ids(&stored, "production").len(), 1);
    }
}
