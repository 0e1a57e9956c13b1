//! # Shared CRD Types
//!
//! Secret references and label selectors used by several GrowthBook kinds.

use crate::constants::{DEFAULT_PASSWORD_FIELD, DEFAULT_TOKEN_FIELD, DEFAULT_USER_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a Secret holding a username and a password
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret in the namespace of the referencing resource
    pub name: String,
    /// Key holding the username
    #[serde(default = "default_user_field")]
    pub user_field: String,
    /// Key holding the password
    #[serde(default = "default_password_field")]
    pub password_field: String,
}

impl SecretReference {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_field: default_user_field(),
            password_field: default_password_field(),
        }
    }
}

/// Reference to a Secret holding an access token
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenSecretReference {
    /// Name of the Secret in the namespace of the referencing resource
    pub name: String,
    /// Key holding the token
    #[serde(default = "default_token_field")]
    pub token_field: String,
}

impl TokenSecretReference {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token_field: default_token_field(),
        }
    }
}

/// Kubernetes-style label selector
///
/// An absent or empty selector selects everything.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// Selector with only `matchLabels`
    #[must_use]
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            match_expressions: Vec::new(),
        }
    }
}

/// Set-based selector requirement
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    /// One of `In`, `NotIn`, `Exists`, `DoesNotExist`
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

pub fn default_user_field() -> String {
    DEFAULT_USER_FIELD.to_string()
}

pub fn default_password_field() -> String {
    DEFAULT_PASSWORD_FIELD.to_string()
}

pub fn default_token_field() -> String {
    DEFAULT_TOKEN_FIELD.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_reference_field_defaults() {
        let reference: SecretReference =
            serde_json::from_value(serde_json::json!({"name": "root"})).unwrap();
        assert_eq!(reference.user_field, "username");
        assert_eq!(reference.password_field, "password");

        let token: TokenSecretReference =
            serde_json::from_value(serde_json::json!({"name": "sdk"})).unwrap();
        assert_eq!(token.token_field, "token");
    }

    #[test]
    fn test_label_selector_deserializes_expressions() {
        let selector: LabelSelector = serde_json::from_value(serde_json::json!({
            "matchLabels": {"team": "web"},
            "matchExpressions": [{"key": "tier", "operator": "In", "values": ["a", "b"]}]
        }))
        .unwrap();
        assert_eq!(selector.match_labels.get("team").map(String::as_str), Some("web"));
        assert_eq!(selector.match_expressions[0].values, vec!["a", "b"]);
    }
}
