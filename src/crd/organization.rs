//! # GrowthbookOrganization

use crate::crd::LabelSelector;
use serde::{Deserialize, Serialize};

/// A GrowthBook organization. Members are the Users matched by `users`
/// bindings, features and clients are those matched by `resourceSelector`.
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "GrowthbookOrganization",
    group = "growthbook.infra.doodle.com",
    version = "v1beta1",
    namespaced,
    shortname = "gbo"
)]
#[serde(rename_all = "camelCase")]
pub struct GrowthbookOrganizationSpec {
    /// Store ID; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub owner_email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserBinding>,
    /// Selects the features and clients of this organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<LabelSelector>,
}

/// Grants `role` to every User matched by `selector`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    pub role: String,
}
