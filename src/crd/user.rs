//! # GrowthbookUser

use crate::crd::SecretReference;
use serde::{Deserialize, Serialize};

/// A GrowthBook user account
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "GrowthbookUser",
    group = "growthbook.infra.doodle.com",
    version = "v1beta1",
    namespaced,
    shortname = "gbu"
)]
#[serde(rename_all = "camelCase")]
pub struct GrowthbookUserSpec {
    /// Store ID; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name; defaults to the resource name, overridden by the secret's username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    /// Credentials of the account. The password is hashed before it reaches the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretReference>,
}
