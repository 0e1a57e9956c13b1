//! # GrowthbookClient
//!
//! An SDK connection: the access key an application uses to fetch feature
//! payloads for one environment.

use crate::crd::TokenSecretReference;
use serde::{Deserialize, Serialize};

#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "GrowthbookClient",
    group = "growthbook.infra.doodle.com",
    version = "v1beta1",
    namespaced,
    shortname = "gbc"
)]
#[serde(rename_all = "camelCase")]
pub struct GrowthbookClientSpec {
    /// Store ID; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub encrypt_payload: bool,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub include_visual_experiments: bool,
    #[serde(default)]
    pub include_draft_experiments: bool,
    #[serde(default)]
    pub include_experiment_names: bool,
    /// Secret holding the SDK access key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<TokenSecretReference>,
}
