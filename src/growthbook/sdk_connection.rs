//! # SDK Connections
//!
//! Encryption and proxy signing keys are generated once on insert and owned
//! by the store afterwards. Every write drops the cached payloads of the
//! connection's environment.

use crate::constants::{COLLECTION_SDK_CONNECTIONS, COLLECTION_SDK_PAYLOADS, SDK_KEY_PREFIX};
use crate::controller::reconciler::ReconcilerError;
use crate::crd::GrowthbookClient;
use crate::growthbook::keys::generate_key;
use crate::growthbook::{effective_id, StoreEntity};
use kube::ResourceExt;
use mongodb::bson::{doc, DateTime, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SdkConnection {
    pub id: String,
    pub key: String,
    pub languages: Vec<String>,
    pub name: String,
    pub environment: String,
    pub encrypt_payload: bool,
    pub encryption_key: String,
    pub organization: String,
    pub project: String,
    pub include_visual_experiments: bool,
    pub include_draft_experiments: bool,
    pub include_experiment_names: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<DateTime>,
    pub proxy: SdkConnectionProxy,
    #[serde(rename = "__v")]
    pub version: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SdkConnectionProxy {
    pub signing_key: String,
}

/// Access keys always carry the `sdk-` prefix
#[must_use]
pub fn access_key(token: &str) -> String {
    if token.starts_with(SDK_KEY_PREFIX) {
        token.to_string()
    } else {
        format!("{SDK_KEY_PREFIX}{token}")
    }
}

impl SdkConnection {
    /// Map a declared Client owned by `organization`, authenticated by `token`
    #[must_use]
    pub fn from_resource(client: &GrowthbookClient, organization: &str, token: &str) -> Self {
        let resource_name = client.name_any();
        Self {
            id: effective_id(client.spec.id.as_deref(), &resource_name),
            key: access_key(token),
            languages: client.spec.languages.clone(),
            name: effective_id(client.spec.name.as_deref(), &resource_name),
            environment: client.spec.environment.clone(),
            encrypt_payload: client.spec.encrypt_payload,
            organization: organization.to_string(),
            project: client.spec.project.clone(),
            include_visual_experiments: client.spec.include_visual_experiments,
            include_draft_experiments: client.spec.include_draft_experiments,
            include_experiment_names: client.spec.include_experiment_names,
            ..Self::default()
        }
    }
}

impl StoreEntity for SdkConnection {
    const COLLECTION: &'static str = COLLECTION_SDK_CONNECTIONS;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_into(&self, existing: &mut Self) -> Result<(), ReconcilerError> {
        existing.key.clone_from(&self.key);
        existing.languages.clone_from(&self.languages);
        existing.name.clone_from(&self.name);
        existing.environment.clone_from(&self.environment);
        existing.encrypt_payload = self.encrypt_payload;
        existing.organization.clone_from(&self.organization);
        existing.project.clone_from(&self.project);
        existing.include_visual_experiments = self.include_visual_experiments;
        existing.include_draft_experiments = self.include_draft_experiments;
        existing.include_experiment_names = self.include_experiment_names;
        Ok(())
    }

    fn prepare_insert(&mut self, now: DateTime) -> Result<(), ReconcilerError> {
        self.encryption_key = generate_key().map_err(anyhow::Error::from)?;
        self.proxy.signing_key = generate_key().map_err(anyhow::Error::from)?;
        self.date_created = Some(now);
        self.date_updated = Some(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime) {
        self.date_updated = Some(now);
    }

    fn invalidations(&self) -> Vec<(&'static str, Document)> {
        vec![(
            COLLECTION_SDK_PAYLOADS,
            doc! { "environment": self.environment.as_str(), "organization": self.organization.as_str() },
        )]
    }
}
