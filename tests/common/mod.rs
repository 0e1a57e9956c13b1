//! Common test utilities for reconciliation tests
//!
//! Builds GrowthBook resources in one namespace and runs reconcile passes
//! against an in-memory cluster and store.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use growthbook_controller::cluster::MemoryCluster;
use growthbook_controller::config::ControllerConfig;
use growthbook_controller::controller::reconciler::{
    reconcile, Reconciler, ReconcilerError, TriggerSource,
};
use growthbook_controller::crd::{
    GrowthbookClient, GrowthbookClientSpec, GrowthbookFeature, GrowthbookFeatureSpec,
    GrowthbookInstance, GrowthbookInstanceSpec, GrowthbookOrganization,
    GrowthbookOrganizationSpec, GrowthbookUser, GrowthbookUserSpec, LabelSelector,
    MongoDbConfig, SecretReference, TokenSecretReference, UserBinding,
};
use growthbook_controller::observability::events::{RecordedEvent, RecordingEventPublisher};
use growthbook_controller::storage::{MemoryDatabase, MemoryDatabaseProvider};
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;

pub const NAMESPACE: &str = "growthbook";
pub const INSTANCE: &str = "growthbook";
pub const ROOT_SECRET: &str = "mongodb-root";
pub const INSTANCE_LABEL: &str = "growthbook.infra.doodle.com/instance";
pub const ORG_LABEL: &str = "growthbook.infra.doodle.com/organization";

/// Reconciler over an in-memory cluster and store
pub struct Harness {
    pub reconciler: Arc<Reconciler<MemoryCluster>>,
    pub database: MemoryDatabase,
    pub events: RecordingEventPublisher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_provider(MemoryDatabaseProvider::default())
    }

    pub fn with_provider(provider: MemoryDatabaseProvider) -> Self {
        let database = provider.database().clone();
        let events = RecordingEventPublisher::new();
        let reconciler = Reconciler::new(
            MemoryCluster::new(),
            Arc::new(provider),
            Arc::new(ControllerConfig::default()),
        )
        .with_events(Arc::new(events.clone()));
        Self {
            reconciler: Arc::new(reconciler),
            database,
            events,
        }
    }

    pub fn cluster(&self) -> &MemoryCluster {
        &self.reconciler.cluster
    }

    /// Store the root Secret and the Instance
    pub fn with_instance(self, instance: &GrowthbookInstance) -> Self {
        self.cluster()
            .apply_secret(NAMESPACE, ROOT_SECRET, &[("username", "root"), ("password", "pw")]);
        self.cluster().apply(instance);
        self
    }

    /// One reconcile pass over the Instance named [`INSTANCE`]
    pub async fn reconcile(&self) -> Result<Action, ReconcilerError> {
        let instance = self
            .cluster()
            .object::<GrowthbookInstance>(NAMESPACE, INSTANCE)
            .unwrap_or_else(|| instance(false));
        reconcile(
            Arc::new(instance),
            Arc::clone(&self.reconciler),
            TriggerSource::SpecChange,
        )
        .await
    }

    /// Events published on the Instance, oldest first
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.events()
    }

    pub fn instance(&self) -> GrowthbookInstance {
        self.cluster()
            .object(NAMESPACE, INSTANCE)
            .expect("instance should exist")
    }

    /// Ready condition of the Instance as `(status, reason, message)`
    pub fn ready(&self) -> (String, String, String) {
        let status = self
            .cluster()
            .instance_status(NAMESPACE, INSTANCE)
            .expect("instance should have a status");
        let ready = status
            .conditions
            .iter()
            .find(|c| c.r#type == "Ready")
            .expect("Ready condition should be set");
        (
            ready.status.clone(),
            ready.reason.clone().unwrap_or_default(),
            ready.message.clone().unwrap_or_default(),
        )
    }
}

fn placed<K: Resource>(mut object: K, labels: &[(&str, &str)]) -> K {
    let meta = object.meta_mut();
    meta.namespace = Some(NAMESPACE.to_string());
    meta.labels = Some(
        labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    );
    object
}

/// Instance selecting everything labelled with [`INSTANCE_LABEL`]
pub fn instance(prune: bool) -> GrowthbookInstance {
    placed(
        GrowthbookInstance::new(
            INSTANCE,
            GrowthbookInstanceSpec {
                mongodb: MongoDbConfig {
                    uri: "mongodb://mongodb:27017/growthbook".to_string(),
                    root_secret: Some(SecretReference::new(ROOT_SECRET)),
                },
                interval: None,
                timeout: "5m".to_string(),
                suspend: false,
                prune,
                resource_selector: Some(LabelSelector::from_labels([(INSTANCE_LABEL, INSTANCE)])),
            },
        ),
        &[],
    )
}

/// Organization selecting the features and clients labelled with its name
pub fn organization(name: &str) -> GrowthbookOrganization {
    placed(
        GrowthbookOrganization::new(
            name,
            GrowthbookOrganizationSpec {
                owner_email: "owner@example.com".to_string(),
                resource_selector: Some(LabelSelector::from_labels([(ORG_LABEL, name)])),
                ..GrowthbookOrganizationSpec::default()
            },
        ),
        &[(INSTANCE_LABEL, INSTANCE)],
    )
}

/// Organization binding every selected user to `role`
pub fn organization_with_members(name: &str, role: &str) -> GrowthbookOrganization {
    let mut organization = organization(name);
    organization.spec.users = vec![UserBinding {
        selector: Some(LabelSelector::from_labels([(INSTANCE_LABEL, INSTANCE)])),
        role: role.to_string(),
    }];
    organization
}

pub fn feature(name: &str, organization: &str) -> GrowthbookFeature {
    placed(
        GrowthbookFeature::new(
            name,
            GrowthbookFeatureSpec {
                description: format!("{name} flag"),
                default_value: "false".to_string(),
                ..GrowthbookFeatureSpec::default()
            },
        ),
        &[(INSTANCE_LABEL, INSTANCE), (ORG_LABEL, organization)],
    )
}

/// Client reading its token from the Secret `<name>-token`
pub fn client(name: &str, organization: &str) -> GrowthbookClient {
    placed(
        GrowthbookClient::new(
            name,
            GrowthbookClientSpec {
                environment: "production".to_string(),
                languages: vec!["javascript".to_string()],
                token_secret: Some(TokenSecretReference::new(format!("{name}-token"))),
                ..GrowthbookClientSpec::default()
            },
        ),
        &[(INSTANCE_LABEL, INSTANCE), (ORG_LABEL, organization)],
    )
}

pub fn user(name: &str) -> GrowthbookUser {
    placed(
        GrowthbookUser::new(
            name,
            GrowthbookUserSpec {
                email: format!("{name}@example.com"),
                ..GrowthbookUserSpec::default()
            },
        ),
        &[(INSTANCE_LABEL, INSTANCE)],
    )
}
