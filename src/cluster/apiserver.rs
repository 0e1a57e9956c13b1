//! # API Server Adapter

use crate::cluster::{Cluster, ManagedResource};
use crate::controller::reconciler::selector::Selector;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{GrowthbookInstance, GrowthbookInstanceStatus};
use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::{json, Value};

const FIELD_MANAGER: &str = "growthbook-controller";

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn metadata_patch(resource_version: Option<String>, extra: Value) -> Value {
    let mut patch = json!({ "metadata": {} });
    if let Some(version) = resource_version {
        patch["metadata"]["resourceVersion"] = Value::String(version);
    }
    if let (Value::Object(target), Value::Object(fields)) = (&mut patch, extra) {
        for (key, value) in fields {
            if key == "metadata" {
                if let (Some(Value::Object(meta)), Value::Object(extra_meta)) =
                    (target.get_mut("metadata"), value)
                {
                    meta.extend(extra_meta);
                }
            } else {
                target.insert(key, value);
            }
        }
    }
    patch
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, ReconcilerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list<K: ManagedResource>(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<K>, ReconcilerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let query = selector.to_query();
        let params = if query.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&query)
        };
        Ok(api.list(&params).await?.items)
    }

    async fn replace_finalizers<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), ReconcilerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let patch = metadata_patch(
            resource_version,
            json!({ "metadata": { "finalizers": finalizers } }),
        );
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_instance_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GrowthbookInstanceStatus,
        resource_version: Option<String>,
    ) -> Result<(), ReconcilerError> {
        let api: Api<GrowthbookInstance> = Api::namespaced(self.client.clone(), namespace);
        let patch = metadata_patch(resource_version, json!({ "status": status }));
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
