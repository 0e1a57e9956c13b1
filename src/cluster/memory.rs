//! # In-Memory Cluster
//!
//! [`Cluster`] over a process-local object map, mimicking the API server
//! behaviors the reconciler relies on: resource versions with optimistic
//! concurrency, generation bumps on spec changes, and deferred deletion of
//! objects that still carry finalizers.

use crate::cluster::{Cluster, ManagedResource};
use crate::controller::reconciler::selector::Selector;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{GrowthbookInstance, GrowthbookInstanceStatus};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::Resource;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

const DELETION_TIMESTAMP: &str = "2024-01-01T00:00:00Z";

type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
struct ClusterState {
    objects: BTreeMap<ObjectKey, Value>,
    resource_version: u64,
}

impl ClusterState {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }
}

#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<ClusterState>,
}

fn key<K: ManagedResource>(namespace: &str, name: &str) -> ObjectKey {
    (
        K::kind(&()).into_owned(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn decode<K: ManagedResource>(value: &Value) -> Result<K, ReconcilerError> {
    serde_json::from_value(value.clone()).map_err(|e| {
        ReconcilerError::ReconciliationFailed(anyhow::anyhow!(
            "failed to decode {}: {e}",
            K::kind(&())
        ))
    })
}

fn finalizers_of(value: &Value) -> Vec<String> {
    value["metadata"]["finalizers"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn is_deleting(value: &Value) -> bool {
    !value["metadata"]["deletionTimestamp"].is_null()
}

impl MemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Create or replace an object. A changed spec bumps the generation; an
    /// object without status, finalizers or deletion mark keeps the stored
    /// ones.
    ///
    /// # Panics
    ///
    /// Panics if the object has no name or cannot be serialized.
    pub fn apply<K: ManagedResource>(&self, object: &K) {
        let meta = object.meta();
        let name = meta.name.clone().expect("object must have a name");
        let namespace = meta.namespace.clone().unwrap_or_else(|| "default".to_string());
        let mut value = serde_json::to_value(object).expect("object must serialize");

        let mut state = self.state();
        let object_key = key::<K>(&namespace, &name);
        let generation = match state.objects.get(&object_key) {
            Some(existing) => {
                let current = existing["metadata"]["generation"].as_i64().unwrap_or(1);
                if value["status"].is_null() && !existing["status"].is_null() {
                    value["status"] = existing["status"].clone();
                }
                for field in ["finalizers", "deletionTimestamp"] {
                    if value["metadata"][field].is_null() && !existing["metadata"][field].is_null() {
                        value["metadata"][field] = existing["metadata"][field].clone();
                    }
                }
                if existing["spec"] == value["spec"] {
                    current
                } else {
                    current + 1
                }
            }
            None => meta.generation.unwrap_or(1),
        };
        value["metadata"]["namespace"] = Value::String(namespace);
        value["metadata"]["generation"] = Value::from(generation);
        value["metadata"]["resourceVersion"] = Value::String(state.next_version());
        state.objects.insert(object_key, value);
    }

    /// Store a Secret with the given string data
    pub fn apply_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Secret::default()
        };
        self.apply(&secret);
    }

    /// Mark an object for deletion. Without finalizers it is removed at once.
    pub fn delete<K: ManagedResource>(&self, namespace: &str, name: &str) {
        let mut state = self.state();
        let object_key = key::<K>(namespace, name);
        let Some(mut value) = state.objects.remove(&object_key) else {
            return;
        };
        if finalizers_of(&value).is_empty() {
            return;
        }
        value["metadata"]["deletionTimestamp"] = Value::String(DELETION_TIMESTAMP.to_string());
        value["metadata"]["resourceVersion"] = Value::String(state.next_version());
        state.objects.insert(object_key, value);
    }

    /// Current state of an object
    #[must_use]
    pub fn object<K: ManagedResource>(&self, namespace: &str, name: &str) -> Option<K> {
        self.state()
            .objects
            .get(&key::<K>(namespace, name))
            .and_then(|value| decode(value).ok())
    }

    /// Current finalizers of an object, empty if it does not exist
    #[must_use]
    pub fn finalizers<K: ManagedResource>(&self, namespace: &str, name: &str) -> Vec<String> {
        self.state()
            .objects
            .get(&key::<K>(namespace, name))
            .map(finalizers_of)
            .unwrap_or_default()
    }

    /// Status of an Instance
    #[must_use]
    pub fn instance_status(&self, namespace: &str, name: &str) -> Option<GrowthbookInstanceStatus> {
        self.object::<GrowthbookInstance>(namespace, name)
            .and_then(|instance| instance.status)
    }

    fn update<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        mutate: impl FnOnce(&mut Value),
    ) -> Result<(), ReconcilerError> {
        let mut state = self.state();
        let object_key = key::<K>(namespace, name);
        let Some(value) = state.objects.get_mut(&object_key) else {
            return Err(ReconcilerError::NotFound {
                kind: K::kind(&()).into_owned(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };
        if let Some(expected) = resource_version {
            if value["metadata"]["resourceVersion"].as_str() != Some(expected) {
                return Err(ReconcilerError::Conflict {
                    kind: K::kind(&()).into_owned(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                });
            }
        }
        mutate(value);
        let finalized = is_deleting(value) && finalizers_of(value).is_empty();
        if finalized {
            state.objects.remove(&object_key);
        } else {
            let version = state.next_version();
            if let Some(value) = state.objects.get_mut(&object_key) {
                value["metadata"]["resourceVersion"] = Value::String(version);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, ReconcilerError> {
        self.state()
            .objects
            .get(&key::<K>(namespace, name))
            .map(decode)
            .transpose()
    }

    async fn list<K: ManagedResource>(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<K>, ReconcilerError> {
        let kind = K::kind(&()).into_owned();
        let state = self.state();
        let mut items = Vec::new();
        for ((object_kind, object_namespace, _), value) in &state.objects {
            if *object_kind != kind || object_namespace != namespace {
                continue;
            }
            let item: K = decode(value)?;
            let labels = item.meta().labels.clone().unwrap_or_default();
            if selector.matches(&labels) {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn replace_finalizers<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), ReconcilerError> {
        self.update::<K>(namespace, name, resource_version.as_deref(), |value| {
            value["metadata"]["finalizers"] = Value::from(finalizers);
        })
    }

    async fn patch_instance_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GrowthbookInstanceStatus,
        resource_version: Option<String>,
    ) -> Result<(), ReconcilerError> {
        let status = serde_json::to_value(status)
            .map_err(|e| ReconcilerError::ReconciliationFailed(e.into()))?;
        self.update::<GrowthbookInstance>(namespace, name, resource_version.as_deref(), |value| {
            value["status"] = status;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GrowthbookUser, GrowthbookUserSpec, LabelSelector};

    fn user(name: &str, labels: &[(&str, &str)]) -> GrowthbookUser {
        let mut user = GrowthbookUser::new(
            name,
            GrowthbookUserSpec {
                email: format!("{name}@example.com"),
                ..GrowthbookUserSpec::default()
            },
        );
        user.metadata.namespace = Some("ns".to_string());
        user.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        user
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace_and_selector() {
        let cluster = MemoryCluster::new();
        cluster.apply(&user("a", &[("team", "web")]));
        cluster.apply(&user("b", &[("team", "data")]));
        let mut other = user("c", &[("team", "web")]);
        other.metadata.namespace = Some("other".to_string());
        cluster.apply(&other);

        let selector =
            Selector::parse(Some(&LabelSelector::from_labels([("team", "web")]))).unwrap();
        let users: Vec<GrowthbookUser> = cluster.list("ns", &selector).await.unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].metadata.name.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let cluster = MemoryCluster::new();
        cluster.apply(&user("a", &[]));
        let stale: GrowthbookUser = cluster.get("ns", "a").await.unwrap().unwrap();
        cluster.apply(&user("a", &[("changed", "yes")]));

        let result = cluster
            .replace_finalizers::<GrowthbookUser>(
                "ns",
                "a",
                vec!["f".to_string()],
                stale.metadata.resource_version,
            )
            .await;

        assert!(matches!(result, Err(ReconcilerError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_deleting_object_is_removed_once_finalizers_are_gone() {
        let cluster = MemoryCluster::new();
        cluster.apply(&user("a", &[]));
        cluster
            .replace_finalizers::<GrowthbookUser>("ns", "a", vec!["f".to_string()], None)
            .await
            .unwrap();

        cluster.delete::<GrowthbookUser>("ns", "a");
        let deleting: GrowthbookUser = cluster.get("ns", "a").await.unwrap().unwrap();
        assert!(deleting.metadata.deletion_timestamp.is_some());

        cluster
            .replace_finalizers::<GrowthbookUser>("ns", "a", Vec::new(), None)
            .await
            .unwrap();
        assert!(cluster.object::<GrowthbookUser>("ns", "a").is_none());
    }

    #[test]
    fn test_spec_change_bumps_generation() {
        let cluster = MemoryCluster::new();
        cluster.apply(&user("a", &[]));
        cluster.apply(&user("a", &[("label", "only")]));
        let unchanged = cluster.object::<GrowthbookUser>("ns", "a").unwrap();
        assert_eq!(unchanged.metadata.generation, Some(1));

        let mut changed = user("a", &[]);
        changed.spec.email = "new@example.com".to_string();
        cluster.apply(&changed);
        let bumped = cluster.object::<GrowthbookUser>("ns", "a").unwrap();
        assert_eq!(bumped.metadata.generation, Some(2));
    }
}
