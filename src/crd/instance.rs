//! # GrowthbookInstance
//!
//! Root of the resource hierarchy: one GrowthBook MongoDB store plus the label
//! selector that decides which child resources it manages.

use crate::constants::DEFAULT_INSTANCE_TIMEOUT;
use crate::crd::{LabelSelector, SecretReference};
use serde::{Deserialize, Serialize};

/// GrowthbookInstance Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: growthbook.infra.doodle.com/v1beta1
/// kind: GrowthbookInstance
/// metadata:
///   name: growthbook
///   namespace: growthbook
/// spec:
///   interval: 5m
///   prune: true
///   mongodb:
///     uri: mongodb://mongodb:27017/growthbook
///     rootSecret:
///       name: mongodb-root
///   resourceSelector:
///     matchLabels:
///       growthbook.infra.doodle.com/instance: growthbook
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "GrowthbookInstance",
    group = "growthbook.infra.doodle.com",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::GrowthbookInstanceStatus",
    shortname = "gbi",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Status", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].message"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GrowthbookInstanceSpec {
    /// Connection to the GrowthBook document store
    pub mongodb: MongoDbConfig,
    /// Periodic reconcile interval, e.g. `5m`, at most one year. Event-driven
    /// only when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Deadline for one reconcile pass
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Skip reconciliation entirely while true
    #[serde(default)]
    pub suspend: bool,
    /// Delete the store documents of child resources being deleted, and of
    /// every child when the Instance itself is deleted. Otherwise those
    /// documents are left in place.
    pub prune: bool,
    /// Label selector for the child resources this Instance manages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<LabelSelector>,
}

/// MongoDB connection settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongoDbConfig {
    /// Connection URI. The database is taken from the URI path.
    pub uri: String,
    /// Secret holding the store credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_secret: Option<SecretReference>,
}

fn default_timeout() -> String {
    DEFAULT_INSTANCE_TIMEOUT.to_string()
}

impl GrowthbookInstance {
    /// Whether the Instance is marked for deletion
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Finalizer this Instance places on the children it manages
    #[must_use]
    pub fn child_finalizer(&self) -> String {
        format!(
            "{}/{}.{}",
            crate::constants::FINALIZER,
            self.metadata.name.as_deref().unwrap_or_default(),
            self.metadata.namespace.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec: GrowthbookInstanceSpec = serde_json::from_value(serde_json::json!({
            "mongodb": {"uri": "mongodb://localhost:27017/growthbook"},
            "prune": true
        }))
        .unwrap();
        assert_eq!(spec.timeout, "5m");
        assert!(!spec.suspend);
        assert!(spec.interval.is_none());
        assert!(spec.resource_selector.is_none());
    }

    #[test]
    fn test_child_finalizer_names_instance() {
        let mut instance = GrowthbookInstance::new(
            "growthbook",
            serde_json::from_value(serde_json::json!({
                "mongodb": {"uri": "mongodb://localhost:27017/growthbook"},
                "prune": false
            }))
            .unwrap(),
        );
        instance.metadata.namespace = Some("flags".to_string());
        assert_eq!(
            instance.child_finalizer(),
            "finalizers.growthbook.infra.doodle.com/growthbook.flags"
        );
    }
}
