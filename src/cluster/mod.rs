//! # Cluster Access
//!
//! The declarative object store the reconciler reads resources from and
//! writes finalizers and status to. [`KubeCluster`] is the API server
//! adapter, [`MemoryCluster`] an in-process implementation for tests.

mod apiserver;
pub mod memory;

use crate::controller::reconciler::selector::Selector;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::GrowthbookInstanceStatus;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub use self::apiserver::KubeCluster;
pub use self::memory::MemoryCluster;

/// Namespaced kinds the controller reads and patches
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

#[async_trait]
pub trait Cluster: Send + Sync + 'static {
    /// Fetch one object; `Ok(None)` when it does not exist
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, ReconcilerError>;

    /// All objects of a kind in `namespace` whose labels match `selector`
    async fn list<K: ManagedResource>(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<K>, ReconcilerError>;

    /// Replace the finalizer list. With `resource_version` set the write only
    /// succeeds if the object was not modified since that version.
    async fn replace_finalizers<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), ReconcilerError>;

    /// Write the status subresource of an Instance
    async fn patch_instance_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GrowthbookInstanceStatus,
        resource_version: Option<String>,
    ) -> Result<(), ReconcilerError>;
}
