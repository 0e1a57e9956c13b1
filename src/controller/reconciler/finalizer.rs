//! # Finalizers
//!
//! Adds and removes finalizer tokens. Each write re-reads the object and
//! sends its resource version, so a concurrent change fails the write
//! instead of being overwritten; the next reconcile retries.

use crate::cluster::{Cluster, ManagedResource};
use crate::controller::reconciler::ReconcilerError;
use kube::Resource;
use tracing::debug;

/// Whether `resource` carries `token`
#[must_use]
pub fn has_finalizer<K: Resource>(resource: &K, token: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == token))
}

/// Whether `resource` is marked for deletion
#[must_use]
pub fn is_deleting<K: Resource>(resource: &K) -> bool {
    resource.meta().deletion_timestamp.is_some()
}

fn identity<K: Resource>(resource: &K) -> (String, String) {
    let meta = resource.meta();
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

/// Add `token` unless the object is being deleted or already carries it
pub async fn ensure<C, K>(cluster: &C, token: &str, resource: &K) -> Result<(), ReconcilerError>
where
    C: Cluster,
    K: ManagedResource,
{
    if is_deleting(resource) || has_finalizer(resource, token) {
        return Ok(());
    }
    let (namespace, name) = identity(resource);
    let Some(latest) = cluster.get::<K>(&namespace, &name).await? else {
        return Ok(());
    };
    if is_deleting(&latest) || has_finalizer(&latest, token) {
        return Ok(());
    }

    let mut finalizers = latest.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(token.to_string());
    debug!(
        resource.kind = %K::kind(&()),
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        finalizer = token,
        "finalizer.added"
    );
    cluster
        .replace_finalizers::<K>(
            &namespace,
            &name,
            finalizers,
            latest.meta().resource_version.clone(),
        )
        .await
}

/// Remove `token` if present
pub async fn release<C, K>(cluster: &C, token: &str, resource: &K) -> Result<(), ReconcilerError>
where
    C: Cluster,
    K: ManagedResource,
{
    let (namespace, name) = identity(resource);
    let Some(latest) = cluster.get::<K>(&namespace, &name).await? else {
        return Ok(());
    };
    if !has_finalizer(&latest, token) {
        return Ok(());
    }

    let finalizers = latest
        .meta()
        .finalizers
        .iter()
        .flatten()
        .filter(|f| *f != token)
        .cloned()
        .collect();
    debug!(
        resource.kind = %K::kind(&()),
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        finalizer = token,
        "finalizer.released"
    );
    cluster
        .replace_finalizers::<K>(
            &namespace,
            &name,
            finalizers,
            latest.meta().resource_version.clone(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::crd::{GrowthbookFeature, GrowthbookFeatureSpec};

    const TOKEN: &str = "finalizers.growthbook.infra.doodle.com/gb.ns";

    fn feature() -> GrowthbookFeature {
        let mut feature = GrowthbookFeature::new("flag", GrowthbookFeatureSpec::default());
        feature.metadata.namespace = Some("ns".to_string());
        feature.metadata.finalizers = Some(vec!["other".to_string()]);
        feature
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent_and_keeps_foreign_tokens() {
        let cluster = MemoryCluster::new();
        cluster.apply(&feature());

        ensure(&cluster, TOKEN, &feature()).await.unwrap();
        let latest: GrowthbookFeature = cluster.object("ns", "flag").unwrap();
        ensure(&cluster, TOKEN, &latest).await.unwrap();

        assert_eq!(
            cluster.finalizers::<GrowthbookFeature>("ns", "flag"),
            vec!["other".to_string(), TOKEN.to_string()]
        );
    }

    #[tokio::test]
    async fn test_ensure_skips_deleting_objects() {
        let cluster = MemoryCluster::new();
        cluster.apply(&feature());
        cluster.delete::<GrowthbookFeature>("ns", "flag");
        let deleting: GrowthbookFeature = cluster.object("ns", "flag").unwrap();

        ensure(&cluster, TOKEN, &deleting).await.unwrap();

        assert!(!has_finalizer(&cluster.object::<GrowthbookFeature>("ns", "flag").unwrap(), TOKEN));
    }

    #[tokio::test]
    async fn test_release_removes_only_its_token() {
        let cluster = MemoryCluster::new();
        cluster.apply(&feature());
        ensure(&cluster, TOKEN, &feature()).await.unwrap();

        release(&cluster, TOKEN, &feature()).await.unwrap();
        release(&cluster, TOKEN, &feature()).await.unwrap();

        assert_eq!(
            cluster.finalizers::<GrowthbookFeature>("ns", "flag"),
            vec!["other".to_string()]
        );
    }

    #[tokio::test]
    async fn test_release_of_missing_object_is_a_no_op() {
        let cluster = MemoryCluster::new();
        assert!(release(&cluster, TOKEN, &feature()).await.is_ok());
    }
}
