//! # Watch Mappers
//!
//! Reverse indexes from a changed child resource or Secret to the Instances
//! that have to reconcile again. They run over reflector snapshots and do
//! not touch the API server.

use crate::controller::reconciler::selector;
use crate::crd::{GrowthbookClient, GrowthbookInstance, GrowthbookUser};
use k8s_openapi::api::core::v1::Secret;
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;

fn reference(instance: &GrowthbookInstance) -> ObjectRef<GrowthbookInstance> {
    ObjectRef::new(&instance.name_any()).within(&instance.namespace().unwrap_or_default())
}

fn same_namespace<A: Resource, B: Resource>(a: &A, b: &B) -> bool {
    a.meta().namespace == b.meta().namespace
}

fn selects<K: Resource>(instance: &GrowthbookInstance, object: &K) -> bool {
    same_namespace(instance, object)
        && selector::matches(
            object.meta().labels.as_ref(),
            instance.spec.resource_selector.as_ref(),
        )
}

/// Instances in the namespace of `object` whose selector matches its labels
#[must_use]
pub fn instances_selecting<K: Resource>(
    instances: &[Arc<GrowthbookInstance>],
    object: &K,
) -> Vec<ObjectRef<GrowthbookInstance>> {
    instances
        .iter()
        .map(|instance| &**instance)
        .filter(|instance| selects(instance, object))
        .map(reference)
        .collect()
}

/// Instances that read `secret`: as their root secret, or through a
/// selected User's credentials or a selected Client's token
#[must_use]
pub fn instances_referencing_secret(
    instances: &[Arc<GrowthbookInstance>],
    users: &[Arc<GrowthbookUser>],
    clients: &[Arc<GrowthbookClient>],
    secret: &Secret,
) -> Vec<ObjectRef<GrowthbookInstance>> {
    let name = secret.name_any();
    instances
        .iter()
        .map(|instance| &**instance)
        .filter(|instance| same_namespace(*instance, secret))
        .filter(|instance| {
            let root = instance
                .spec
                .mongodb
                .root_secret
                .as_ref()
                .is_some_and(|r| r.name == name);
            let user = users.iter().any(|user| {
                selects(instance, &**user)
                    && user.spec.secret.as_ref().is_some_and(|r| r.name == name)
            });
            let client = clients.iter().any(|client| {
                selects(instance, &**client)
                    && client
                        .spec
                        .token_secret
                        .as_ref()
                        .is_some_and(|r| r.name == name)
            });
            root || user || client
        })
        .map(reference)
        .collect()
}
