//! # Reconciliation Logic
//!
//! One pass over a `GrowthbookInstance`: ensure the Instance finalizer, open
//! the store, converge Users, then Organizations, then the Features and
//! Clients of every Organization, close the store and report the outcome in
//! the Instance status and as an Event.
//!
//! The pass is bounded by `spec.timeout`. The deadline is computed once and
//! applied around every cluster and store call, so an expired deadline
//! surfaces as [`ReconcilerError::Timeout`] like any other failure. Steps run
//! sequentially and the first failing step aborts the pass; catalog entries
//! recorded up to that point are still reported.

mod clients;
mod features;
mod organizations;
mod users;

use crate::cluster::{Cluster, ManagedResource};
use crate::constants::{FINALIZER, MAX_RECONCILE_INTERVAL, READY_MESSAGE};
use crate::controller::reconciler::catalog::ResourceCatalog;
use crate::controller::reconciler::credentials::resolve_store_credentials;
use crate::controller::reconciler::duration::{format_duration, parse_duration};
use crate::controller::reconciler::finalizer;
use crate::controller::reconciler::selector::Selector;
use crate::controller::reconciler::status::{self, ConditionReason};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError, TriggerSource};
use crate::crd::GrowthbookInstance;
use crate::growthbook::{self, StoreEntity};
use crate::observability::events::actions;
use crate::observability::metrics;
use crate::storage::Database;
use chrono::Utc;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::events::EventType;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main reconciliation function.
///
/// Errors are returned after the failure has been written to the Instance
/// status; retry pacing belongs to the error policy.
pub async fn reconcile<C: Cluster>(
    instance: Arc<GrowthbookInstance>,
    ctx: Arc<Reconciler<C>>,
    trigger: TriggerSource,
) -> Result<Action, ReconcilerError> {
    let name = instance.name_any();
    let namespace = instance.namespace().unwrap_or_default();
    let key = format!("{namespace}/{name}");

    info!(trigger = trigger.as_str(), "🔄 reconcile.started");
    metrics::increment_reconciliations(trigger.as_str());

    let Some(latest) = ctx.cluster.get::<GrowthbookInstance>(&namespace, &name).await? else {
        debug!("instance no longer exists");
        ctx.triggers.forget(&key);
        metrics::forget_managed_resources(&key);
        return Ok(Action::await_change());
    };

    if latest.spec.suspend {
        info!("⏸️ reconcile.suspended");
        ctx.triggers.unschedule(&key);
        return Ok(Action::await_change());
    }

    finalizer::ensure(&ctx.cluster, FINALIZER, &latest).await?;

    let started = std::time::Instant::now();
    let mut catalog = ResourceCatalog::new();
    let outcome = run_pass(&ctx, &latest, &mut catalog).await;
    let elapsed = started.elapsed();
    metrics::observe_reconciliation_duration(elapsed.as_secs_f64());

    if outcome.is_ok() && latest.is_deleting() {
        finalizer::release(&ctx.cluster, FINALIZER, &latest).await?;
        ctx.triggers.forget(&key);
        metrics::forget_managed_resources(&key);
        info!(duration = %format_duration(elapsed), "🗑️ reconcile.finalized");
        return Ok(Action::await_change());
    }

    let managed = catalog.len();
    let status = status::compose(
        &latest,
        outcome.as_ref().map(|_| ()),
        catalog.into_entries(),
        elapsed,
        Utc::now(),
    );
    publish_outcome(&ctx, &latest, outcome.as_ref().map(|_| ())).await;

    // Patch against the latest version; finalizer writes moved it forward
    let Some(current) = ctx.cluster.get::<GrowthbookInstance>(&namespace, &name).await? else {
        ctx.triggers.forget(&key);
        metrics::forget_managed_resources(&key);
        return Ok(Action::await_change());
    };
    ctx.cluster
        .patch_instance_status(
            &namespace,
            &name,
            &status,
            current.metadata.resource_version.clone(),
        )
        .await?;
    metrics::set_managed_resources(&key, i64::try_from(managed).unwrap_or(i64::MAX));

    let interval = outcome?;
    ctx.reset_backoff(&key);
    info!(
        duration = %format_duration(elapsed),
        resources = managed,
        "✅ reconcile.succeeded"
    );

    match interval {
        Some(interval) => {
            ctx.triggers
                .schedule(&key, interval, TriggerSource::TimerBased);
            metrics::increment_requeues("interval");
            Ok(Action::requeue(interval))
        }
        None => {
            ctx.triggers.unschedule(&key);
            Ok(Action::await_change())
        }
    }
}

/// Record the outcome of a pass as an Event on the Instance
async fn publish_outcome<C: Cluster>(
    ctx: &Reconciler<C>,
    instance: &GrowthbookInstance,
    outcome: Result<(), &ReconcilerError>,
) {
    let (type_, reason, note) = match outcome {
        Ok(()) => (EventType::Normal, ConditionReason::Synchronized, READY_MESSAGE.to_string()),
        Err(e) => (EventType::Warning, ConditionReason::Failed, e.to_string()),
    };
    ctx.events
        .publish(
            &instance.object_ref(&()),
            type_,
            reason.as_str(),
            actions::RECONCILE,
            Some(note),
        )
        .await;
}

/// Converge all selected children of `instance` into the store. Returns the
/// periodic requeue interval on success.
async fn run_pass<C: Cluster>(
    ctx: &Reconciler<C>,
    instance: &GrowthbookInstance,
    catalog: &mut ResourceCatalog,
) -> Result<Option<Duration>, ReconcilerError> {
    let deadline = deadline(&instance.spec.timeout)?;
    let interval = instance
        .spec
        .interval
        .as_deref()
        .filter(|value| !value.is_empty())
        .map(requeue_interval)
        .transpose()?;
    let namespace = instance.namespace().unwrap_or_default();
    let selector = Selector::parse(instance.spec.resource_selector.as_ref())?;

    let credentials = match &instance.spec.mongodb.root_secret {
        Some(reference) => Some(
            within(
                deadline,
                resolve_store_credentials(&ctx.cluster, &namespace, reference),
            )
            .await?,
        ),
        None => None,
    };
    let database = within(deadline, async {
        ctx.database_provider
            .connect(&instance.spec.mongodb.uri, credentials)
            .await
            .map_err(ReconcilerError::from)
    })
    .await?;

    let scope = Scope {
        cluster: &ctx.cluster,
        database: database.as_ref(),
        instance,
        namespace: &namespace,
        finalizer: instance.child_finalizer(),
        selector,
    };
    let synced = within(deadline, sync_children(&scope, catalog)).await;

    match tokio::time::timeout(ctx.config.store_disconnect_timeout(), database.disconnect()).await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "failed to disconnect from store"),
        Err(_) => warn!("store disconnect timed out"),
    }

    synced.map(|()| interval)
}

async fn sync_children<C: Cluster>(
    scope: &Scope<'_, C>,
    catalog: &mut ResourceCatalog,
) -> Result<(), ReconcilerError> {
    users::reconcile_users(scope, catalog)
        .await
        .map_err(|e| e.during("users"))?;
    let organizations = organizations::reconcile_organizations(scope, catalog)
        .await
        .map_err(|e| e.during("organizations"))?;
    for organization in &organizations {
        features::reconcile_features(scope, catalog, organization)
            .await
            .map_err(|e| e.during("features"))?;
        clients::reconcile_clients(scope, catalog, organization)
            .await
            .map_err(|e| e.during("clients"))?;
    }
    Ok(())
}

/// Deadline of a pass; an empty timeout leaves the pass unbounded
fn deadline(timeout: &str) -> Result<Option<tokio::time::Instant>, ReconcilerError> {
    if timeout.is_empty() {
        return Ok(None);
    }
    let timeout_duration = parse_duration(timeout)?;
    tokio::time::Instant::now()
        .checked_add(timeout_duration)
        .map(Some)
        .ok_or_else(|| {
            ReconcilerError::InvalidDuration(format!("{timeout:?}: deadline out of range"))
        })
}

/// Periodic requeue of an Instance, bounded by [`MAX_RECONCILE_INTERVAL`]
fn requeue_interval(value: &str) -> Result<Duration, ReconcilerError> {
    let interval = parse_duration(value)?;
    if interval > MAX_RECONCILE_INTERVAL {
        return Err(ReconcilerError::InvalidDuration(format!(
            "{value:?}: interval exceeds {}",
            format_duration(MAX_RECONCILE_INTERVAL)
        )));
    }
    Ok(interval)
}

/// Run `future` until `deadline`
async fn within<T, F>(
    deadline: Option<tokio::time::Instant>,
    future: F,
) -> Result<T, ReconcilerError>
where
    F: Future<Output = Result<T, ReconcilerError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_elapsed| ReconcilerError::Timeout)?,
        None => future.await,
    }
}

/// What every child step of one pass shares
struct Scope<'a, C: Cluster> {
    cluster: &'a C,
    database: &'a dyn Database,
    instance: &'a GrowthbookInstance,
    namespace: &'a str,
    /// `<FINALIZER>/<instance>.<namespace>`
    finalizer: String,
    /// Parsed `spec.resourceSelector` of the Instance
    selector: Selector,
}

impl<C: Cluster> Scope<'_, C> {
    async fn list<K: ManagedResource>(&self, selector: &Selector) -> Result<Vec<K>, ReconcilerError> {
        self.cluster.list(self.namespace, selector).await
    }

    /// Put the child finalizer on every listed child and record the ones
    /// that are not being deleted. Nothing is claimed while the Instance
    /// itself is being deleted.
    async fn claim<K: ManagedResource>(
        &self,
        catalog: &mut ResourceCatalog,
        children: &[K],
    ) -> Result<(), ReconcilerError> {
        if self.instance.is_deleting() {
            return Ok(());
        }
        for child in children {
            finalizer::ensure(self.cluster, &self.finalizer, child).await?;
            if !finalizer::is_deleting(child) {
                catalog.record(child);
            }
        }
        Ok(())
    }

    /// Whether `child` should be converged rather than retired
    fn is_live<K: Resource>(&self, child: &K) -> bool {
        !self.instance.is_deleting() && !finalizer::is_deleting(child)
    }

    /// Stop managing `child`: delete its document when the Instance prunes,
    /// then release the child finalizer
    async fn retire<E: StoreEntity, K: ManagedResource>(
        &self,
        child: &K,
        id: &str,
    ) -> Result<(), ReconcilerError> {
        if self.instance.spec.prune {
            growthbook::delete::<E>(self.database, id).await?;
        } else {
            debug!(collection = E::COLLECTION, id, "store document orphaned");
        }
        finalizer::release(self.cluster, &self.finalizer, child).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_timeout_has_no_deadline() {
        assert!(deadline("").unwrap().is_none());
    }

    #[test]
    fn test_invalid_timeout_is_rejected() {
        assert!(matches!(
            deadline("soon"),
            Err(ReconcilerError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_unreachable_deadline_is_rejected() {
        assert!(matches!(
            deadline("5000000000000000h"),
            Err(ReconcilerError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_interval_is_bounded() {
        assert_eq!(requeue_interval("10m").unwrap(), Duration::from_secs(600));
        assert!(matches!(
            requeue_interval("5000000000000000h"),
            Err(ReconcilerError::InvalidDuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_turns_expiry_into_timeout() {
        let deadline = deadline("1s").unwrap();
        let result: Result<(), ReconcilerError> = within(deadline, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let error = result.unwrap_err();
        assert!(matches!(error, ReconcilerError::Timeout));
        assert_eq!(error.to_string(), "context deadline exceeded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_passes_through_results() {
        let deadline = deadline("1m").unwrap();
        let result = within(deadline, async { Ok::<_, ReconcilerError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
