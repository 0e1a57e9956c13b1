//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::cluster::Cluster;
use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError, TriggerSource};
use crate::crd::GrowthbookInstance;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per Instance so one failing Instance does not
/// slow down the others. A successful pass resets it.
pub fn handle_reconciliation_error<C: Cluster>(
    obj: Arc<GrowthbookInstance>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<C>>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    observability::metrics::increment_reconciliation_errors();

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(resource_key.clone())
                .or_insert_with(|| BackoffState::new(&ctx.config));
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!(
                "Failed to lock backoff_states: {}, using maximum backoff",
                e
            );
            (ctx.config.backoff_max_secs, 0)
        }
    };

    let delay = Duration::from_secs(backoff_seconds);
    ctx.triggers
        .schedule(&resource_key, delay, TriggerSource::ErrorBackoff);

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, trigger source: error-backoff)",
        backoff_seconds, error_count
    );

    observability::metrics::increment_requeues(TriggerSource::ErrorBackoff.as_str());
    Action::requeue(delay)
}

/// Kind of watch stream failure, derived from the error text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    NotFound,
    Unauthorized,
    Expired,
    Throttled,
    Other,
}

/// Classify a watch stream error. 404 is checked before 401 because a plain
/// text 404 body surfaces as a decode error mentioning `WatchFailed`.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if is_not_found {
        return WatchErrorKind::NotFound;
    }
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        return WatchErrorKind::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorKind::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorKind::Throttled;
    }
    WatchErrorKind::Other
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
            );
            error!("🔍 Verify the controller ServiceAccount can still list and watch growthbook.infra.doodle.com resources:");
            error!(
                "      kubectl auth can-i list growthbookinstances --as=system:serviceaccount:<namespace>:growthbook-controller --all-namespaces"
            );
            warn!(
                "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "watch.error.resource_version_expired");
            None
        }
        WatchErrorKind::Throttled => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            backoff.store(
                current_backoff.saturating_mul(2).min(max_backoff_ms),
                Ordering::Relaxed,
            );
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404) - this may be normal if a resource was deleted or a CRD is missing. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::config::ControllerConfig;
    use crate::storage::{MemoryDatabase, MemoryDatabaseProvider};

    fn instance() -> Arc<GrowthbookInstance> {
        let mut instance = GrowthbookInstance::new(
            "growthbook",
            serde_json::from_value(serde_json::json!({
                "mongodb": {"uri": "mongodb://localhost:27017/growthbook"},
                "prune": true
            }))
            .unwrap(),
        );
        instance.metadata.namespace = Some("flags".to_string());
        Arc::new(instance)
    }

    fn reconciler() -> Arc<Reconciler<MemoryCluster>> {
        Arc::new(Reconciler::new(
            MemoryCluster::new(),
            Arc::new(MemoryDatabaseProvider::new(MemoryDatabase::new())),
            Arc::new(ControllerConfig {
                backoff_start_secs: 2,
                backoff_max_secs: 10,
                ..ControllerConfig::default()
            }),
        ))
    }

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(classify_watch_error("ObjectNotFound: 404 WatchFailed"), WatchErrorKind::NotFound);
        assert_eq!(classify_watch_error("401 Unauthorized"), WatchErrorKind::Unauthorized);
        assert_eq!(classify_watch_error("too old resource version"), WatchErrorKind::Expired);
        assert_eq!(classify_watch_error("TooManyRequests"), WatchErrorKind::Throttled);
        assert_eq!(classify_watch_error("connection reset"), WatchErrorKind::Other);
    }

    #[tokio::test]
    async fn test_repeated_failures_back_off() {
        let ctx = reconciler();
        let error = ReconcilerError::Timeout;

        let delays: Vec<Action> = (0..3)
            .map(|_| handle_reconciliation_error(instance(), &error, Arc::clone(&ctx)))
            .collect();

        assert_eq!(
            delays,
            vec![
                Action::requeue(Duration::from_secs(2)),
                Action::requeue(Duration::from_secs(2)),
                Action::requeue(Duration::from_secs(4)),
            ]
        );
        let states = ctx.backoff_states.lock().unwrap();
        assert_eq!(states["flags/growthbook"].error_count, 3);
    }

    #[tokio::test]
    async fn test_reset_after_success_restarts_backoff() {
        let ctx = reconciler();
        let error = ReconcilerError::Timeout;
        handle_reconciliation_error(instance(), &error, Arc::clone(&ctx));
        handle_reconciliation_error(instance(), &error, Arc::clone(&ctx));

        ctx.reset_backoff("flags/growthbook");

        assert_eq!(
            handle_reconciliation_error(instance(), &error, Arc::clone(&ctx)),
            Action::requeue(Duration::from_secs(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_stream_doubles_backoff() {
        let backoff = AtomicU64::new(100);
        let result =
            handle_watch_stream_error("429 TooManyRequests", &backoff, 150, Duration::from_secs(1))
                .await;
        assert!(result.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 150);
    }
}
