//! # Trigger Classification
//!
//! Every watch event on an Instance, including the status patches the
//! controller writes itself, reaches the reconcile function. The tracker
//! decides which of them warrant a pass and which only restore the pending
//! requeue.

use crate::constants::REQUEUE_TOLERANCE;
use crate::controller::reconciler::TriggerSource;
use crate::crd::GrowthbookInstance;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of classifying one reconcile request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Reconcile(TriggerSource),
    /// Nothing to do; requeue after the remaining time of a pending schedule
    Skip(Option<Duration>),
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    at: Instant,
    source: TriggerSource,
}

#[derive(Debug, Default)]
struct TrackerState {
    seen: HashSet<String>,
    related: HashSet<String>,
    scheduled: HashMap<String, Scheduled>,
}

/// Shared per-Instance trigger bookkeeping, keyed by `namespace/name`
#[derive(Debug, Clone, Default)]
pub struct TriggerTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl TriggerTracker {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// A selected child or referenced Secret of the Instance changed
    pub fn mark_related(&self, key: &str) {
        self.state().related.insert(key.to_string());
    }

    /// Remember the requeue the controller asked for
    pub fn schedule(&self, key: &str, after: Duration, source: TriggerSource) {
        self.state().scheduled.insert(
            key.to_string(),
            Scheduled {
                at: Instant::now() + after,
                source,
            },
        );
    }

    /// Drop a pending requeue
    pub fn unschedule(&self, key: &str) {
        self.state().scheduled.remove(key);
    }

    /// Forget everything about an Instance that no longer exists
    pub fn forget(&self, key: &str) {
        let mut state = self.state();
        state.seen.remove(key);
        state.related.remove(key);
        state.scheduled.remove(key);
    }

    /// Decide whether a request for `instance` warrants a reconcile pass
    pub fn classify(&self, key: &str, instance: &GrowthbookInstance) -> Decision {
        let now = Instant::now();
        let mut state = self.state();

        if state.seen.insert(key.to_string()) {
            state.related.remove(key);
            return Decision::Reconcile(TriggerSource::Startup);
        }
        if instance.is_deleting() {
            return Decision::Reconcile(TriggerSource::Deletion);
        }
        let observed = instance.status.as_ref().and_then(|s| s.observed_generation);
        if instance.metadata.generation != observed {
            state.related.remove(key);
            return Decision::Reconcile(TriggerSource::SpecChange);
        }
        if state.related.remove(key) {
            return Decision::Reconcile(TriggerSource::RelatedResource);
        }

        match state.scheduled.get(key).copied() {
            Some(scheduled) if scheduled.at <= now + REQUEUE_TOLERANCE => {
                state.scheduled.remove(key);
                Decision::Reconcile(scheduled.source)
            }
            Some(scheduled) => Decision::Skip(Some(scheduled.at - now)),
            None => Decision::Skip(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::GrowthbookInstanceStatus;

    fn instance(generation: i64, observed: Option<i64>) -> GrowthbookInstance {
        let mut instance = GrowthbookInstance::new(
            "growthbook",
            serde_json::from_value(serde_json::json!({
                "mongodb": {"uri": "mongodb://localhost:27017/growthbook"},
                "prune": true
            }))
            .unwrap(),
        );
        instance.metadata.generation = Some(generation);
        instance.status = Some(GrowthbookInstanceStatus {
            observed_generation: observed,
            ..GrowthbookInstanceStatus::default()
        });
        instance
    }

    #[test]
    fn test_first_sight_is_startup() {
        let tracker = TriggerTracker::default();
        assert_eq!(
            tracker.classify("ns/a", &instance(1, Some(1))),
            Decision::Reconcile(TriggerSource::Startup)
        );
    }

    #[test]
    fn test_status_only_update_is_skipped() {
        let tracker = TriggerTracker::default();
        tracker.classify("ns/a", &instance(1, None));
        assert_eq!(tracker.classify("ns/a", &instance(1, Some(1))), Decision::Skip(None));
    }

    #[test]
    fn test_generation_change_is_spec_change() {
        let tracker = TriggerTracker::default();
        tracker.classify("ns/a", &instance(1, Some(1)));
        assert_eq!(
            tracker.classify("ns/a", &instance(2, Some(1))),
            Decision::Reconcile(TriggerSource::SpecChange)
        );
    }

    #[test]
    fn test_related_change_is_consumed_once() {
        let tracker = TriggerTracker::default();
        tracker.classify("ns/a", &instance(1, Some(1)));
        tracker.mark_related("ns/a");
        assert_eq!(
            tracker.classify("ns/a", &instance(1, Some(1))),
            Decision::Reconcile(TriggerSource::RelatedResource)
        );
        assert_eq!(tracker.classify("ns/a", &instance(1, Some(1))), Decision::Skip(None));
    }

    #[test]
    fn test_deletion() {
        let tracker = TriggerTracker::default();
        tracker.classify("ns/a", &instance(1, Some(1)));
        let mut deleting = instance(1, Some(1));
        deleting.metadata.deletion_timestamp = Some(
            k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        );
        assert_eq!(
            tracker.classify("ns/a", &deleting),
            Decision::Reconcile(TriggerSource::Deletion)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_schedule_is_kept_until_due() {
        let tracker = TriggerTracker::default();
        tracker.classify("ns/a", &instance(1, Some(1)));
        tracker.schedule("ns/a", Duration::from_secs(60), TriggerSource::TimerBased);

        assert_eq!(
            tracker.classify("ns/a", &instance(1, Some(1))),
            Decision::Skip(Some(Duration::from_secs(60)))
        );

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(
            tracker.classify("ns/a", &instance(1, Some(1))),
            Decision::Reconcile(TriggerSource::TimerBased)
        );
        assert_eq!(tracker.classify("ns/a", &instance(1, Some(1))), Decision::Skip(None));
    }

    #[test]
    fn test_forget_resets_startup() {
        let tracker = TriggerTracker::default();
        tracker.classify("ns/a", &instance(1, Some(1)));
        tracker.forget("ns/a");
        assert_eq!(
            tracker.classify("ns/a", &instance(1, Some(1))),
            Decision::Reconcile(TriggerSource::Startup)
        );
    }
}
