//! # Types
//!
//! Core types for the reconciler.

use crate::cluster::{Cluster, KubeCluster};
use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::growthbook::password::PasswordError;
use crate::observability::events::{EventPublisher, NoopEventPublisher};
use crate::runtime::triggers::TriggerTracker;
use crate::storage::{DatabaseProvider, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("referencing secret was not found: {namespace}/{name}")]
    SecretNotFound { namespace: String, name: String },
    #[error("no secret reference provided")]
    MissingSecretReference,
    #[error("defined field {field:?} not found in secret {namespace}/{name}")]
    FieldMissing {
        field: String,
        namespace: String,
        name: String,
    },
    #[error("invalid label selector: {0}")]
    SelectorInvalid(String),
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("conflict updating {kind} {namespace}/{name}: resource version changed")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("context deadline exceeded")]
    Timeout,
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
    #[error("kubernetes api request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("password hashing failed: {0}")]
    Password(#[from] PasswordError),
    #[error("failed reconciling {step}: {source}")]
    Step {
        step: &'static str,
        source: Box<ReconcilerError>,
    },
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Attribute the error to one sub-reconcile (`users`, `organizations`, ...)
    #[must_use]
    pub fn during(self, step: &'static str) -> Self {
        ReconcilerError::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping step attribution
    #[must_use]
    pub fn root_cause(&self) -> &ReconcilerError {
        match self {
            ReconcilerError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Trigger source for reconciliation
/// Tracks why a reconciliation was triggered for better debugging and observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// First reconcile of the Instance by this process
    Startup,
    /// Spec changed (generation differs from observed generation)
    SpecChange,
    /// Instance marked for deletion
    Deletion,
    /// A selected child resource or referenced Secret changed
    RelatedResource,
    /// Timer-based periodic reconciliation (`spec.interval`)
    TimerBased,
    /// Error backoff retry (Fibonacci backoff after failure)
    ErrorBackoff,
}

impl TriggerSource {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Startup => "startup",
            TriggerSource::SpecChange => "spec-change",
            TriggerSource::Deletion => "deletion",
            TriggerSource::RelatedResource => "related-resource",
            TriggerSource::TimerBased => "timer-based",
            TriggerSource::ErrorBackoff => "error-backoff",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            backoff: FibonacciBackoff::new(config.backoff_start_secs, config.backoff_max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconcile context
pub struct Reconciler<C = KubeCluster> {
    pub cluster: C,
    pub database_provider: Arc<dyn DatabaseProvider>,
    pub config: Arc<ControllerConfig>,
    pub triggers: TriggerTracker,
    pub events: Arc<dyn EventPublisher>,
    // Backoff state per Instance (namespace/name), advanced by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<C> std::fmt::Debug for Reconciler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: Cluster> Reconciler<C> {
    #[must_use]
    pub fn new(
        cluster: C,
        database_provider: Arc<dyn DatabaseProvider>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            cluster,
            database_provider,
            config,
            triggers: TriggerTracker::default(),
            events: Arc::new(NoopEventPublisher),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish Kubernetes Events through `events` instead of dropping them
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    /// Forget the failure history of an Instance after a successful pass
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.reset();
            }
        }
    }
}
