//! # Observability
//!
//! Prometheus metrics for the reconcile loop and store writes, and
//! Kubernetes Events on reconciled Instances.

pub mod events;
pub mod metrics;

pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher, RecordingEventPublisher};

pub use metrics::*;
