//! # Reconciler
//!
//! Core reconciliation logic for `GrowthbookInstance` resources.
//!
//! The reconciler:
//! - Watches `GrowthbookInstance` resources across all namespaces
//! - Selects Users, Organizations, Features and Clients by label
//! - Converges them into the GrowthBook MongoDB store
//! - Guards each selected child with a finalizer scoped to the Instance
//! - Reports readiness and the managed resources in the Instance status
//!
//! ## Reconciliation Flow
//!
//! 1. Re-read the Instance; stop if it is suspended
//! 2. Ensure the Instance finalizer
//! 3. Connect to the store named by `spec.mongodb`
//! 4. Users, Organizations, then Features and Clients per Organization
//! 5. Disconnect and patch the status

pub mod catalog;
pub mod credentials;
pub mod duration;
pub mod finalizer;
pub mod reconcile;
pub mod selector;
pub mod status;
pub mod types;
pub mod watches;

// Re-export public API
pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError, TriggerSource};
