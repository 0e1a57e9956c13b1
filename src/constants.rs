//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Defaults here can be overridden through environment variables where
//! [`crate::config::ControllerConfig`] exposes them.

use std::time::Duration;

/// API group of all GrowthBook custom resources
pub const API_GROUP: &str = "growthbook.infra.doodle.com";

/// API version of all GrowthBook custom resources
pub const API_VERSION: &str = "v1beta1";

/// Finalizer token an Instance places on itself. Child resources carry
/// `<FINALIZER>/<instance>.<namespace>`.
pub const FINALIZER: &str = "finalizers.growthbook.infra.doodle.com";

/// Owner recorded on features created by the controller
pub const FEATURE_OWNER: &str = "growthbook-controller";

/// Reporting component of published Kubernetes Events
pub const EVENT_REPORTER: &str = "growthbook-controller";

/// Application name presented to the MongoDB server
pub const STORE_APP_NAME: &str = "growthbook-controller";

/// Store collections
pub const COLLECTION_ORGANIZATIONS: &str = "organizations";
pub const COLLECTION_USERS: &str = "users";
pub const COLLECTION_FEATURES: &str = "features";
pub const COLLECTION_SDK_CONNECTIONS: &str = "sdkconnections";
pub const COLLECTION_SDK_PAYLOADS: &str = "sdkpayloads";

/// Prefix every SDK connection access key carries
pub const SDK_KEY_PREFIX: &str = "sdk-";

/// Default secret keys
pub const DEFAULT_USER_FIELD: &str = "username";
pub const DEFAULT_PASSWORD_FIELD: &str = "password";
pub const DEFAULT_TOKEN_FIELD: &str = "token";

/// Default per-reconcile timeout of an Instance
pub const DEFAULT_INSTANCE_TIMEOUT: &str = "5m";

/// Longest accepted `spec.interval`
pub const MAX_RECONCILE_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Random bytes drawn for encryption and signing keys
pub const KEY_MATERIAL_BYTES: usize = 32;

/// Password hashing parameters (scrypt N = 2^14, r = 8, p = 1)
pub const PASSWORD_SALT_BYTES: usize = 16;
pub const PASSWORD_HASH_BYTES: usize = 64;
pub const SCRYPT_LOG_N: u8 = 14;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;

/// Condition vocabulary
pub const CONDITION_READY: &str = "Ready";
pub const READY_MESSAGE: &str = "instance successfully reconciled";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default number of Instances reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 4;

/// Default Fibonacci backoff bounds for failed reconciles (seconds)
pub const DEFAULT_BACKOFF_START_SECS: u64 = 1;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting the watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default upper bound for closing a store connection (seconds)
pub const DEFAULT_STORE_DISCONNECT_TIMEOUT_SECS: u64 = 10;

/// A scheduled requeue counts as due this close to its deadline
pub const REQUEUE_TOLERANCE: Duration = Duration::from_secs(2);
