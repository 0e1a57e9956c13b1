//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics, probe server and client setup
//! - `watch_loop`: the Instance controller and its related watches
//! - `triggers`: classification of reconcile requests
//! - `error_policy`: requeue pacing for failed passes and watch errors

pub mod error_policy;
pub mod initialization;
pub mod triggers;
pub mod watch_loop;
