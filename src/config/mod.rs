//! # Configuration
//!
//! Process-wide controller configuration.

mod controller;

pub use controller::ControllerConfig;
