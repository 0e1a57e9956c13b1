//! GrowthBook Controller Library
//!
//! Reconciles GrowthBook custom resources (Instances, Organizations, Users,
//! Features and SDK connections) into the MongoDB store of a GrowthBook
//! deployment. Tests are included in the module files.

pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod growthbook;
pub mod observability;
pub mod runtime;
pub mod storage;
