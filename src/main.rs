//! # GrowthBook Controller
//!
//! A Kubernetes controller that manages GrowthBook organizations, users,
//! features and SDK connections as custom resources.
//!
//! Every `GrowthbookInstance` names a MongoDB store and selects the child
//! resources in its namespace. The controller writes the selected children
//! as GrowthBook documents, keeps them converged and removes them again when
//! pruning is enabled.

use anyhow::Result;
use growthbook_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init).await
}
