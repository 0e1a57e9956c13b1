//! # Status
//!
//! Builds the status an Instance reports after a reconcile pass.

use crate::constants::{CONDITION_READY, READY_MESSAGE};
use crate::controller::reconciler::duration::format_duration;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{Condition, GrowthbookInstance, GrowthbookInstanceStatus, ResourceReference};
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Reasons of the Ready condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionReason {
    Synchronized,
    Failed,
}

impl ConditionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionReason::Synchronized => "Synchronized",
            ConditionReason::Failed => "Failed",
        }
    }
}

/// Insert or replace the condition of the same type. The transition time
/// only moves when the status value changes.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            if existing.status == condition.status {
                condition
                    .last_transition_time
                    .clone_from(&existing.last_transition_time);
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Status after a pass that ended with `outcome`
#[must_use]
pub fn compose(
    instance: &GrowthbookInstance,
    outcome: Result<(), &ReconcilerError>,
    catalog: Vec<ResourceReference>,
    elapsed: Duration,
    now: DateTime<Utc>,
) -> GrowthbookInstanceStatus {
    let generation = instance.metadata.generation;
    let mut status = instance.status.clone().unwrap_or_default();

    let (value, reason, message) = match outcome {
        Ok(()) => ("True", ConditionReason::Synchronized, READY_MESSAGE.to_string()),
        Err(error) => ("False", ConditionReason::Failed, error.to_string()),
    };
    set_condition(
        &mut status.conditions,
        Condition {
            r#type: CONDITION_READY.to_string(),
            status: value.to_string(),
            reason: Some(reason.as_str().to_string()),
            message: Some(message),
            observed_generation: generation,
            last_transition_time: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        },
    );

    status.observed_generation = generation;
    status.last_reconcile_duration = Some(format_duration(elapsed));
    status.sub_resource_catalog = catalog;
    status
}

/// Whether the Instance last reported Ready=True
#[must_use]
pub fn is_ready(instance: &GrowthbookInstance) -> bool {
    instance
        .status
        .as_ref()
        .and_then(|s| s.condition(CONDITION_READY))
        .is_some_and(|c| c.status == "True")
}
