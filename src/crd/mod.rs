//! # Custom Resource Definitions
//!
//! The five GrowthBook kinds of group `growthbook.infra.doodle.com/v1beta1`.
//!
//! - `GrowthbookInstance` - one MongoDB store and the selector of its children
//! - `GrowthbookOrganization` - organization with member bindings
//! - `GrowthbookUser` - user account with credentials from a Secret
//! - `GrowthbookFeature` - feature flag with per-environment rules
//! - `GrowthbookClient` - SDK connection with an access key from a Secret

mod client;
mod common;
mod feature;
mod instance;
mod organization;
mod status;
mod user;

pub use client::{GrowthbookClient, GrowthbookClientSpec};
pub use common::{
    LabelSelector, LabelSelectorRequirement, SecretReference, TokenSecretReference,
};
pub use feature::{
    Environment, ExperimentValue, FeaturePrerequisite, FeatureRule, FeatureRuleType,
    FeatureValueType, GrowthbookFeature, GrowthbookFeatureSpec, NamespaceValue, SavedGroupMatch,
    SavedGroupTargeting, ScheduleRule,
};
pub use instance::{GrowthbookInstance, GrowthbookInstanceSpec, MongoDbConfig};
pub use organization::{GrowthbookOrganization, GrowthbookOrganizationSpec, UserBinding};
pub use status::{Condition, GrowthbookInstanceStatus, ResourceReference};
pub use user::{GrowthbookUser, GrowthbookUserSpec};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{API_GROUP, API_VERSION};
    use kube::Resource;

    #[test]
    fn test_all_kinds_share_group_and_version() {
        let expected = format!("{API_GROUP}/{API_VERSION}");
        for api_version in [
            GrowthbookInstance::api_version(&()),
            GrowthbookOrganization::api_version(&()),
            GrowthbookUser::api_version(&()),
            GrowthbookFeature::api_version(&()),
            GrowthbookClient::api_version(&()),
        ] {
            assert_eq!(api_version, expected);
        }
    }
}
