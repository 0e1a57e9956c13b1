//! # Resource Catalog
//!
//! Ordered list of the child resources one reconcile pass took ownership of.
//! It is published in the Instance status as `subResourceCatalog`.

use crate::crd::ResourceReference;
use kube::Resource;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCatalog {
    entries: Vec<ResourceReference>,
}

impl ResourceCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference to `resource` unless it is already listed
    pub fn record<K: Resource<DynamicType = ()>>(&mut self, resource: &K) {
        let reference = ResourceReference {
            kind: K::kind(&()).into_owned(),
            name: resource.meta().name.clone().unwrap_or_default(),
            api_version: K::api_version(&()).into_owned(),
        };
        if !self.entries.contains(&reference) {
            self.entries.push(reference);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[ResourceReference] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<ResourceReference> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GrowthbookFeature, GrowthbookOrganization};

    #[test]
    fn test_record_keeps_order_and_skips_duplicates() {
        let mut catalog = ResourceCatalog::new();
        catalog.record(&GrowthbookOrganization::new("org", Default::default()));
        catalog.record(&GrowthbookFeature::new("flag", Default::default()));
        catalog.record(&GrowthbookOrganization::new("org", Default::default()));

        assert_eq!(
            catalog.entries(),
            &[
                ResourceReference {
                    kind: "GrowthbookOrganization".to_string(),
                    name: "org".to_string(),
                    api_version: "growthbook.infra.doodle.com/v1beta1".to_string(),
                },
                ResourceReference {
                    kind: "GrowthbookFeature".to_string(),
                    name: "flag".to_string(),
                    api_version: "growthbook.infra.doodle.com/v1beta1".to_string(),
                },
            ]
        );
    }
}
