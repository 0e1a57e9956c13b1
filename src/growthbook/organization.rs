//! # Organizations

use crate::constants::COLLECTION_ORGANIZATIONS;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::GrowthbookOrganization;
use crate::growthbook::{effective_id, StoreEntity};
use kube::ResourceExt;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Organization {
    pub id: String,
    pub owner_email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime>,
    pub members: Vec<Member>,
    #[serde(rename = "__v")]
    pub version: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub id: String,
    pub role: String,
}

impl Organization {
    /// Map a declared Organization with its resolved members
    #[must_use]
    pub fn from_resource(organization: &GrowthbookOrganization, members: Vec<Member>) -> Self {
        let resource_name = organization.name_any();
        Self {
            id: effective_id(organization.spec.id.as_deref(), &resource_name),
            owner_email: organization.spec.owner_email.clone(),
            name: effective_id(organization.spec.name.as_deref(), &resource_name),
            members,
            ..Self::default()
        }
    }
}

impl StoreEntity for Organization {
    const COLLECTION: &'static str = COLLECTION_ORGANIZATIONS;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_into(&self, existing: &mut Self) -> Result<(), ReconcilerError> {
        existing.owner_email.clone_from(&self.owner_email);
        existing.name.clone_from(&self.name);
        existing.members.clone_from(&self.members);
        Ok(())
    }

    fn prepare_insert(&mut self, now: DateTime) -> Result<(), ReconcilerError> {
        self.date_created = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::GrowthbookOrganizationSpec;
    use crate::growthbook::{upsert, UpsertOutcome};
    use crate::storage::MemoryDatabase;

    fn organization(members: &[(&str, &str)]) -> Organization {
        let resource = GrowthbookOrganization::new(
            "acme",
            GrowthbookOrganizationSpec {
                owner_email: "owner@acme.test".to_string(),
                ..GrowthbookOrganizationSpec::default()
            },
        );
        Organization::from_resource(
            &resource,
            members
                .iter()
                .map(|(id, role)| Member {
                    id: (*id).to_string(),
                    role: (*role).to_string(),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_date_created_survives_member_changes() {
        let database = MemoryDatabase::new();
        upsert(&database, organization(&[("ada", "admin")])).await.unwrap();
        let created = database
            .find_by_id("organizations", "acme")
            .unwrap()
            .get_datetime("dateCreated")
            .copied()
            .unwrap();

        let outcome = upsert(&database, organization(&[("ada", "admin"), ("bob", "readonly")]))
            .await
            .unwrap();

        let stored = database.find_by_id("organizations", "acme").unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(stored.get_datetime("dateCreated").unwrap(), &created);
        assert_eq!(stored.get_array("members").unwrap().len(), 2);
    }
}
