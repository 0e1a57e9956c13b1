//! # Users

use crate::constants::COLLECTION_USERS;
use crate::controller::reconciler::credentials::UserCredentials;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::GrowthbookUser;
use crate::growthbook::password::hash_password;
use crate::growthbook::{effective_id, StoreEntity};
use kube::ResourceExt;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password_hash: String,
    #[serde(rename = "__v")]
    pub version: i32,
    /// Plaintext password, hashed against the stored salt when written
    #[serde(skip)]
    pub password: Option<Zeroizing<String>>,
}

impl User {
    /// Map a declared User. A username from the credentials Secret replaces
    /// the display name.
    #[must_use]
    pub fn from_resource(user: &GrowthbookUser, credentials: Option<UserCredentials>) -> Self {
        let resource_name = user.name_any();
        let mut mapped = Self {
            id: effective_id(user.spec.id.as_deref(), &resource_name),
            email: user.spec.email.clone(),
            name: effective_id(user.spec.name.as_deref(), &resource_name),
            ..Self::default()
        };
        if let Some(credentials) = credentials {
            if let Some(username) = credentials.username.filter(|u| !u.is_empty()) {
                mapped.name = username;
            }
            mapped.password = Some(credentials.password).filter(|p| !p.is_empty());
        }
        mapped
    }
}

impl StoreEntity for User {
    const COLLECTION: &'static str = COLLECTION_USERS;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge_into(&self, existing: &mut Self) -> Result<(), ReconcilerError> {
        existing.email.clone_from(&self.email);
        existing.name.clone_from(&self.name);
        if let Some(password) = &self.password {
            existing.password_hash = hash_password(password, &existing.password_hash)?;
        }
        Ok(())
    }

    fn prepare_insert(&mut self, _now: DateTime) -> Result<(), ReconcilerError> {
        if let Some(password) = &self.password {
            self.password_hash = hash_password(password, "")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::GrowthbookUserSpec;
    use crate::growthbook::{upsert, UpsertOutcome};
    use crate::storage::MemoryDatabase;

    fn resource(id: Option<&str>) -> GrowthbookUser {
        GrowthbookUser::new(
            "ada",
            GrowthbookUserSpec {
                id: id.map(str::to_string),
                email: "ada@example.com".to_string(),
                ..GrowthbookUserSpec::default()
            },
        )
    }

    #[test]
    fn test_mapping_defaults_to_resource_name() {
        let user = User::from_resource(&resource(None), None);
        assert_eq!(user.id, "ada");
        assert_eq!(user.name, "ada");
        assert!(user.password.is_none());
    }

    #[test]
    fn test_secret_username_overrides_name() {
        let user = User::from_resource(
            &resource(Some("u-1")),
            Some(UserCredentials {
                username: Some("Ada Lovelace".to_string()),
                password: Zeroizing::new("pw".to_string()),
            }),
        );
        assert_eq!(user.id, "u-1");
        assert_eq!(user.name, "Ada Lovelace");
        assert_eq!(user.password.as_deref().map(String::as_str), Some("pw"));
    }

    #[tokio::test]
    async fn test_unchanged_password_does_not_rewrite() {
        let database = MemoryDatabase::new();
        let credentials = || UserCredentials {
            username: None,
            password: Zeroizing::new("pw".to_string()),
        };

        upsert(&database, User::from_resource(&resource(None), Some(credentials())))
            .await
            .unwrap();
        let stored_hash = database
            .find_by_id("users", "ada")
            .unwrap()
            .get_str("passwordHash")
            .unwrap()
            .to_string();
        let outcome = upsert(&database, User::from_resource(&resource(None), Some(credentials())))
            .await
            .unwrap();

        assert_eq!(stored_hash.len(), 161);
        assert_eq!(outcome, UpsertOutcome::Unchanged);
    }
}
