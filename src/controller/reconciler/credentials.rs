//! # Credentials
//!
//! Reads usernames, passwords and tokens from Secrets referenced by
//! GrowthBook resources. Values are held in zeroizing strings.

use crate::cluster::Cluster;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{SecretReference, TokenSecretReference};
use crate::storage::StoreCredentials;
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Values read from one Secret, keyed by field name
pub type SecretValues = BTreeMap<String, Zeroizing<String>>;

/// Username and password read from a [`SecretReference`]
pub struct UserCredentials {
    pub username: Option<String>,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Pick `required` and `optional` fields out of a fetched Secret
pub fn extract_fields(
    secret: &Secret,
    required: &[&str],
    optional: &[&str],
) -> Result<SecretValues, ReconcilerError> {
    let data = secret.data.clone().unwrap_or_default();
    let mut values = SecretValues::new();

    for field in required.iter().chain(optional) {
        if let Some(bytes) = data.get(*field) {
            values.insert(
                (*field).to_string(),
                Zeroizing::new(String::from_utf8_lossy(&bytes.0).into_owned()),
            );
        }
    }

    if let Some(missing) = required.iter().find(|f| !values.contains_key(**f)) {
        return Err(ReconcilerError::FieldMissing {
            field: (*missing).to_string(),
            namespace: secret.metadata.namespace.clone().unwrap_or_default(),
            name: secret.metadata.name.clone().unwrap_or_default(),
        });
    }

    Ok(values)
}

/// Fetch the Secret `name` in `namespace` and read the given fields
pub async fn resolve<C: Cluster>(
    cluster: &C,
    namespace: &str,
    name: &str,
    required: &[&str],
    optional: &[&str],
) -> Result<SecretValues, ReconcilerError> {
    let secret: Secret =
        cluster
            .get(namespace, name)
            .await?
            .ok_or_else(|| ReconcilerError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
    extract_fields(&secret, required, optional)
}

/// Store credentials of an Instance; both fields are required
pub async fn resolve_store_credentials<C: Cluster>(
    cluster: &C,
    namespace: &str,
    reference: &SecretReference,
) -> Result<StoreCredentials, ReconcilerError> {
    let mut values = resolve(
        cluster,
        namespace,
        &reference.name,
        &[reference.user_field.as_str(), reference.password_field.as_str()],
        &[],
    )
    .await?;
    let username = values
        .remove(&reference.user_field)
        .map(|v| v.as_str().to_string())
        .unwrap_or_default();
    let password = values.remove(&reference.password_field).unwrap_or_default();
    Ok(StoreCredentials { username, password })
}

/// Credentials of a User; the password is required, the username optional
pub async fn resolve_user_credentials<C: Cluster>(
    cluster: &C,
    namespace: &str,
    reference: &SecretReference,
) -> Result<UserCredentials, ReconcilerError> {
    let mut values = resolve(
        cluster,
        namespace,
        &reference.name,
        &[reference.password_field.as_str()],
        &[reference.user_field.as_str()],
    )
    .await?;
    Ok(UserCredentials {
        username: values
            .remove(&reference.user_field)
            .map(|v| v.as_str().to_string()),
        password: values.remove(&reference.password_field).unwrap_or_default(),
    })
}

/// SDK access token of a Client
pub async fn resolve_token<C: Cluster>(
    cluster: &C,
    namespace: &str,
    reference: Option<&TokenSecretReference>,
) -> Result<Zeroizing<String>, ReconcilerError> {
    let reference = reference.ok_or(ReconcilerError::MissingSecretReference)?;
    let mut values = resolve(
        cluster,
        namespace,
        &reference.name,
        &[reference.token_field.as_str()],
        &[],
    )
    .await?;
    Ok(values.remove(&reference.token_field).unwrap_or_default())
}
