//! Users selected by the Instance.

use super::Scope;
use crate::cluster::Cluster;
use crate::controller::reconciler::catalog::ResourceCatalog;
use crate::controller::reconciler::credentials::resolve_user_credentials;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::GrowthbookUser;
use crate::growthbook::{effective_id, upsert, User};
use kube::ResourceExt;

pub(super) async fn reconcile_users<C: Cluster>(
    scope: &Scope<'_, C>,
    catalog: &mut ResourceCatalog,
) -> Result<(), ReconcilerError> {
    let users: Vec<GrowthbookUser> = scope.list(&scope.selector).await?;
    scope.claim(catalog, &users).await?;

    for user in &users {
        if !scope.is_live(user) {
            let id = effective_id(user.spec.id.as_deref(), &user.name_any());
            scope.retire::<User, _>(user, &id).await?;
            continue;
        }

        let credentials = match &user.spec.secret {
            Some(reference) => {
                Some(resolve_user_credentials(scope.cluster, scope.namespace, reference).await?)
            }
            None => None,
        };
        upsert(scope.database, User::from_resource(user, credentials)).await?;
    }
    Ok(())
}
