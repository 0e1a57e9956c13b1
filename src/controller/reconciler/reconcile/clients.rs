//! SDK connections of one Organization.

use super::Scope;
use crate::cluster::Cluster;
use crate::controller::reconciler::catalog::ResourceCatalog;
use crate::controller::reconciler::credentials::resolve_token;
use crate::controller::reconciler::selector::Selector;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{GrowthbookClient, GrowthbookOrganization};
use crate::growthbook::{effective_id, upsert, SdkConnection};
use kube::ResourceExt;

/// Clients matched by both the Organization and the Instance selector. A
/// live Client needs its token Secret; a retired one does not.
pub(super) async fn reconcile_clients<C: Cluster>(
    scope: &Scope<'_, C>,
    catalog: &mut ResourceCatalog,
    organization: &GrowthbookOrganization,
) -> Result<(), ReconcilerError> {
    let selector =
        Selector::parse(organization.spec.resource_selector.as_ref())?.and(&scope.selector);
    let clients: Vec<GrowthbookClient> = scope.list(&selector).await?;
    scope.claim(catalog, &clients).await?;

    let organization_id = effective_id(organization.spec.id.as_deref(), &organization.name_any());
    for client in &clients {
        if !scope.is_live(client) {
            let id = effective_id(client.spec.id.as_deref(), &client.name_any());
            scope.retire::<SdkConnection, _>(client, &id).await?;
            continue;
        }

        let token =
            resolve_token(scope.cluster, scope.namespace, client.spec.token_secret.as_ref())
                .await?;
        upsert(
            scope.database,
            SdkConnection::from_resource(client, &organization_id, &token),
        )
        .await?;
    }
    Ok(())
}
