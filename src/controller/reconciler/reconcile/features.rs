//! Features of one Organization.

use super::Scope;
use crate::cluster::Cluster;
use crate::controller::reconciler::catalog::ResourceCatalog;
use crate::controller::reconciler::selector::Selector;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{GrowthbookFeature, GrowthbookOrganization};
use crate::growthbook::{effective_id, upsert, Feature};
use kube::ResourceExt;

/// Features matched by both the Organization and the Instance selector
pub(super) async fn reconcile_features<C: Cluster>(
    scope: &Scope<'_, C>,
    catalog: &mut ResourceCatalog,
    organization: &GrowthbookOrganization,
) -> Result<(), ReconcilerError> {
    let selector =
        Selector::parse(organization.spec.resource_selector.as_ref())?.and(&scope.selector);
    let features: Vec<GrowthbookFeature> = scope.list(&selector).await?;
    scope.claim(catalog, &features).await?;

    let organization_id = effective_id(organization.spec.id.as_deref(), &organization.name_any());
    for feature in &features {
        let entity = Feature::from_resource(feature, &organization_id);
        if scope.is_live(feature) {
            upsert(scope.database, entity).await?;
        } else {
            scope.retire::<Feature, _>(feature, &entity.id).await?;
        }
    }
    Ok(())
}
