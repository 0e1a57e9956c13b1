//! Organizations selected by the Instance, with members resolved from their
//! user bindings.

use super::Scope;
use crate::cluster::Cluster;
use crate::controller::reconciler::catalog::ResourceCatalog;
use crate::controller::reconciler::selector::Selector;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{GrowthbookOrganization, GrowthbookUser};
use crate::growthbook::{effective_id, upsert, Member, Organization};
use kube::ResourceExt;

/// Returns every selected Organization, including those being deleted, so
/// their Features and Clients are retired in the same pass
pub(super) async fn reconcile_organizations<C: Cluster>(
    scope: &Scope<'_, C>,
    catalog: &mut ResourceCatalog,
) -> Result<Vec<GrowthbookOrganization>, ReconcilerError> {
    let organizations: Vec<GrowthbookOrganization> = scope.list(&scope.selector).await?;
    scope.claim(catalog, &organizations).await?;

    for organization in &organizations {
        if !scope.is_live(organization) {
            let id = effective_id(organization.spec.id.as_deref(), &organization.name_any());
            scope.retire::<Organization, _>(organization, &id).await?;
            continue;
        }

        let members = resolve_members(scope, organization).await?;
        upsert(
            scope.database,
            Organization::from_resource(organization, members),
        )
        .await?;
    }
    Ok(organizations)
}

/// One member per User matched by each binding, in binding order
async fn resolve_members<C: Cluster>(
    scope: &Scope<'_, C>,
    organization: &GrowthbookOrganization,
) -> Result<Vec<Member>, ReconcilerError> {
    let mut members = Vec::new();
    for binding in &organization.spec.users {
        let selector = Selector::parse(binding.selector.as_ref())?;
        let users: Vec<GrowthbookUser> = scope.list(&selector).await?;
        members.extend(users.iter().map(|user| Member {
            id: effective_id(user.spec.id.as_deref(), &user.name_any()),
            role: binding.role.clone(),
        }));
    }
    Ok(members)
}
