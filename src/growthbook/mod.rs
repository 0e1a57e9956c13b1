//! # GrowthBook Store Model
//!
//! Typed documents of the GrowthBook MongoDB collections, the mapping from
//! declared resources to those documents, and the idempotent writer.
//!
//! The writer reads the stored document, overlays the declared fields onto
//! it and writes only when the overlay changed something. Fields the
//! declaration does not own (creation dates, revision counters, generated
//! keys, rules added through the GrowthBook UI) survive every update.

pub mod feature;
pub mod keys;
pub mod organization;
pub mod password;
pub mod sdk_connection;
pub mod user;

use crate::controller::reconciler::ReconcilerError;
use crate::observability::metrics;
use crate::storage::{Database, StoreError};
use mongodb::bson::{self, doc, DateTime, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

pub use feature::Feature;
pub use organization::{Member, Organization};
pub use sdk_connection::SdkConnection;
pub use user::User;

/// Override if non-empty, else the resource name
#[must_use]
pub fn effective_id(override_id: Option<&str>, resource_name: &str) -> String {
    match override_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => resource_name.to_string(),
    }
}

/// A document type of one GrowthBook collection, keyed by its `id` field
pub trait StoreEntity: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    /// Overlay the declared fields of `self` onto the stored document
    fn merge_into(&self, existing: &mut Self) -> Result<(), ReconcilerError>;

    /// Fill store-owned fields of a document about to be inserted
    fn prepare_insert(&mut self, _now: DateTime) -> Result<(), ReconcilerError> {
        Ok(())
    }

    /// Stamp a document about to be updated
    fn touch(&mut self, _now: DateTime) {}

    /// Derived cache documents to drop after this entity changed, as
    /// `(collection, filter)` pairs
    fn invalidations(&self) -> Vec<(&'static str, Document)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Unchanged => "unchanged",
        }
    }
}

fn encode<E: Serialize>(entity: &E) -> Result<Document, StoreError> {
    Ok(bson::to_document(entity)?)
}

fn snapshot<E: Serialize>(entity: &E) -> Result<Vec<u8>, StoreError> {
    Ok(bson::to_vec(entity)?)
}

/// Insert `entity` or bring the stored document in line with it
pub async fn upsert<E: StoreEntity>(
    database: &dyn Database,
    mut entity: E,
) -> Result<UpsertOutcome, ReconcilerError> {
    let collection = database.collection(E::COLLECTION);
    let filter = doc! { "id": entity.id() };
    let now = DateTime::now();

    let (outcome, written) = match collection.find_one(filter.clone()).await? {
        None => {
            entity.prepare_insert(now)?;
            collection.insert_one(encode(&entity)?).await?;
            (UpsertOutcome::Created, entity)
        }
        Some(document) => {
            let mut existing: E = bson::from_document(document).map_err(StoreError::from)?;
            let before = snapshot(&existing)?;
            entity.merge_into(&mut existing)?;
            if snapshot(&existing)? == before {
                debug!(
                    collection = E::COLLECTION,
                    id = existing.id(),
                    "store.document.unchanged"
                );
                return Ok(UpsertOutcome::Unchanged);
            }
            existing.touch(now);
            collection
                .update_one(filter, doc! { "$set": encode(&existing)? })
                .await?;
            (UpsertOutcome::Updated, existing)
        }
    };

    info!(
        collection = E::COLLECTION,
        id = written.id(),
        outcome = outcome.as_str(),
        "store.document.written"
    );
    metrics::increment_store_writes(E::COLLECTION, outcome.as_str());

    for (cache, cache_filter) in written.invalidations() {
        let deleted = database.collection(cache).delete_many(cache_filter).await?;
        debug!(collection = cache, deleted, "store.cache.invalidated");
    }

    Ok(outcome)
}

/// Delete the document with `id`; a missing document is not an error
pub async fn delete<E: StoreEntity>(database: &dyn Database, id: &str) -> Result<(), ReconcilerError> {
    database
        .collection(E::COLLECTION)
        .delete_one(doc! { "id": id })
        .await?;
    info!(collection = E::COLLECTION, id, "store.document.deleted");
    metrics::increment_store_writes(E::COLLECTION, "deleted");
    Ok(())
}
