//! # In-Memory Store
//!
//! Process-local [`DatabaseProvider`] for tests and dry runs. Documents live
//! in a shared map, every operation is recorded, and failures or connect
//! latency can be injected.

use crate::storage::{Collection, Database, DatabaseProvider, StoreCredentials, StoreError};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Find,
    Insert,
    Update,
    Delete,
    DeleteMany,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Find => "find",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::DeleteMany => "deleteMany",
        }
    }

    /// Whether the operation modifies the store
    #[must_use]
    pub fn is_write(self) -> bool {
        !matches!(self, OperationKind::Find)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOperation {
    pub collection: String,
    pub kind: OperationKind,
    pub filter: Document,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<String, Vec<Document>>,
    operations: Vec<RecordedOperation>,
    failures: HashSet<(String, OperationKind)>,
    connections: usize,
    disconnections: usize,
    usernames: Vec<Option<String>>,
}

/// Shared in-memory database; clones see the same documents
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock only happens inside a failing test
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert a document directly, bypassing the operation log
    pub fn seed(&self, collection: &str, document: Document) {
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// All documents of a collection
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// The document of `collection` with the given `id` field
    #[must_use]
    pub fn find_by_id(&self, collection: &str, id: &str) -> Option<Document> {
        self.documents(collection)
            .into_iter()
            .find(|doc| doc.get_str("id").is_ok_and(|v| v == id))
    }

    #[must_use]
    pub fn operations(&self) -> Vec<RecordedOperation> {
        self.state().operations.clone()
    }

    /// Recorded operations that modify the store
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedOperation> {
        self.operations()
            .into_iter()
            .filter(|op| op.kind.is_write())
            .collect()
    }

    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Make every subsequent `kind` operation on `collection` fail
    pub fn fail_on(&self, collection: &str, kind: OperationKind) {
        self.state()
            .failures
            .insert((collection.to_string(), kind));
    }

    #[must_use]
    pub fn connections(&self) -> usize {
        self.state().connections
    }

    #[must_use]
    pub fn disconnections(&self) -> usize {
        self.state().disconnections
    }

    /// Usernames presented on each connect, `None` for anonymous connects
    #[must_use]
    pub fn connected_usernames(&self) -> Vec<Option<String>> {
        self.state().usernames.clone()
    }

    fn begin(
        &self,
        collection: &str,
        kind: OperationKind,
        filter: &Document,
    ) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let mut state = self.state();
        state.operations.push(RecordedOperation {
            collection: collection.to_string(),
            kind,
            filter: filter.clone(),
        });
        if state.failures.contains(&(collection.to_string(), kind)) {
            return Err(StoreError::Operation {
                collection: collection.to_string(),
                operation: kind.as_str(),
                message: "injected failure".to_string(),
            });
        }
        Ok(state)
    }
}

fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}

/// Provider handing out connections to one shared [`MemoryDatabase`]
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabaseProvider {
    database: MemoryDatabase,
    connect_delay: Option<Duration>,
}

impl MemoryDatabaseProvider {
    #[must_use]
    pub fn new(database: MemoryDatabase) -> Self {
        Self {
            database,
            connect_delay: None,
        }
    }

    /// Delay every connect, for exercising reconcile deadlines
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn database(&self) -> &MemoryDatabase {
        &self.database
    }
}

#[async_trait]
impl DatabaseProvider for MemoryDatabaseProvider {
    async fn connect(
        &self,
        _uri: &str,
        credentials: Option<StoreCredentials>,
    ) -> Result<Box<dyn Database>, StoreError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut state = self.database.state();
            state.connections += 1;
            state.usernames.push(credentials.map(|c| c.username));
        }
        Ok(Box::new(self.database.clone()))
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn collection(&self, name: &str) -> Box<dyn Collection> {
        Box::new(MemoryCollection {
            name: name.to_string(),
            database: self.clone(),
        })
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.state().disconnections += 1;
        Ok(())
    }
}

struct MemoryCollection {
    name: String,
    database: MemoryDatabase,
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError> {
        let state = self
            .database
            .begin(&self.name, OperationKind::Find, &filter)?;
        Ok(state
            .collections
            .get(&self.name)
            .and_then(|docs| docs.iter().find(|doc| matches_filter(doc, &filter)))
            .cloned())
    }

    async fn insert_one(&self, document: Document) -> Result<(), StoreError> {
        let mut state = self
            .database
            .begin(&self.name, OperationKind::Insert, &Document::new())?;
        state
            .collections
            .entry(self.name.clone())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<(), StoreError> {
        let fields = match update.get("$set") {
            Some(Bson::Document(fields)) if update.len() == 1 => fields.clone(),
            _ => return Err(StoreError::UnsupportedUpdate(update.to_string())),
        };
        let mut state = self
            .database
            .begin(&self.name, OperationKind::Update, &filter)?;
        if let Some(doc) = state
            .collections
            .get_mut(&self.name)
            .and_then(|docs| docs.iter_mut().find(|doc| matches_filter(doc, &filter)))
        {
            for (key, value) in fields {
                doc.insert(key, value);
            }
        }
        Ok(())
    }

    async fn delete_one(&self, filter: Document) -> Result<(), StoreError> {
        let mut state = self
            .database
            .begin(&self.name, OperationKind::Delete, &filter)?;
        if let Some(docs) = state.collections.get_mut(&self.name) {
            if let Some(index) = docs.iter().position(|doc| matches_filter(doc, &filter)) {
                docs.remove(index);
            }
        }
        Ok(())
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, StoreError> {
        let mut state = self
            .database
            .begin(&self.name, OperationKind::DeleteMany, &filter)?;
        let Some(docs) = state.collections.get_mut(&self.name) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !matches_filter(doc, &filter));
        Ok((before - docs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_update_applies_set_fields() {
        let database = MemoryDatabase::new();
        database.seed("users", doc! {"id": "u1", "name": "old", "__v": 3});

        let users = database.collection("users");
        users
            .update_one(doc! {"id": "u1"}, doc! {"$set": {"name": "new"}})
            .await
            .unwrap();

        let stored = database.find_by_id("users", "u1").unwrap();
        assert_eq!(stored.get_str("name").unwrap(), "new");
        assert_eq!(stored.get_i32("__v").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_many_removes_matching_documents() {
        let database = MemoryDatabase::new();
        database.seed("sdkpayloads", doc! {"organization": "o", "environment": "dev"});
        database.seed("sdkpayloads", doc! {"organization": "o", "environment": "prod"});

        let deleted = database
            .collection("sdkpayloads")
            .delete_many(doc! {"organization": "o", "environment": "dev"})
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(database.documents("sdkpayloads").len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded_and_returned() {
        let database = MemoryDatabase::new();
        database.fail_on("features", OperationKind::Insert);

        let result = database
            .collection("features")
            .insert_one(doc! {"id": "f"})
            .await;

        assert!(matches!(result, Err(StoreError::Operation { .. })));
        assert_eq!(database.writes().len(), 1);
        assert!(database.documents("features").is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_set_updates() {
        let database = MemoryDatabase::new();
        let result = database
            .collection("users")
            .update_one(doc! {"id": "u"}, doc! {"$inc": {"__v": 1}})
            .await;
        assert!(matches!(result, Err(StoreError::UnsupportedUpdate(_))));
    }
}
