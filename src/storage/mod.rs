//! # Document Store
//!
//! Minimal collection-oriented interface over the GrowthBook MongoDB store.
//!
//! The reconciler only needs keyed reads and single-document writes, so the
//! seam is five operations on a named collection plus connect/disconnect.
//! [`mongodb::MongoDatabaseProvider`] talks to a real server,
//! [`memory::MemoryDatabaseProvider`] keeps documents in process and records
//! every operation.

pub mod memory;
pub mod mongodb;

use ::mongodb::bson::Document;
use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

pub use self::memory::{MemoryDatabase, MemoryDatabaseProvider, OperationKind, RecordedOperation};
pub use self::mongodb::MongoDatabaseProvider;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store uri does not name a database")]
    MissingDatabase,
    #[error(transparent)]
    Driver(#[from] ::mongodb::error::Error),
    #[error("failed to encode document: {0}")]
    Encode(#[from] ::mongodb::bson::ser::Error),
    #[error("failed to decode document: {0}")]
    Decode(#[from] ::mongodb::bson::de::Error),
    #[error("unsupported update document: {0}")]
    UnsupportedUpdate(String),
    #[error("{operation} on collection {collection} failed: {message}")]
    Operation {
        collection: String,
        operation: &'static str,
        message: String,
    },
}

/// Username and password presented to the store
pub struct StoreCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A named collection of BSON documents
#[async_trait]
pub trait Collection: Send + Sync {
    async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError>;

    async fn insert_one(&self, document: Document) -> Result<(), StoreError>;

    /// Apply `update` (a `$set` document) to the first document matching `filter`
    async fn update_one(&self, filter: Document, update: Document) -> Result<(), StoreError>;

    async fn delete_one(&self, filter: Document) -> Result<(), StoreError>;

    /// Returns the number of deleted documents
    async fn delete_many(&self, filter: Document) -> Result<u64, StoreError>;
}

/// An open connection to one database
#[async_trait]
pub trait Database: Send + Sync {
    fn collection(&self, name: &str) -> Box<dyn Collection>;

    async fn disconnect(&self) -> Result<(), StoreError>;
}

/// Opens a [`Database`] per reconcile pass
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    /// Connect to the database named by the path of `uri`
    async fn connect(
        &self,
        uri: &str,
        credentials: Option<StoreCredentials>,
    ) -> Result<Box<dyn Database>, StoreError>;
}
