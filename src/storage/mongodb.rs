//! # MongoDB Store
//!
//! [`DatabaseProvider`] backed by the official MongoDB driver.

use crate::constants::STORE_APP_NAME;
use crate::storage::{Collection, Database, DatabaseProvider, StoreCredentials, StoreError};
use async_trait::async_trait;
use mongodb::bson::Document;
use mongodb::options::{ClientOptions, Credential};
use mongodb::Client;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct MongoDatabaseProvider;

#[async_trait]
impl DatabaseProvider for MongoDatabaseProvider {
    async fn connect(
        &self,
        uri: &str,
        credentials: Option<StoreCredentials>,
    ) -> Result<Box<dyn Database>, StoreError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some(STORE_APP_NAME.to_string());

        if let Some(credentials) = credentials {
            let mut credential = Credential::default();
            credential.username = Some(credentials.username);
            credential.password = Some(credentials.password.as_str().to_string());
            options.credential = Some(credential);
        }

        let client = Client::with_options(options)?;
        let database = client
            .default_database()
            .ok_or(StoreError::MissingDatabase)?;
        debug!(database = database.name(), "store.connected");

        Ok(Box::new(MongoDatabase { client, database }))
    }
}

struct MongoDatabase {
    client: Client,
    database: mongodb::Database,
}

#[async_trait]
impl Database for MongoDatabase {
    fn collection(&self, name: &str) -> Box<dyn Collection> {
        Box::new(MongoCollection {
            inner: self.database.collection::<Document>(name),
        })
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

struct MongoCollection {
    inner: mongodb::Collection<Document>,
}

#[async_trait]
impl Collection for MongoCollection {
    async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.find_one(filter).await?)
    }

    async fn insert_one(&self, document: Document) -> Result<(), StoreError> {
        self.inner.insert_one(document).await?;
        Ok(())
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<(), StoreError> {
        self.inner.update_one(filter, update).await?;
        Ok(())
    }

    async fn delete_one(&self, filter: Document) -> Result<(), StoreError> {
        self.inner.delete_one(filter).await?;
        Ok(())
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, StoreError> {
        Ok(self.inner.delete_many(filter).await?.deleted_count)
    }
}
