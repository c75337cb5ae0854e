//! MongoDB client and collection wrapper
//!
//! Every call on a `MongoCollection` is bounded by the configured store
//! timeout. A timeout becomes `AppError::Unavailable`, a duplicate-key
//! violation becomes `AppError::Conflict`, anything else `AppError::Database`.

use std::future::IntoFuture;
use std::time::Duration;

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument, UpdateModifications},
    results::{DeleteResult, UpdateResult},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::db::schemas::Metadata;
use crate::types::AppError;

/// MongoDB duplicate key error code
const DUPLICATE_KEY: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
    timeout: Duration,
}

impl MongoClient {
    /// Connect and ping. `timeout` bounds every later collection call.
    pub async fn new(uri: &str, db_name: &str, timeout: Duration) -> Result<Self, AppError> {
        info!("Connecting to MongoDB at {}", redact_uri(uri));

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        let mongo = Self {
            client,
            db_name: db_name.to_string(),
            timeout,
        };
        mongo.ping().await?;

        info!("Connected to MongoDB database '{}'", db_name);
        Ok(mongo)
    }

    /// Round-trip to the server, bounded by the store timeout
    pub async fn ping(&self) -> Result<(), AppError> {
        let db = self.client.database(&self.db_name);
        let cmd = db.run_command(doc! { "ping": 1 });
        bounded(self.timeout, "ping", cmd).await.map(|_| ())
    }

    /// Get a typed collection and apply its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, AppError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name, self.timeout).await
    }

    /// Release pooled connections
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
    timeout: Duration,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection {
            inner: collection,
            timeout,
        };

        mongo_collection.apply_indexes().await?;
        debug!(collection = collection_name, "Indexes applied");

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), AppError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        bounded(self.timeout, "create_indexes", self.inner.create_indexes(indices))
            .await
            .map(|_| ())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, AppError> {
        let metadata = item.mut_metadata();
        let now = DateTime::now();
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);

        let result = bounded(self.timeout, "insert_one", self.inner.insert_one(item)).await?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| AppError::Database("Failed to get inserted ID".into()))
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, AppError> {
        bounded(self.timeout, "find_one", self.inner.find_one(filter)).await
    }

    /// Find one document, decoding into a projection type `P`
    pub async fn find_one_projected<P>(
        &self,
        filter: Document,
        projection: Document,
    ) -> Result<Option<P>, AppError>
    where
        P: DeserializeOwned + Unpin + Send + Sync,
    {
        let coll = self.inner.clone_with_type::<P>();
        bounded(
            self.timeout,
            "find_one",
            coll.find_one(filter).projection(projection),
        )
        .await
    }

    /// Does any document match
    pub async fn exists(&self, filter: Document) -> Result<bool, AppError> {
        let count = bounded(
            self.timeout,
            "count_documents",
            self.inner.count_documents(filter).limit(1),
        )
        .await?;
        Ok(count > 0)
    }

    /// Atomic single-document update; stamps `updatedAt`
    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, AppError> {
        let update = with_updated_at(update);
        bounded(
            self.timeout,
            "update_one",
            self.inner.update_one(filter, UpdateModifications::Document(update)),
        )
        .await
    }

    /// Atomic update returning the post-image decoded as `P` through `projection`
    pub async fn find_one_and_update_projected<P>(
        &self,
        filter: Document,
        update: Document,
        projection: Document,
    ) -> Result<Option<P>, AppError>
    where
        P: DeserializeOwned + Unpin + Send + Sync,
    {
        let coll = self.inner.clone_with_type::<P>();
        let update = with_updated_at(update);
        bounded(
            self.timeout,
            "find_one_and_update",
            coll.find_one_and_update(filter, update)
                .projection(projection)
                .return_document(ReturnDocument::After),
        )
        .await
    }

    /// Delete one document by filter
    pub async fn delete_one(&self, filter: Document) -> Result<DeleteResult, AppError> {
        bounded(self.timeout, "delete_one", self.inner.delete_one(filter)).await
    }

    /// Run a pipeline and collect every output document
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, AppError> {
        let run = async {
            let cursor = self.inner.aggregate(pipeline).await?;
            cursor.try_collect::<Vec<Document>>().await
        };
        bounded(self.timeout, "aggregate", run).await
    }
}

/// Add `updatedAt` to the `$set` stage of an update document
fn with_updated_at(mut update: Document) -> Document {
    let now = DateTime::now();
    match update.get_document_mut("$set") {
        Ok(set) => {
            set.insert("updatedAt", now);
        }
        Err(_) => {
            update.insert("$set", doc! { "updatedAt": now });
        }
    }
    update
}

/// Run a driver call under the store timeout and map its failure
async fn bounded<F, R>(timeout: Duration, op: &'static str, call: F) -> Result<R, AppError>
where
    F: IntoFuture<Output = Result<R, MongoError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(map_mongo_error(op, err)),
        Err(_) => Err(AppError::Unavailable(format!(
            "{} exceeded {}ms",
            op,
            timeout.as_millis()
        ))),
    }
}

fn map_mongo_error(op: &str, err: MongoError) -> AppError {
    if is_duplicate_key(&err) {
        return AppError::Conflict("User with this email or username already exists".into());
    }
    AppError::Database(format!("{} failed: {}", op, err))
}

/// Connection string with any `user:pass@` userinfo masked, for logging
pub fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
        None => uri.to_string(),
    }
}

/// Unique index violation, from either a write or a findAndModify command
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY,
        _ => false,
    }
}
