use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, postgres::PgPoolOptions, types::Json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

/// Filter
///
/// Top-level field equality. A document matches when every key in the filter is present
/// in the document with an equal value. An empty filter matches everything.
pub type Filter = Map<String, Value>;

// 1. DocumentStore Contract
/// DocumentStore
///
/// The database handle handed to repositories. Documents are JSON objects grouped into
/// named collections and addressed by a UUID. Implementations must be shareable across
/// request tasks, hence `Send + Sync`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a new document under `id`.
    async fn insert(&self, collection: &str, id: Uuid, doc: Value) -> Result<(), StoreError>;

    /// Stores a new document unless another document in the collection already holds the
    /// same value for `key`. Returns `false` (and stores nothing) on a clash.
    ///
    /// The check and the insert are atomic with respect to other `insert_unique` calls.
    async fn insert_unique(
        &self,
        collection: &str,
        id: Uuid,
        doc: Value,
        key: &str,
    ) -> Result<bool, StoreError>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError>;

    /// Matching documents in insertion order, after skipping `skip` and keeping at most `limit`.
    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Value>, StoreError>;

    /// Shallow-merges `patch` into the first matching document and returns the result.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError>;

    /// Removes the first matching document. Returns whether anything was removed.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError>;
}

/// StoreState
///
/// The concrete type used to share the database handle across the application state.
pub type StoreState = Arc<dyn DocumentStore>;

// 2. The Real Implementation (Postgres JSONB)
/// PostgresStore
///
/// Keeps every collection in the single `documents` table created by the embedded
/// migrations. Filters are evaluated with JSONB containment (`body @> filter`), which the
/// GIN index on `body` serves.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an already initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// connect
    ///
    /// Opens the pool and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn insert(&self, collection: &str, id: Uuid, doc: Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id)
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// insert_unique
    ///
    /// Takes a transaction-scoped advisory lock keyed on collection, field and value before
    /// the existence check, so two concurrent registrations of the same email serialize
    /// here and the second one sees the first.
    async fn insert_unique(
        &self,
        collection: &str,
        id: Uuid,
        doc: Value,
        key: &str,
    ) -> Result<bool, StoreError> {
        let key_value = match doc.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Err(StoreError::MissingKey(key.to_string())),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{collection}:{key}:{key_value}"))
            .execute(&mut *tx)
            .await?;

        let mut probe = Filter::new();
        probe.insert(key.to_string(), doc[key].clone());
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM documents WHERE collection = $1 AND body @> $2)",
        )
        .bind(collection)
        .bind(Json(Value::Object(probe)))
        .fetch_one(&mut *tx)
        .await?;

        if taken {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id)
            .bind(Json(doc))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        let row: Option<Json<Value>> = sqlx::query_scalar(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(collection)
        .bind(Json(Value::Object(filter.clone())))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(body)| body))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Value>, StoreError> {
        let rows: Vec<Json<Value>> = sqlx::query_scalar(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY created_at, id
            OFFSET $3 LIMIT $4
            "#,
        )
        .bind(collection)
        .bind(Json(Value::Object(filter.clone())))
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(body)| body).collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        // `||` on two JSONB objects is a shallow merge, right side wins.
        let row: Option<Json<Value>> = sqlx::query_scalar(
            r#"
            UPDATE documents SET body = body || $3, updated_at = NOW()
            WHERE (collection, id) = (
                SELECT collection, id FROM documents
                WHERE collection = $1 AND body @> $2
                ORDER BY created_at, id
                LIMIT 1
            )
            RETURNING body
            "#,
        )
        .bind(collection)
        .bind(Json(Value::Object(filter.clone())))
        .bind(Json(Value::Object(patch)))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(body)| body))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE (collection, id) = (
                SELECT collection, id FROM documents
                WHERE collection = $1 AND body @> $2
                ORDER BY created_at, id
                LIMIT 1
            )
            "#,
        )
        .bind(collection)
        .bind(Json(Value::Object(filter.clone())))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// matches
///
/// Equality check of every filter field against the document's top-level fields.
fn matches(doc: &Value, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(field, expected)| doc.get(field) == Some(expected))
}

// 3. The In-Memory Implementation (Tests and local runs without a database)
/// InMemoryStore
///
/// Collections are vectors in insertion order behind a single async `RwLock`, so every
/// write, including the check in `insert_unique`, is atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<(Uuid, Value)>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, collection: &str, id: Uuid, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject);
        }
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push((id, doc));
        Ok(())
    }

    async fn insert_unique(
        &self,
        collection: &str,
        id: Uuid,
        doc: Value,
        key: &str,
    ) -> Result<bool, StoreError> {
        let Some(key_value) = doc.get(key).cloned() else {
            return Err(StoreError::MissingKey(key.to_string()));
        };

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|(_, existing)| existing.get(key) == Some(&key_value)) {
            return Ok(false);
        }
        docs.push((id, doc));
        Ok(true)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(_, doc)| matches(doc, filter))
                .map(|(_, doc)| doc.clone())
        }))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(vec![]);
        };
        Ok(docs
            .iter()
            .filter(|(_, doc)| matches(doc, filter))
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some((_, doc)) = docs.iter_mut().find(|(_, doc)| matches(doc, filter)) else {
            return Ok(None);
        };
        let object = doc.as_object_mut().ok_or(StoreError::NotAnObject)?;
        object.extend(patch);
        Ok(Some(doc.clone()))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        match docs.iter().position(|(_, doc)| matches(doc, filter)) {
            Some(index) => {
                docs.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
