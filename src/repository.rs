use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::marker::PhantomData;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{TableDb, UserDb},
    store::{Filter, StoreState},
};

/// Document
///
/// A typed record that can live in a collection. The id is duplicated into the stored body
/// as the `id` field so it can be filtered on like any other field.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    fn id(&self) -> Uuid;
}

/// Filter matching the document whose `id` field equals `id`.
pub fn id_filter(id: Uuid) -> Filter {
    let mut filter = Filter::new();
    filter.insert("id".to_string(), Value::String(id.to_string()));
    filter
}

/// Crud
///
/// Generic create/read/update/delete over one named collection of the document store.
/// Every collection-backed repository is either this type directly or a thin wrapper
/// around it. Cloning is cheap: the store is shared behind an `Arc`.
pub struct Crud<T> {
    store: StoreState,
    collection: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Crud<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            collection: self.collection.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Crud<T> {
    pub fn new(store: StoreState, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            _marker: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn create(&self, doc: T) -> Result<T, StoreError> {
        let body = serde_json::to_value(&doc)?;
        self.store.insert(&self.collection, doc.id(), body).await?;
        Ok(doc)
    }

    /// create_unique
    ///
    /// Like `create`, but returns `None` without storing anything when another document
    /// already has the same value in the `key` field.
    pub async fn create_unique(&self, doc: T, key: &str) -> Result<Option<T>, StoreError> {
        let body = serde_json::to_value(&doc)?;
        let inserted = self
            .store
            .insert_unique(&self.collection, doc.id(), body, key)
            .await?;
        Ok(inserted.then_some(doc))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        self.get_by(&id_filter(id)).await
    }

    pub async fn get_by(&self, filter: &Filter) -> Result<Option<T>, StoreError> {
        let found = self.store.find_one(&self.collection, filter).await?;
        Ok(found.map(serde_json::from_value).transpose()?)
    }

    pub async fn list(&self, filter: &Filter, skip: i64, limit: i64) -> Result<Vec<T>, StoreError> {
        self.store
            .find_many(&self.collection, filter, skip, limit)
            .await?
            .into_iter()
            .map(|body| serde_json::from_value(body).map_err(StoreError::from))
            .collect()
    }

    /// update
    ///
    /// Writes the fields present in the serialized `patch` onto the first matching
    /// document. Fields the patch omits (e.g. `None` with `skip_serializing_if`) are kept.
    pub async fn update<P: Serialize>(&self, filter: &Filter, patch: &P) -> Result<Option<T>, StoreError> {
        let Value::Object(fields) = serde_json::to_value(patch)? else {
            return Err(StoreError::NotAnObject);
        };
        let updated = self.store.update_one(&self.collection, filter, fields).await?;
        Ok(updated.map(serde_json::from_value).transpose()?)
    }

    pub async fn delete(&self, filter: &Filter) -> Result<bool, StoreError> {
        self.store.delete_one(&self.collection, filter).await
    }
}

/// UserRepository
///
/// The user collection. Adds lookups by email and the email-unique insert that
/// registration relies on.
#[derive(Clone)]
pub struct UserRepository {
    crud: Crud<UserDb>,
}

impl UserRepository {
    pub fn new(store: StoreState, collection: impl Into<String>) -> Self {
        Self {
            crud: Crud::new(store, collection),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<UserDb>, StoreError> {
        self.crud.get(id).await
    }

    /// Case-insensitive: emails are stored lower-cased.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserDb>, StoreError> {
        let mut filter = Filter::new();
        filter.insert("email".to_string(), Value::String(email.to_lowercase()));
        self.crud.get_by(&filter).await
    }

    /// Stores `user` unless its email is already registered, in which case `None` is returned.
    pub async fn create(&self, user: UserDb) -> Result<Option<UserDb>, StoreError> {
        self.crud.create_unique(user, "email").await
    }
}

/// TableRepository
///
/// The table collection. Plain CRUD with no table-specific behavior.
pub type TableRepository = Crud<TableDb>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    fn table(owner_id: Uuid, name: &str) -> TableDb {
        TableDb {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            description: None,
            data: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user(email: &str) -> UserDb {
        UserDb {
            id: Uuid::new_v4(),
            email: email.to_string(),
            hashed_password: "hash".to_string(),
            full_name: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_crud_create_get_delete() {
        let tables = TableRepository::new(Arc::new(InMemoryStore::new()), "tables");
        let created = tables.create(table(Uuid::new_v4(), "inventory")).await.unwrap();

        let fetched = tables.get(created.id).await.unwrap();
        assert_eq!(fetched, Some(created.clone()));

        assert!(tables.delete(&id_filter(created.id)).await.unwrap());
        assert!(tables.get(created.id).await.unwrap().is_none());
        assert!(!tables.delete(&id_filter(created.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_crud_update_keeps_omitted_fields() {
        let tables = TableRepository::new(Arc::new(InMemoryStore::new()), "tables");
        let mut original = table(Uuid::new_v4(), "before");
        original.description = Some("kept".to_string());
        let created = tables.create(original).await.unwrap();

        let updated = tables
            .update(&id_filter(created.id), &json!({ "name": "after" }))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "after");
        assert_eq!(updated.description.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_crud_update_rejects_non_object_patch() {
        let tables = TableRepository::new(Arc::new(InMemoryStore::new()), "tables");
        let result = tables.update(&Filter::new(), &"not an object").await;
        assert!(matches!(result, Err(StoreError::NotAnObject)));
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store: StoreState = Arc::new(InMemoryStore::new());
        let first = TableRepository::new(store.clone(), "tables");
        let second = TableRepository::new(store, "archived_tables");

        let created = first.create(table(Uuid::new_v4(), "a")).await.unwrap();
        assert_eq!(second.collection(), "archived_tables");
        assert!(second.get(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_repository_enforces_unique_email() {
        let store = InMemoryStore::new();
        let users = UserRepository::new(Arc::new(store.clone()), "users");

        assert!(users.create(user("ada@example.com")).await.unwrap().is_some());
        assert!(users.create(user("ada@example.com")).await.unwrap().is_none());
        assert_eq!(store.count("users").await, 1);

        let found = users.get_by_email("ADA@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.email), Some("ada@example.com".to_string()));
    }
}
