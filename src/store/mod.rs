//! Document store collaborator. The application core only ever talks to
//! this trait: keyed documents grouped into named collections, array
//! fields mutated by value, and queries that can be subscribed to as a
//! stream of immutable snapshots.

pub mod json;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

use crate::error::AppError;

pub fn encode<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|err| AppError::Other(err.into()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

impl Document {
    /// Decodes the fields into a typed record. The document key always wins
    /// over any `id` field stored inside the document body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        let mut fields = self.fields.clone();
        if let Some(obj) = fields.as_object_mut() {
            obj.insert("id".to_string(), Value::String(self.id.clone()));
        }
        serde_json::from_value(fields).map_err(|err| AppError::Other(err.into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A collection reference plus equality filters, ordering and a result cap.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by_asc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some((field.into(), Direction::Ascending));
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some((field.into(), Direction::Descending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Point-in-time result of a query. Snapshots pushed through a
/// subscription are monotonic per subscription: a later snapshot always
/// reflects at least as new a state as an earlier one.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub docs: Vec<Document>,
}

impl Snapshot {
    /// Decodes every document, skipping (and logging) malformed ones so a
    /// single bad record cannot take down a whole derived view.
    pub fn decode_all<T: DeserializeOwned>(&self) -> Vec<T> {
        self.docs
            .iter()
            .filter_map(|doc| match doc.decode::<T>() {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(id = %doc.id, "skipping malformed document: {err}");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document by key.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError>;

    /// Add a document to a collection; the store assigns the key.
    async fn add(&self, collection: &str, fields: Value) -> Result<Document, AppError>;

    /// Write a document under a caller-chosen key, merging into any
    /// existing fields.
    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<(), AppError>;

    /// Merge fields into an existing document; fails with `NotFound` when
    /// the key is absent.
    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<(), AppError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError>;

    /// Append values to an array field, skipping values already present
    /// (value equality).
    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), AppError>;

    /// Remove all occurrences of the given values from an array field
    /// (value equality).
    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), AppError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, AppError>;

    /// Subscribe to a query. The receiver starts with the current result
    /// and is woken with a fresh snapshot after every relevant change.
    async fn subscribe(&self, query: Query) -> watch::Receiver<Snapshot>;
}
