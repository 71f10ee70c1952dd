use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

use serde_json::Value;
use tokio::{
    fs,
    sync::{watch, Mutex, RwLock},
};
use uuid::Uuid;

use async_trait::async_trait;

use crate::{
    error::AppError,
    store::{Direction, Document, DocumentStore, Query, Snapshot},
};

type Collections = HashMap<String, BTreeMap<String, Value>>;

struct Watcher {
    query: Query,
    tx: watch::Sender<Snapshot>,
}

/// In-process document store with one pretty-printed JSON file per
/// collection. With no data root it runs purely in memory, which is what
/// the test suites use.
pub struct JsonStore {
    root: Option<PathBuf>,
    collections: RwLock<Collections>,
    watchers: Mutex<Vec<Watcher>>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self {
            root: None,
            collections: RwLock::new(HashMap::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Opens (or creates) a store rooted at `root`, loading every
    /// `<collection>.json` file found there.
    pub async fn open(root: PathBuf) -> Result<Self, AppError> {
        fs::create_dir_all(&root).await?;

        let mut collections = Collections::new();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let raw = fs::read(&path).await?;
            if raw.is_empty() {
                continue;
            }
            let docs: BTreeMap<String, Value> =
                serde_json::from_slice(&raw).map_err(|err| AppError::Other(err.into()))?;
            collections.insert(name.to_string(), docs);
        }

        Ok(Self {
            root: Some(root),
            collections: RwLock::new(collections),
            watchers: Mutex::new(Vec::new()),
        })
    }

    async fn persist(&self, collection: &str, docs: &BTreeMap<String, Value>) -> Result<(), AppError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let data = serde_json::to_vec_pretty(docs).map_err(|err| AppError::Other(err.into()))?;
        fs::write(root.join(format!("{collection}.json")), data)
            .await
            .map_err(|err| AppError::TransientWrite(err.to_string()))
    }

    /// Applies a mutation under the write lock, persists the collection,
    /// then pushes fresh snapshots to every affected subscription.
    async fn mutate<R, F>(&self, collection: &str, apply: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut BTreeMap<String, Value>) -> Result<R, AppError>,
    {
        let out = {
            let mut all = self.collections.write().await;
            let docs = all.entry(collection.to_string()).or_default();
            let out = apply(docs)?;
            self.persist(collection, docs).await?;
            out
        };
        self.notify(collection).await;
        Ok(out)
    }

    async fn notify(&self, collection: &str) {
        let all = self.collections.read().await;
        let mut watchers = self.watchers.lock().await;
        watchers.retain(|watcher| !watcher.tx.is_closed());
        for watcher in watchers.iter() {
            if watcher.query.collection == collection {
                let _ = watcher.tx.send(eval_query(&all, &watcher.query));
            }
        }
    }
}

fn eval_query(all: &Collections, query: &Query) -> Snapshot {
    let mut docs: Vec<Document> = all
        .get(&query.collection)
        .map(|docs| {
            docs.iter()
                .filter(|(_, fields)| {
                    query
                        .filters
                        .iter()
                        .all(|(field, value)| fields.get(field) == Some(value))
                })
                .map(|(id, fields)| Document {
                    id: id.clone(),
                    fields: fields.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    if let Some((field, direction)) = &query.order_by {
        docs.sort_by(|a, b| {
            let ordering = compare_values(
                a.fields.get(field).unwrap_or(&Value::Null),
                b.fields.get(field).unwrap_or(&Value::Null),
            );
            match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });
    }

    if let Some(limit) = query.limit {
        docs.truncate(limit);
    }

    Snapshot { docs }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn merge_fields(target: &mut Value, incoming: Value) {
    match (target.as_object_mut(), incoming) {
        (Some(existing), Value::Object(new_fields)) => {
            for (key, value) in new_fields {
                existing.insert(key, value);
            }
        }
        (_, incoming) => *target = incoming,
    }
}

#[async_trait]
impl DocumentStore for JsonStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        let all = self.collections.read().await;
        Ok(all.get(collection).and_then(|docs| {
            docs.get(id).map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            })
        }))
    }

    async fn add(&self, collection: &str, fields: Value) -> Result<Document, AppError> {
        let id = Uuid::new_v4().to_string();
        let stored = fields.clone();
        self.mutate(collection, |docs| {
            docs.insert(id.clone(), stored);
            Ok(())
        })
        .await?;
        Ok(Document { id, fields })
    }

    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<(), AppError> {
        self.mutate(collection, |docs| {
            match docs.get_mut(id) {
                Some(existing) => merge_fields(existing, fields),
                None => {
                    docs.insert(id.to_string(), fields);
                }
            }
            Ok(())
        })
        .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Value) -> Result<(), AppError> {
        self.mutate(collection, |docs| {
            let existing = docs.get_mut(id).ok_or(AppError::NotFound)?;
            merge_fields(existing, fields);
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.mutate(collection, |docs| {
            docs.remove(id);
            Ok(())
        })
        .await
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), AppError> {
        self.mutate(collection, |docs| {
            let existing = docs.get_mut(id).ok_or(AppError::NotFound)?;
            let obj = existing
                .as_object_mut()
                .ok_or_else(|| AppError::BadRequest("document is not an object".into()))?;
            let entry = obj.entry(field.to_string()).or_insert(Value::Array(vec![]));
            if !entry.is_array() {
                *entry = Value::Array(vec![]);
            }
            let items = entry.as_array_mut().expect("just coerced to an array");
            for value in values {
                if !items.contains(&value) {
                    items.push(value);
                }
            }
            Ok(())
        })
        .await
    }

    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), AppError> {
        self.mutate(collection, |docs| {
            let existing = docs.get_mut(id).ok_or(AppError::NotFound)?;
            if let Some(items) = existing.get_mut(field).and_then(|v| v.as_array_mut()) {
                items.retain(|item| !values.contains(item));
            }
            Ok(())
        })
        .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, AppError> {
        let all = self.collections.read().await;
        Ok(eval_query(&all, query).docs)
    }

    async fn subscribe(&self, query: Query) -> watch::Receiver<Snapshot> {
        let initial = {
            let all = self.collections.read().await;
            eval_query(&all, &query)
        };
        let (tx, rx) = watch::channel(initial);
        self.watchers.lock().await.push(Watcher { query, tx });
        rx
    }
}
