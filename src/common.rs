//! Non-paginated queries and reconciliation of plain list/object results
//!
//! [`CommonQuery`] is the counterpart of [`RelayQuery`](crate::query::RelayQuery)
//! for results that are not connections: a single entity or a bare array
//! under one top-level field.

use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{self, CacheKey, CacheStore};
use crate::query::QueryStatus;
use crate::reconcile::{mutation_result, reset_field, InsertPosition, ReconcileOptions};
use crate::result::ResultProjector;
use crate::transport::{QueryRequest, Transport};
use crate::types::Variables;
use crate::RelayError;

fn shape_error(field: &str, expected: &str) -> RelayError {
    RelayError::ShapeError(format!("cached field '{field}' is not {expected}"))
}

fn same_id(item: &Value, id: &Value) -> bool {
    item.get("id") == Some(id)
}

/// Add the entities under `mutation_result[key]` to the cached array
pub fn add_items(
    cached: Value,
    mutation: &Value,
    key: Option<&str>,
    position: InsertPosition,
) -> crate::Result<Value> {
    let (Some(result), Some(key)) = (mutation_result(mutation), key) else {
        return Ok(cached);
    };
    let items = match result.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => return Ok(cached),
        Some(item) => vec![item.clone()],
    };

    let mut cached = cached;
    if let Some((field, value)) = cached.as_object_mut().and_then(|data| data.iter_mut().next()) {
        let list = value
            .as_array_mut()
            .ok_or_else(|| shape_error(field, "a list"))?;
        match position {
            InsertPosition::Start => {
                list.splice(0..0, items);
            }
            InsertPosition::End => list.extend(items),
        }
    }
    Ok(cached)
}

/// Replace the cached array element with the same `id`, or merge into a cached object
pub fn change_item(cached: Value, mutation: &Value, key: Option<&str>) -> crate::Result<Value> {
    let Some(changed) = mutation_result(mutation)
        .zip(key)
        .and_then(|(result, key)| result.get(key))
        .filter(|changed| !changed.is_null())
    else {
        return Ok(cached);
    };

    let mut cached = cached;
    if let Some((field, value)) = cached.as_object_mut().and_then(|data| data.iter_mut().next()) {
        match value {
            Value::Array(list) => {
                let id = changed.get("id").filter(|id| !id.is_null());
                match id.and_then(|id| list.iter_mut().find(|item| same_id(item, id))) {
                    Some(item) => *item = changed.clone(),
                    None => debug!(field = %field, "changed item is not cached"),
                }
            }
            Value::Object(object) => {
                if let Some(fields) = changed.as_object() {
                    for (name, field_value) in fields {
                        object.insert(name.clone(), field_value.clone());
                    }
                }
            }
            other => *other = changed.clone(),
        }
    }
    Ok(cached)
}

/// Remove cached array elements whose `id` matches the mutation result's `id`
pub fn delete_item(cached: Value, mutation: &Value) -> crate::Result<Value> {
    let Some(id) = mutation_result(mutation)
        .and_then(|result| result.get("id"))
        .filter(|id| !id.is_null())
        .cloned()
    else {
        return Ok(cached);
    };

    let mut cached = cached;
    if let Some((field, value)) = cached.as_object_mut().and_then(|data| data.iter_mut().next()) {
        value
            .as_array_mut()
            .ok_or_else(|| shape_error(field, "a list"))?
            .retain(|item| !same_id(item, &id));
    }
    Ok(cached)
}

/// Query whose result is a plain value rather than a connection
pub struct CommonQuery<T, C> {
    transport: T,
    cache: C,
    document: String,
    variables: Variables,
    projector: ResultProjector,
    status: Mutex<QueryStatus>,
}

impl<T, C> CommonQuery<T, C>
where
    T: Transport,
    C: CacheStore,
{
    pub fn new(transport: T, cache: C, document: impl Into<String>, variables: Variables) -> Self {
        Self {
            transport,
            cache,
            document: document.into(),
            variables,
            projector: ResultProjector::default(),
            status: Mutex::new(QueryStatus::Idle),
        }
    }

    pub fn with_projector(mut self, projector: ResultProjector) -> Self {
        self.projector = projector;
        self
    }

    fn set_status(&self, status: QueryStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn status(&self) -> QueryStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.document.as_str(), &self.variables)
    }

    /// Run the query and store its result
    pub async fn load(&self) -> crate::Result<()> {
        self.set_status(QueryStatus::Loading);
        let request = QueryRequest::new(self.document.as_str(), self.variables.clone());

        match self.transport.execute(request).await {
            Ok(data) => {
                self.cache.set(&self.cache_key(), data);
                self.set_status(QueryStatus::Loaded);
                Ok(())
            }
            Err(error) => {
                warn!(%error, query = %self.document, "query failed");
                self.set_status(QueryStatus::Failed(error.to_string()));
                Err(error)
            }
        }
    }

    /// Projected result; the projector's default until the query has loaded
    pub fn data(&self) -> Value {
        self.projector.project(self.cache.get(&self.cache_key()).as_ref())
    }

    pub fn data_as<N: DeserializeOwned>(&self) -> crate::Result<N> {
        serde_json::from_value(self.data()).map_err(|e| RelayError::ShapeError(e.to_string()))
    }

    /// Apply a custom transform to the cached result
    pub fn update<F>(&self, strict: bool, transform: F) -> crate::Result<()>
    where
        F: FnOnce(Value) -> crate::Result<Value>,
    {
        cache::update(&self.cache, &self.cache_key(), strict, transform)
    }

    pub fn add_update(&self, mutation: &Value, options: &ReconcileOptions) -> crate::Result<()> {
        self.update(options.strict, |cached| {
            add_items(cached, mutation, options.key.as_deref(), options.position)
        })
    }

    pub fn change_update(&self, mutation: &Value, options: &ReconcileOptions) -> crate::Result<()> {
        self.update(options.strict, |cached| {
            change_item(cached, mutation, options.key.as_deref())
        })
    }

    pub fn reset_update(&self, mutation: &Value, strict: bool) -> crate::Result<()> {
        self.update(strict, |cached| reset_field(cached, mutation))
    }

    pub fn delete_update(&self, mutation: &Value, strict: bool) -> crate::Result<()> {
        self.update(strict, |cached| delete_item(cached, mutation))
    }
}
