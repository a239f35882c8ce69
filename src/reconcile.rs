//! Mutation reconciliation for connection-shaped cached results
//!
//! Each function takes the previously cached `data` object (keyed by a single
//! connection field) and the mutation's `data` object (keyed by a single field
//! naming the affected entity or entity list) and returns the patched result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::types::first_field;
use crate::RelayError;

/// Where added edges go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    #[default]
    Start,
    End,
}

/// Reconciliation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Fail with `CacheMiss` when the query has no cached result
    pub strict: bool,
    pub position: InsertPosition,
    /// Field inside the mutation result holding the entity, if nested.
    ///
    /// With `None` the mutation's single field is the entity (or entity
    /// list). Servers that echo the list under the cached field name, as in
    /// `{ createUser: { users: [...] } }`, take `Some("users")`.
    pub key: Option<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            strict: true,
            position: InsertPosition::Start,
            key: None,
        }
    }
}

impl ReconcileOptions {
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }
}

/// The entity (or entity list) carried by a mutation `data` object
pub fn mutation_result(mutation: &Value) -> Option<&Value> {
    first_field(mutation)
        .map(|(_, value)| value)
        .filter(|value| !value.is_null())
}

fn select<'a>(result: &'a Value, key: Option<&str>) -> Option<&'a Value> {
    match key {
        Some(key) => result.get(key).filter(|value| !value.is_null()),
        None => Some(result),
    }
}

fn shape_error(field: &str, expected: &str) -> RelayError {
    RelayError::ShapeError(format!("cached field '{field}' is not {expected}"))
}

fn data_object(cached: Value) -> crate::Result<Map<String, Value>> {
    match cached {
        Value::Object(data) => Ok(data),
        other => Err(RelayError::ShapeError(format!(
            "cached result is not an object: {other}"
        ))),
    }
}

fn edges_mut<'a>(field: &str, connection: &'a mut Value) -> crate::Result<&'a mut Vec<Value>> {
    let connection = connection
        .as_object_mut()
        .ok_or_else(|| shape_error(field, "a connection"))?;
    connection
        .entry("edges")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| shape_error(field, "a connection with an edge list"))
}

fn adjust_total_count(connection: &mut Value, added: usize, removed: usize) {
    let total = connection
        .get("totalCount")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let total = (total + added as u64).saturating_sub(removed as u64);
    connection["totalCount"] = Value::from(total);
}

fn edge_typename(edges: &[Value], node: &Value) -> Option<String> {
    match edges.first() {
        Some(edge) => edge
            .get("__typename")
            .and_then(Value::as_str)
            .map(str::to_owned),
        None => node
            .get("__typename")
            .and_then(Value::as_str)
            .map(|typename| format!("{typename}Edge")),
    }
}

fn node_id(edge: &Value) -> Option<&Value> {
    edge.get("node")
        .and_then(|node| node.get("id"))
        .filter(|id| !id.is_null())
}

/// Wrap the mutation's entities as edges and insert them into every cached connection
pub fn add_edges(
    cached: Value,
    mutation: &Value,
    key: Option<&str>,
    position: InsertPosition,
) -> crate::Result<Value> {
    let Some(result) = mutation_result(mutation) else {
        return Ok(cached);
    };
    let Some(entities) = select(result, key) else {
        return Ok(cached);
    };
    let nodes: Vec<Value> = match entities {
        Value::Array(nodes) => nodes.clone(),
        node => vec![node.clone()],
    };

    let mut data = data_object(cached)?;
    for (field, connection) in data.iter_mut() {
        let edges = edges_mut(field, connection)?;
        let new_edges: Vec<Value> = nodes
            .iter()
            .map(|node| {
                let mut edge = Map::new();
                edge.insert("node".to_string(), node.clone());
                if let Some(typename) = edge_typename(edges, node) {
                    edge.insert("__typename".to_string(), Value::String(typename));
                }
                Value::Object(edge)
            })
            .collect();

        let added = new_edges.len();
        match position {
            InsertPosition::Start => {
                edges.splice(0..0, new_edges);
            }
            InsertPosition::End => edges.extend(new_edges),
        }
        adjust_total_count(connection, added, 0);
    }

    Ok(Value::Object(data))
}

/// Shallow-merge the mutated entity onto the cached node with the same `id`
pub fn change_edge(cached: Value, mutation: &Value, key: Option<&str>) -> crate::Result<Value> {
    let Some(changed) = mutation_result(mutation).and_then(|result| select(result, key)) else {
        return Ok(cached);
    };
    let (Some(fields), Some(id)) = (changed.as_object(), changed.get("id").filter(|id| !id.is_null()))
    else {
        return Ok(cached);
    };

    let mut data = data_object(cached)?;
    if let Some((field, connection)) = data.iter_mut().next() {
        let edges = edges_mut(field, connection)?;
        let target = edges
            .iter_mut()
            .find(|edge| node_id(edge) == Some(id))
            .and_then(|edge| edge.get_mut("node"))
            .and_then(Value::as_object_mut);

        match target {
            Some(node) => {
                for (name, value) in fields {
                    node.insert(name.clone(), value.clone());
                }
            }
            None => debug!(field = %field, %id, "changed entity is not cached"),
        }
    }

    Ok(Value::Object(data))
}

/// Remove the cached edge whose node `id` matches the mutation result's `id`
pub fn delete_edge(cached: Value, mutation: &Value) -> crate::Result<Value> {
    let Some(id) = mutation_result(mutation)
        .and_then(|result| result.get("id"))
        .filter(|id| !id.is_null())
        .cloned()
    else {
        return Ok(cached);
    };

    let mut data = data_object(cached)?;
    if let Some((field, connection)) = data.iter_mut().next() {
        let edges = edges_mut(field, connection)?;
        let before = edges.len();
        edges.retain(|edge| node_id(edge) != Some(&id));
        let removed = before - edges.len();
        adjust_total_count(connection, 0, removed);
    }

    Ok(Value::Object(data))
}

/// Replace the cached top-level value with the mutation result's value for the same field
pub fn reset_field(cached: Value, mutation: &Value) -> crate::Result<Value> {
    let Some(result) = mutation_result(mutation) else {
        return Ok(cached);
    };

    let mut data = data_object(cached)?;
    if let Some((field, value)) = data.iter_mut().next() {
        match result.get(field.as_str()) {
            Some(replacement) => *value = replacement.clone(),
            None => debug!(field = %field, "mutation result has no value for cached field"),
        }
    }

    Ok(Value::Object(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_err;

    fn cached() -> Value {
        json!({
            "users": {
                "totalCount": 2,
                "edges": [{ "node": { "id": 1 } }, { "node": { "id": 2 } }]
            }
        })
    }

    #[test]
    fn test_add_prepends_and_counts() {
        let mutation = json!({ "createUser": { "id": 3 } });
        let updated = add_edges(cached(), &mutation, None, InsertPosition::Start).unwrap();
        assert_eq!(
            updated,
            json!({
                "users": {
                    "totalCount": 3,
                    "edges": [
                        { "node": { "id": 3 } },
                        { "node": { "id": 1 } },
                        { "node": { "id": 2 } }
                    ]
                }
            })
        );
    }

    #[test]
    fn test_add_appends_list_under_key() {
        let mutation = json!({ "importUsers": { "users": [{ "id": 3 }, { "id": 4 }] } });
        let updated = add_edges(cached(), &mutation, Some("users"), InsertPosition::End).unwrap();
        assert_eq!(updated["users"]["totalCount"], json!(4));
        let ids: Vec<&Value> = updated["users"]["edges"]
            .as_array()
            .unwrap()
            .iter()
            .map(|edge| &edge["node"]["id"])
            .collect();
        assert_eq!(ids, vec![&json!(1), &json!(2), &json!(3), &json!(4)]);
    }

    #[test]
    fn test_add_edge_typename() {
        let existing = json!({
            "users": { "totalCount": 1, "edges": [{ "node": { "id": 1 }, "__typename": "UserTypeEdge" }] }
        });
        let mutation = json!({ "createUser": { "id": 2, "__typename": "UserType" } });
        let updated = add_edges(existing, &mutation, None, InsertPosition::Start).unwrap();
        assert_eq!(updated["users"]["edges"][0]["__typename"], json!("UserTypeEdge"));

        let empty = json!({ "users": { "totalCount": 0, "edges": [] } });
        let updated = add_edges(empty, &mutation, None, InsertPosition::Start).unwrap();
        assert_eq!(updated["users"]["edges"][0]["__typename"], json!("UserTypeEdge"));
    }

    #[test]
    fn test_add_with_null_mutation_is_noop() {
        let mutation = json!({ "createUser": null });
        assert_eq!(
            add_edges(cached(), &mutation, None, InsertPosition::Start).unwrap(),
            cached()
        );
    }

    #[test]
    fn test_delete_removes_and_decrements() {
        let cached = json!({
            "users": {
                "totalCount": 3,
                "edges": [{ "node": { "id": 3 } }, { "node": { "id": 1 } }, { "node": { "id": 2 } }]
            }
        });
        let mutation = json!({ "deleteUser": { "id": 2 } });
        assert_eq!(
            delete_edge(cached, &mutation).unwrap(),
            json!({
                "users": {
                    "totalCount": 2,
                    "edges": [{ "node": { "id": 3 } }, { "node": { "id": 1 } }]
                }
            })
        );
    }

    #[test]
    fn test_delete_unknown_id_keeps_total() {
        let mutation = json!({ "deleteUser": { "id": 9 } });
        assert_eq!(delete_edge(cached(), &mutation).unwrap(), cached());
    }

    #[test]
    fn test_change_merges_fields() {
        let cached = json!({
            "users": {
                "totalCount": 2,
                "edges": [
                    { "node": { "id": 1, "name": "A", "email": "a@pleme.io" } },
                    { "node": { "id": 2, "name": "C" } }
                ]
            }
        });
        let mutation = json!({ "updateUser": { "id": 1, "name": "B" } });
        let updated = change_edge(cached, &mutation, None).unwrap();
        assert_eq!(
            updated["users"]["edges"][0]["node"],
            json!({ "id": 1, "name": "B", "email": "a@pleme.io" })
        );
        assert_eq!(updated["users"]["edges"][1]["node"], json!({ "id": 2, "name": "C" }));
    }

    #[test]
    fn test_change_reads_entity_under_cached_field_name() {
        let mutation = json!({ "renameUser": { "users": { "id": 2, "name": "Bo" } } });
        let updated = change_edge(cached(), &mutation, Some("users")).unwrap();
        assert_eq!(updated["users"]["edges"][1]["node"], json!({ "id": 2, "name": "Bo" }));
    }

    #[test]
    fn test_change_unknown_entity_is_noop() {
        let mutation = json!({ "updateUser": { "id": 7, "name": "Z" } });
        assert_eq!(change_edge(cached(), &mutation, None).unwrap(), cached());
    }

    #[test]
    fn test_reset_replaces_field() {
        let mutation = json!({
            "reorderUsers": { "users": { "totalCount": 1, "edges": [{ "node": { "id": 5 } }] } }
        });
        let updated = reset_field(cached(), &mutation).unwrap();
        assert_eq!(
            updated,
            json!({ "users": { "totalCount": 1, "edges": [{ "node": { "id": 5 } }] } })
        );
    }

    #[test]
    fn test_non_connection_cache_is_shape_error() {
        let mutation = json!({ "createUser": { "id": 3 } });
        assert_err!(add_edges(json!({ "users": 5 }), &mutation, None, InsertPosition::Start));
        assert_err!(add_edges(json!([1]), &mutation, None, InsertPosition::Start));
    }

    #[test]
    fn test_options_from_config() {
        let options: ReconcileOptions =
            serde_json::from_value(json!({ "position": "end" })).unwrap();
        assert!(options.strict);
        assert_eq!(options.position, InsertPosition::End);
        assert!(!ReconcileOptions::lenient().strict);
    }
}
