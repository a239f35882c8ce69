//! Connection-shaped result types shared by pagination and reconciliation

use async_graphql::SimpleObject;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query variables, keyed by variable name
pub type Variables = Map<String, Value>;

/// Page information
///
/// Flags stay `None` when a server response omits them. Locally created page
/// info starts optimistic (more pages might exist in both directions).
#[derive(SimpleObject, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_next_page: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_previous_page: Option<bool>,
}

impl PageInfo {
    /// Whether the server reported another page after this one
    pub fn has_next(&self) -> bool {
        self.has_next_page.unwrap_or(false)
    }

    /// Whether the server reported a page before this one
    pub fn has_previous(&self) -> bool {
        self.has_previous_page.unwrap_or(false)
    }
}

impl Default for PageInfo {
    fn default() -> Self {
        Self {
            start_cursor: None,
            end_cursor: None,
            has_next_page: Some(true),
            has_previous_page: Some(true),
        }
    }
}

/// Edge in a connection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Edge<T = Value> {
    pub node: T,
    #[serde(rename = "__typename", default, skip_serializing_if = "Option::is_none")]
    pub typename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl<T> Edge<T> {
    pub fn new(node: T) -> Self {
        Self {
            node,
            typename: None,
            cursor: None,
        }
    }
}

/// Connection (paginated result)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T = Value> {
    #[serde(rename = "__typename", default, skip_serializing_if = "Option::is_none")]
    pub typename: Option<String>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub edges: Vec<Edge<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageInfo>,
}

impl<T> Connection<T> {
    /// Create empty connection
    pub fn empty() -> Self {
        Self {
            typename: None,
            total_count: 0,
            edges: Vec::new(),
            page_info: None,
        }
    }

    /// Number of materialized edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Consume the connection, keeping only the nodes
    pub fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|edge| edge.node).collect()
    }
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Merge two variable sets; keys in `overrides` win on collision
pub fn merge_variables(base: &Variables, overrides: &Variables) -> Variables {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Value of the only top-level field of a GraphQL `data` object.
///
/// Mutation and query envelopes carry a single field; when there are several
/// the first in key order is used.
pub fn first_field(data: &Value) -> Option<(&String, &Value)> {
    data.as_object().and_then(|object| object.iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_from_server_json() {
        let conn: Connection = serde_json::from_value(json!({
            "__typename": "UserConnection",
            "totalCount": 3,
            "edges": [
                { "node": { "id": 1 }, "__typename": "UserEdge" },
                { "node": { "id": 2 }, "__typename": "UserEdge" }
            ],
            "pageInfo": { "hasNextPage": true, "endCursor": "YXJyYXljb25uZWN0aW9uOjE=" }
        }))
        .unwrap();

        assert_eq!(conn.total_count, 3);
        assert_eq!(conn.len(), 2);
        assert_eq!(conn.edges[0].typename.as_deref(), Some("UserEdge"));
        let page_info = conn.page_info.clone().unwrap();
        assert!(page_info.has_next());
        assert!(!page_info.has_previous());
        assert_eq!(conn.into_nodes(), vec![json!({ "id": 1 }), json!({ "id": 2 })]);
    }

    #[test]
    fn test_connection_defaults_missing_fields() {
        let conn: Connection = serde_json::from_value(json!({})).unwrap();
        assert!(conn.is_empty());
        assert_eq!(conn.total_count, 0);
        assert!(conn.page_info.is_none());
    }

    #[test]
    fn test_edge_serialization_omits_absent_typename() {
        let edge = Edge::new(json!({ "id": 3 }));
        assert_eq!(serde_json::to_value(&edge).unwrap(), json!({ "node": { "id": 3 } }));
    }

    #[test]
    fn test_page_info_default_is_optimistic() {
        let page_info = PageInfo::default();
        assert!(page_info.has_next());
        assert!(page_info.has_previous());
    }

    #[test]
    fn test_merge_variables_overrides_win() {
        let base = json!({ "first": 30, "offset": 0 });
        let overrides = json!({ "offset": 5, "search": "ann" });
        let merged = merge_variables(
            base.as_object().unwrap(),
            overrides.as_object().unwrap(),
        );
        assert_eq!(
            Value::Object(merged),
            json!({ "first": 30, "offset": 5, "search": "ann" })
        );
    }
}
