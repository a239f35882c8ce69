//! Query execution boundary
//!
//! The orchestrator only needs "run this document with these variables and
//! give me the `data` object". [`SchemaTransport`] satisfies that in-process
//! against an `async-graphql` schema; HTTP clients implement [`Transport`]
//! the same way.

use std::sync::Arc;

use async_graphql::{ObjectType, Request, Schema, SubscriptionType};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::types::Variables;
use crate::RelayError;

/// A query (or mutation) document with its variables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub variables: Variables,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, variables: Variables) -> Self {
        Self {
            query: query.into(),
            variables,
        }
    }
}

/// Executes GraphQL requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request and return its `data` object
    async fn execute(&self, request: QueryRequest) -> crate::Result<Value>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(&self, request: QueryRequest) -> crate::Result<Value> {
        (**self).execute(request).await
    }
}

/// Transport that executes requests against an in-process schema
pub struct SchemaTransport<Query, Mutation, Subscription> {
    schema: Schema<Query, Mutation, Subscription>,
}

impl<Query, Mutation, Subscription> SchemaTransport<Query, Mutation, Subscription> {
    pub fn new(schema: Schema<Query, Mutation, Subscription>) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl<Query, Mutation, Subscription> Transport for SchemaTransport<Query, Mutation, Subscription>
where
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    async fn execute(&self, request: QueryRequest) -> crate::Result<Value> {
        let variables = async_graphql::Variables::from_json(Value::Object(request.variables));
        let response = self
            .schema
            .execute(Request::new(request.query).variables(variables))
            .await;

        if response.is_err() {
            let messages: Vec<String> = response
                .errors
                .iter()
                .map(|error| error.message.clone())
                .collect();
            return Err(RelayError::TransportError(messages.join("; ")));
        }

        response
            .data
            .into_json()
            .map_err(|e| RelayError::TransportError(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::relay::CursorCodec;
    use crate::types::PageInfo;
    use async_graphql::{EmptyMutation, EmptySubscription, Object, SimpleObject, ID};
    use serde_json::json;
    use tokio_test::assert_err;

    #[derive(SimpleObject, Clone)]
    pub struct User {
        pub id: ID,
        pub name: String,
    }

    #[derive(SimpleObject)]
    pub struct UserEdge {
        pub node: User,
    }

    #[derive(SimpleObject)]
    pub struct UserConnection {
        pub total_count: i32,
        pub edges: Vec<UserEdge>,
        pub page_info: PageInfo,
    }

    /// Query root serving `users` slices of a fixed list
    pub struct UsersQuery {
        pub users: Vec<User>,
    }

    impl UsersQuery {
        pub fn with_users(count: usize) -> Self {
            Self {
                users: (1..=count)
                    .map(|n| User {
                        id: ID(n.to_string()),
                        name: format!("user-{n}"),
                    })
                    .collect(),
            }
        }
    }

    #[Object]
    impl UsersQuery {
        async fn users(
            &self,
            first: i32,
            offset: Option<i32>,
            after: Option<String>,
        ) -> async_graphql::Result<UserConnection> {
            let start = match after {
                Some(cursor) => CursorCodec::decode_offset(&cursor)? + 1,
                None => offset.unwrap_or(0).max(0) as usize,
            };
            let end = (start + first.max(0) as usize).min(self.users.len());
            let start = start.min(end);

            Ok(UserConnection {
                total_count: self.users.len() as i32,
                edges: self.users[start..end]
                    .iter()
                    .cloned()
                    .map(|node| UserEdge { node })
                    .collect(),
                page_info: PageInfo {
                    start_cursor: (start < end).then(|| CursorCodec::encode_offset(start)),
                    end_cursor: end.checked_sub(1).map(CursorCodec::encode_offset),
                    has_next_page: Some(end < self.users.len()),
                    has_previous_page: Some(start > 0),
                },
            })
        }
    }

    pub const USERS_QUERY: &str = "query Users($first: Int!, $offset: Int, $after: String) { \
        users(first: $first, offset: $offset, after: $after) { \
            totalCount edges { node { id name } } pageInfo { hasNextPage endCursor } } }";

    pub fn users_transport(count: usize) -> SchemaTransport<UsersQuery, EmptyMutation, EmptySubscription> {
        SchemaTransport::new(Schema::new(
            UsersQuery::with_users(count),
            EmptyMutation,
            EmptySubscription,
        ))
    }

    #[tokio::test]
    async fn test_schema_transport_executes_with_variables() {
        let transport = users_transport(5);
        let variables = json!({ "first": 2, "offset": 1 });
        let data = transport
            .execute(QueryRequest::new(USERS_QUERY, variables.as_object().unwrap().clone()))
            .await
            .unwrap();

        assert_eq!(data["users"]["totalCount"], json!(5));
        assert_eq!(
            data["users"]["edges"],
            json!([
                { "node": { "id": "2", "name": "user-2" } },
                { "node": { "id": "3", "name": "user-3" } }
            ])
        );
        assert_eq!(data["users"]["pageInfo"]["hasNextPage"], json!(true));
    }

    #[tokio::test]
    async fn test_schema_transport_surfaces_errors() {
        let transport = users_transport(5);
        let variables = json!({ "first": 2, "after": "bogus" });
        let result = transport
            .execute(QueryRequest::new(USERS_QUERY, variables.as_object().unwrap().clone()))
            .await;
        assert!(matches!(result, Err(RelayError::TransportError(_))));

        assert_err!(
            transport
                .execute(QueryRequest::new("{ nope }", Variables::new()))
                .await
        );
    }
}
