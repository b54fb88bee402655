//! Query resolution against read models and view models.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use event_store::AggregateId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueryError, ReadModelStoreError, ResolverError};
use crate::store::{ReadModelStore, TableReader};
use crate::view_model::ViewModelSource;

/// What a query is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryTarget {
    #[serde(rename = "readModelName")]
    ReadModel(String),
    #[serde(rename = "viewModelName")]
    ViewModel(String),
}

/// A query: `{readModelName | viewModelName, resolverName, args}`.
///
/// View model queries ignore `resolverName` and read the aggregate ids from
/// `args.aggregateIds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(flatten)]
    pub target: QueryTarget,

    #[serde(default)]
    pub resolver_name: String,

    #[serde(default)]
    pub args: Value,
}

impl Query {
    pub fn read_model(
        read_model: impl Into<String>,
        resolver: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            target: QueryTarget::ReadModel(read_model.into()),
            resolver_name: resolver.into(),
            args,
        }
    }

    pub fn view_model<I, T>(view_model: impl Into<String>, aggregate_ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let ids: Vec<String> = aggregate_ids.into_iter().map(Into::into).collect();
        Self {
            target: QueryTarget::ViewModel(view_model.into()),
            resolver_name: String::new(),
            args: serde_json::json!({ "aggregateIds": ids }),
        }
    }
}

/// A read-only function over one read model.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, reader: &TableReader, args: &Value) -> Result<Value, ResolverError>;
}

/// Resolvers by read model, plus an optional view model source. Built at
/// startup and shared behind an `Arc`.
pub struct QueryRegistry {
    store: Arc<dyn ReadModelStore>,
    resolvers: HashMap<String, HashMap<String, Arc<dyn Resolver>>>,
    view_models: Option<Arc<dyn ViewModelSource>>,
    timeout: Option<Duration>,
}

impl QueryRegistry {
    pub fn new(store: Arc<dyn ReadModelStore>) -> Self {
        Self {
            store,
            resolvers: HashMap::new(),
            view_models: None,
            timeout: None,
        }
    }

    /// Registers `resolver` as `name` on `read_model`.
    pub fn with_resolver<R>(mut self, read_model: impl Into<String>, name: impl Into<String>, resolver: R) -> Self
    where
        R: Resolver + 'static,
    {
        self.resolvers
            .entry(read_model.into())
            .or_default()
            .insert(name.into(), Arc::new(resolver));
        self
    }

    pub fn with_view_models(mut self, view_models: Arc<dyn ViewModelSource>) -> Self {
        self.view_models = Some(view_models);
        self
    }

    /// Abandons queries that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes a query. Dropping the returned future cancels it.
    #[tracing::instrument(skip(self, query), fields(target = ?query.target, resolver = %query.resolver_name))]
    pub async fn execute(&self, query: &Query) -> Result<Value, QueryError> {
        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.dispatch(query)).await {
                Ok(result) => result,
                Err(_) => Err(QueryError::Timeout(timeout)),
            },
            None => self.dispatch(query).await,
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => {
                tracing::debug!(code = err.code(), error = %err, "query failed");
                err.code()
            }
        };
        metrics::counter!("queries_executed_total", "outcome" => outcome).increment(1);

        result
    }

    async fn dispatch(&self, query: &Query) -> Result<Value, QueryError> {
        match &query.target {
            QueryTarget::ReadModel(read_model) => {
                self.resolve(read_model, &query.resolver_name, &query.args)
                    .await
            }
            QueryTarget::ViewModel(view_model) => self.snapshot(view_model, &query.args).await,
        }
    }

    async fn resolve(&self, read_model: &str, resolver_name: &str, args: &Value) -> Result<Value, QueryError> {
        let resolvers = self
            .resolvers
            .get(read_model)
            .ok_or_else(|| QueryError::ReadModelNotFound(read_model.to_string()))?;
        let resolver = resolvers
            .get(resolver_name)
            .ok_or_else(|| QueryError::ResolverNotFound {
                read_model: read_model.to_string(),
                resolver: resolver_name.to_string(),
            })?;

        let reader = TableReader::new(Arc::clone(&self.store), read_model);
        resolver
            .resolve(&reader, args)
            .await
            .map_err(|err| match err {
                ResolverError::Store(ReadModelStoreError::ReadModelNotFound(name)) => {
                    QueryError::ReadModelNotFound(name)
                }
                ResolverError::Store(ReadModelStoreError::Unavailable(reason)) => {
                    QueryError::StoreUnavailable(reason)
                }
                other => QueryError::ResolverExecution {
                    read_model: read_model.to_string(),
                    resolver: resolver_name.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    async fn snapshot(&self, view_model: &str, args: &Value) -> Result<Value, QueryError> {
        let source = self
            .view_models
            .as_ref()
            .ok_or_else(|| QueryError::ViewModelNotFound(view_model.to_string()))?;

        let aggregate_ids = aggregate_ids(args).map_err(|reason| QueryError::ResolverExecution {
            read_model: view_model.to_string(),
            resolver: String::new(),
            reason,
        })?;

        source
            .snapshot(view_model, &aggregate_ids)
            .await
            .map_err(|err| QueryError::from_view_model(view_model, err))
    }
}

/// Reads `args.aggregateIds`; missing or null means no aggregates.
fn aggregate_ids(args: &Value) -> Result<Vec<AggregateId>, String> {
    match args.get("aggregateIds") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(ids)) => ids
            .iter()
            .map(|id| {
                id.as_str()
                    .map(AggregateId::new)
                    .ok_or_else(|| format!("aggregate id must be a string, got {id}"))
            })
            .collect(),
        Some(other) => Err(format!("aggregateIds must be an array, got {other}")),
    }
}

impl std::fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolvers: HashMap<&str, Vec<&str>> = self
            .resolvers
            .iter()
            .map(|(read_model, resolvers)| {
                (read_model.as_str(), resolvers.keys().map(String::as_str).collect())
            })
            .collect();
        f.debug_struct("QueryRegistry")
            .field("resolvers", &resolvers)
            .field("view_models", &self.view_models.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use event_store::Position;
    use serde_json::json;

    use super::*;
    use crate::memory::InMemoryReadModelStore;
    use crate::store::{FieldType, Filter, Sort, TableOp, TableSchema, record};

    struct Names;

    #[async_trait]
    impl Resolver for Names {
        async fn resolve(&self, reader: &TableReader, _args: &Value) -> Result<Value, ResolverError> {
            let rows = reader.find("lists", &Filter::all(), &["name"], &Sort::asc("name")).await?;
            Ok(serde_json::to_value(rows)?)
        }
    }

    struct Picky;

    #[async_trait]
    impl Resolver for Picky {
        async fn resolve(&self, _reader: &TableReader, args: &Value) -> Result<Value, ResolverError> {
            args.get("id")
                .cloned()
                .ok_or_else(|| ResolverError::InvalidArgs("id is required".into()))
        }
    }

    struct Sleepy;

    #[async_trait]
    impl Resolver for Sleepy {
        async fn resolve(&self, _reader: &TableReader, _args: &Value) -> Result<Value, ResolverError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    async fn seeded_store() -> InMemoryReadModelStore {
        let store = InMemoryReadModelStore::new();
        store
            .commit(
                "Lists",
                vec![
                    TableOp::DefineTable {
                        table: "lists".into(),
                        schema: TableSchema::new().field("name", FieldType::String),
                    },
                    TableOp::Insert {
                        table: "lists".into(),
                        record: record([("name", "Weekend")]),
                    },
                    TableOp::Insert {
                        table: "lists".into(),
                        record: record([("name", "Groceries")]),
                    },
                ],
                None,
                Position::new(2),
            )
            .await
            .unwrap();
        store
    }

    fn registry(store: InMemoryReadModelStore) -> QueryRegistry {
        QueryRegistry::new(Arc::new(store))
            .with_resolver("Lists", "names", Names)
            .with_resolver("Lists", "picky", Picky)
            .with_resolver("Lists", "sleepy", Sleepy)
            .with_resolver("Pending", "names", Names)
    }

    #[test]
    fn query_wire_shape() {
        let query: Query = serde_json::from_value(json!({
            "readModelName": "ShoppingLists",
            "resolverName": "all",
            "args": {}
        }))
        .unwrap();
        assert_eq!(query, Query::read_model("ShoppingLists", "all", json!({})));

        let query: Query = serde_json::from_value(json!({
            "viewModelName": "shoppingList",
            "args": {"aggregateIds": ["A1"]}
        }))
        .unwrap();
        assert_eq!(query, Query::view_model("shoppingList", ["A1"]));
    }

    #[tokio::test]
    async fn resolves_through_a_reader() {
        let registry = registry(seeded_store().await);
        let result = registry
            .execute(&Query::read_model("Lists", "names", Value::Null))
            .await
            .unwrap();
        assert_eq!(result, json!([{"name": "Groceries"}, {"name": "Weekend"}]));
    }

    #[tokio::test]
    async fn unknown_targets_are_reported() {
        let registry = registry(seeded_store().await);

        let err = registry
            .execute(&Query::read_model("Nope", "names", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ReadModelNotFound(_)));

        let err = registry
            .execute(&Query::read_model("Lists", "nope", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ResolverNotFound { .. }));

        // registered, but never projected
        let err = registry
            .execute(&Query::read_model("Pending", "names", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ReadModelNotFound(_)));

        let err = registry
            .execute(&Query::view_model("shoppingList", ["A1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ViewModelNotFound(_)));
    }

    #[tokio::test]
    async fn resolver_failures_are_wrapped() {
        let registry = registry(seeded_store().await);
        let err = registry
            .execute(&Query::read_model("Lists", "picky", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "resolver_execution");
    }

    #[tokio::test]
    async fn unavailable_store_is_surfaced() {
        let store = seeded_store().await;
        let registry = registry(store.clone());
        store.set_available(false);

        let err = registry
            .execute(&Query::read_model("Lists", "names", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_queries_time_out() {
        let registry = registry(seeded_store().await).with_timeout(Some(Duration::from_millis(10)));
        let err = registry
            .execute(&Query::read_model("Lists", "sleepy", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));
    }

    #[test]
    fn aggregate_ids_are_strings() {
        assert!(aggregate_ids(&json!({})).unwrap().is_empty());
        assert_eq!(
            aggregate_ids(&json!({"aggregateIds": ["A1", "A2"]})).unwrap(),
            vec![AggregateId::new("A1"), AggregateId::new("A2")]
        );
        assert!(aggregate_ids(&json!({"aggregateIds": [1]})).is_err());
        assert!(aggregate_ids(&json!({"aggregateIds": "A1"})).is_err());
    }
}
