use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use event_store::Position;
use tokio::sync::RwLock;

use crate::error::ReadModelStoreError;
use crate::store::{Filter, ReadModelStore, Record, Sort, StoreResult, TableOp, TableSchema};

#[derive(Debug, Default)]
struct Table {
    schema: TableSchema,
    rows: Vec<Record>,
}

#[derive(Debug, Default)]
struct ReadModelData {
    cursor: Position,
    tables: HashMap<String, Table>,
}

/// In-memory read model store implementation.
///
/// Commits are validated in full before anything is applied, so a rejected
/// batch leaves tables and cursor untouched. Can be switched unavailable to
/// exercise outage handling.
#[derive(Clone, Default)]
pub struct InMemoryReadModelStore {
    read_models: Arc<RwLock<HashMap<String, ReadModelData>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryReadModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: while unavailable every operation fails with
    /// `ReadModelStoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Returns the number of rows in a table, if it exists.
    pub async fn row_count(&self, read_model: &str, table: &str) -> Option<usize> {
        let read_models = self.read_models.read().await;
        read_models
            .get(read_model)
            .and_then(|data| data.tables.get(table))
            .map(|table| table.rows.len())
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReadModelStoreError::Unavailable(
                "in-memory read model store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

/// Checks a batch against the schemas it would run with.
fn validate(
    read_model: &str,
    existing: Option<&ReadModelData>,
    ops: &[TableOp],
) -> StoreResult<()> {
    let mut schemas: HashMap<&str, &TableSchema> = existing
        .map(|data| {
            data.tables
                .iter()
                .map(|(name, table)| (name.as_str(), &table.schema))
                .collect()
        })
        .unwrap_or_default();

    let violation = |table: &str, reason: String| ReadModelStoreError::SchemaViolation {
        table: table.to_string(),
        reason,
    };

    for op in ops {
        match op {
            TableOp::DefineTable { table, schema } => {
                if schemas.insert(table.as_str(), schema).is_some() {
                    return Err(violation(table, "table is already defined".to_string()));
                }
            }
            TableOp::Insert { table, record } => {
                let schema = schemas.get(table.as_str()).ok_or_else(|| not_found(read_model, table))?;
                schema.validate(record).map_err(|reason| violation(table, reason))?;
            }
            TableOp::Update {
                table,
                filter,
                patch,
            } => {
                let schema = schemas.get(table.as_str()).ok_or_else(|| not_found(read_model, table))?;
                schema.validate(patch).map_err(|reason| violation(table, reason))?;
                check_filter(schema, table, filter)?;
            }
            TableOp::Delete { table, filter } => {
                let schema = schemas.get(table.as_str()).ok_or_else(|| not_found(read_model, table))?;
                check_filter(schema, table, filter)?;
            }
        }
    }
    Ok(())
}

fn check_filter(schema: &TableSchema, table: &str, filter: &Filter) -> StoreResult<()> {
    for field in filter.fields() {
        if !schema.fields().any(|(name, _)| name == field) {
            return Err(ReadModelStoreError::SchemaViolation {
                table: table.to_string(),
                reason: format!("filter on undeclared field `{field}`"),
            });
        }
    }
    Ok(())
}

fn not_found(read_model: &str, table: &str) -> ReadModelStoreError {
    ReadModelStoreError::TableNotFound {
        read_model: read_model.to_string(),
        table: table.to_string(),
    }
}

fn apply(data: &mut ReadModelData, op: TableOp) {
    match op {
        TableOp::DefineTable { table, schema } => {
            data.tables.insert(
                table,
                Table {
                    schema,
                    rows: Vec::new(),
                },
            );
        }
        TableOp::Insert { table, record } => {
            if let Some(table) = data.tables.get_mut(&table) {
                table.rows.push(record);
            }
        }
        TableOp::Update {
            table,
            filter,
            patch,
        } => {
            if let Some(table) = data.tables.get_mut(&table) {
                for row in table.rows.iter_mut().filter(|row| filter.matches(row)) {
                    row.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }
        TableOp::Delete { table, filter } => {
            if let Some(table) = data.tables.get_mut(&table) {
                table.rows.retain(|row| !filter.matches(row));
            }
        }
    }
}

#[async_trait]
impl ReadModelStore for InMemoryReadModelStore {
    async fn cursor(&self, read_model: &str) -> StoreResult<Option<Position>> {
        self.ensure_available()?;
        Ok(self
            .read_models
            .read()
            .await
            .get(read_model)
            .map(|data| data.cursor))
    }

    async fn commit(
        &self,
        read_model: &str,
        ops: Vec<TableOp>,
        expected: Option<Position>,
        cursor: Position,
    ) -> StoreResult<()> {
        self.ensure_available()?;

        let mut read_models = self.read_models.write().await;
        let current = read_models.get(read_model).map(|data| data.cursor);
        if current != expected {
            return Err(ReadModelStoreError::CursorConflict {
                read_model: read_model.to_string(),
                expected,
                actual: current,
            });
        }
        if let Some(current) = current.filter(|current| cursor <= *current) {
            return Err(ReadModelStoreError::CursorRegression {
                read_model: read_model.to_string(),
                current,
                proposed: cursor,
            });
        }
        validate(read_model, read_models.get(read_model), &ops)?;

        let data = read_models.entry(read_model.to_string()).or_default();
        for op in ops {
            apply(data, op);
        }
        data.cursor = cursor;
        Ok(())
    }

    async fn find(
        &self,
        read_model: &str,
        table: &str,
        filter: &Filter,
        fields: &[String],
        sort: &Sort,
    ) -> StoreResult<Vec<Record>> {
        self.ensure_available()?;

        let read_models = self.read_models.read().await;
        let data = read_models
            .get(read_model)
            .ok_or_else(|| ReadModelStoreError::ReadModelNotFound(read_model.to_string()))?;
        let table = data
            .tables
            .get(table)
            .ok_or_else(|| not_found(read_model, table))?;

        let mut rows: Vec<Record> = table
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();

        if !sort.is_empty() {
            rows.sort_by(|a, b| sort.compare(a, b));
        }
        if !fields.is_empty() {
            for row in &mut rows {
                row.retain(|name, _| fields.contains(name));
            }
        }
        Ok(rows)
    }

    async fn drop_read_model(&self, read_model: &str) -> StoreResult<()> {
        self.ensure_available()?;
        self.read_models.write().await.remove(read_model);
        Ok(())
    }

    async fn read_models(&self) -> StoreResult<Vec<String>> {
        self.ensure_available()?;
        let mut names: Vec<String> = self.read_models.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
