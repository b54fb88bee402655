//! Read model storage contract.
//!
//! Projections write through a [`TableWriter`], resolvers read through a
//! [`TableReader`]. Neither can be constructed outside this crate: the
//! projection engine owns every writer and the query layer owns every
//! reader, so a resolver cannot mutate and a projection cannot answer
//! queries.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use event_store::Position;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReadModelStoreError;

/// One row of a read model table.
pub type Record = serde_json::Map<String, Value>;

/// Result type for read model store operations.
pub type StoreResult<T> = std::result::Result<T, ReadModelStoreError>;

/// Column types a table schema can declare. `null` is accepted for every type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    /// Epoch milliseconds.
    Timestamp,
    /// Any JSON value.
    Json,
}

impl FieldType {
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer | FieldType::Timestamp => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Json => true,
        }
    }
}

/// Declared fields of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    fields: BTreeMap<String, FieldType>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Checks that every field of `record` is declared with a matching type.
    pub fn validate(&self, record: &Record) -> Result<(), String> {
        for (name, value) in record {
            match self.fields.get(name) {
                None => return Err(format!("undeclared field `{name}`")),
                Some(ty) if !ty.accepts(value) => {
                    return Err(format!("field `{name}` expects {ty:?}, got {value}"));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Conjunction of field equality conditions. The empty filter matches all rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(field, value)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| record.get(field).unwrap_or(&Value::Null) == expected)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|(field, _)| field.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Multi-key ordering. The empty sort keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    keys: Vec<(String, Direction)>,
}

impl Sort {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::none().then_asc(field)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::none().then_desc(field)
    }

    pub fn then_asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), Direction::Asc));
        self
    }

    pub fn then_desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), Direction::Desc));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for (field, direction) in &self.keys {
            let ordering = compare_values(
                a.get(field).unwrap_or(&Value::Null),
                b.get(field).unwrap_or(&Value::Null),
            );
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Total order over JSON values: null < bool < number < string < other.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// A buffered mutation of one read model.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOp {
    DefineTable { table: String, schema: TableSchema },
    Insert { table: String, record: Record },
    Update { table: String, filter: Filter, patch: Record },
    Delete { table: String, filter: Filter },
}

/// Backend holding read model tables and projection cursors.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Last position committed for `read_model`, or `None` if it has never
    /// been initialized.
    async fn cursor(&self, read_model: &str) -> StoreResult<Option<Position>>;

    /// Applies `ops` and moves the cursor from `expected` to `cursor`,
    /// atomically.
    ///
    /// Either every operation is applied and the cursor advances, or nothing
    /// changes. `expected` is `None` for the first commit, which creates the
    /// read model. Fails with `CursorConflict` when the stored cursor differs
    /// from `expected` and with `CursorRegression` when `cursor` is not
    /// after it.
    async fn commit(
        &self,
        read_model: &str,
        ops: Vec<TableOp>,
        expected: Option<Position>,
        cursor: Position,
    ) -> StoreResult<()>;

    /// Reads matching rows, sorted, keeping only `fields` (all if empty).
    async fn find(
        &self,
        read_model: &str,
        table: &str,
        filter: &Filter,
        fields: &[String],
        sort: &Sort,
    ) -> StoreResult<Vec<Record>>;

    /// Removes all tables and the cursor of `read_model`.
    async fn drop_read_model(&self, read_model: &str) -> StoreResult<()>;

    /// Names of initialized read models.
    async fn read_models(&self) -> StoreResult<Vec<String>>;
}

/// Write access handed to projections. Mutations are buffered and committed
/// by the engine together with the cursor.
#[derive(Debug, Default)]
pub struct TableWriter {
    ops: Vec<TableOp>,
}

impl TableWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn define_table(&mut self, table: impl Into<String>, schema: TableSchema) {
        self.ops.push(TableOp::DefineTable {
            table: table.into(),
            schema,
        });
    }

    pub fn insert(&mut self, table: impl Into<String>, record: Record) {
        self.ops.push(TableOp::Insert {
            table: table.into(),
            record,
        });
    }

    pub fn update(&mut self, table: impl Into<String>, filter: Filter, patch: Record) {
        self.ops.push(TableOp::Update {
            table: table.into(),
            filter,
            patch,
        });
    }

    pub fn delete(&mut self, table: impl Into<String>, filter: Filter) {
        self.ops.push(TableOp::Delete {
            table: table.into(),
            filter,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<TableOp> {
        self.ops
    }
}

/// Read-only access to one read model, handed to resolvers.
#[derive(Clone)]
pub struct TableReader {
    store: Arc<dyn ReadModelStore>,
    read_model: String,
}

impl TableReader {
    pub(crate) fn new(store: Arc<dyn ReadModelStore>, read_model: impl Into<String>) -> Self {
        Self {
            store,
            read_model: read_model.into(),
        }
    }

    pub fn read_model(&self) -> &str {
        &self.read_model
    }

    /// Finds rows in `table`. An empty `fields` slice keeps every field.
    pub async fn find(
        &self,
        table: &str,
        filter: &Filter,
        fields: &[&str],
        sort: &Sort,
    ) -> StoreResult<Vec<Record>> {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        self.store
            .find(&self.read_model, table, filter, &fields, sort)
            .await
    }

    /// First matching row in storage order.
    pub async fn find_one(&self, table: &str, filter: &Filter) -> StoreResult<Option<Record>> {
        Ok(self
            .find(table, filter, &[], &Sort::none())
            .await?
            .into_iter()
            .next())
    }
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("read_model", &self.read_model)
            .finish()
    }
}

/// Builds a record from `(field, value)` pairs.
pub fn record<K, V, I>(fields: I) -> Record
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
