//! Entity instances and the persistence operations built on the data access
//! runtime.
//!
//! An unexpected affected-row count from save/update/remove is a soft
//! failure: it is logged and returned, never raised. Callers that need a
//! persistence guarantee must check the returned count.

use crate::db::Db;
use crate::error::AppError;
use crate::schema::{quote_ident, EntitySchema};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Row cap for `find_all`: either a plain count or an (offset, count) pair.
/// Any other shape is unrepresentable by construction.
#[derive(Clone, Copy, Debug)]
pub enum Limit {
    Count(u32),
    OffsetCount(u32, u32),
}

/// A persisted record instance: field key to value, with lazy default
/// resolution. "Unset" and "explicitly set" stay distinguishable.
#[derive(Clone, Debug)]
pub struct Entity {
    schema: Arc<EntitySchema>,
    values: Map<String, Value>,
}

impl Entity {
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Entity {
            schema,
            values: Map::new(),
        }
    }

    pub fn with_values(schema: Arc<EntitySchema>, values: Map<String, Value>) -> Self {
        Entity { schema, values }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Currently-set value, or Null when unset. Never falls back to the
    /// field default; `update` relies on this.
    pub fn value(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or(Value::Null)
    }

    /// Value with default fallback. A resolved default (including generator
    /// output) is cached on the instance so it resolves exactly once.
    pub fn value_or_default(&mut self, key: &str) -> Value {
        if let Some(v) = self.values.get(key) {
            if !v.is_null() {
                return v.clone();
            }
        }
        let resolved = self
            .schema
            .field(key)
            .and_then(|f| f.field.default.resolve());
        match resolved {
            Some(v) => {
                tracing::debug!(field = %key, value = %v, "using default value");
                self.values.insert(key.to_string(), v.clone());
                v
            }
            None => Value::Null,
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    /// Non-key field values (default-resolved) in declared order, then the
    /// primary key. Must match the insert template's column order.
    fn insert_args(&mut self) -> Vec<Value> {
        let schema = self.schema.clone();
        let mut args: Vec<Value> = schema
            .fields
            .iter()
            .map(|f| self.value_or_default(&f.key))
            .collect();
        args.push(self.value_or_default(&schema.primary_key.key));
        args
    }

    /// Currently-set values only, in declared order, then the primary key.
    /// No default fallback: updating never injects a default over an
    /// intentionally-absent value.
    fn update_args(&self) -> Vec<Value> {
        let mut args: Vec<Value> = self
            .schema
            .fields
            .iter()
            .map(|f| self.value(&f.key))
            .collect();
        args.push(self.value(&self.schema.primary_key.key));
        args
    }

    /// Insert this instance. Returns the affected row count; a count other
    /// than 1 is logged, not raised.
    pub async fn save(&mut self, db: &Db) -> Result<u64, AppError> {
        let args = self.insert_args();
        let rows = db.execute(&self.schema.insert, &args, true).await?;
        if rows != 1 {
            tracing::warn!(
                table = %self.schema.table_name,
                affected = rows,
                "failed to insert record: unexpected affected rows"
            );
        }
        Ok(rows)
    }

    /// Update by primary key using only currently-set values.
    pub async fn update(&self, db: &Db) -> Result<u64, AppError> {
        let args = self.update_args();
        let rows = db.execute(&self.schema.update, &args, true).await?;
        if rows != 1 {
            tracing::warn!(
                table = %self.schema.table_name,
                affected = rows,
                "failed to update by primary key: unexpected affected rows"
            );
        }
        Ok(rows)
    }

    /// Delete by primary key.
    pub async fn remove(&self, db: &Db) -> Result<u64, AppError> {
        let args = vec![self.value(&self.schema.primary_key.key)];
        let rows = db.execute(&self.schema.delete, &args, true).await?;
        if rows != 1 {
            tracing::warn!(
                table = %self.schema.table_name,
                affected = rows,
                "failed to remove by primary key: unexpected affected rows"
            );
        }
        Ok(rows)
    }
}

/// Class-level persistence API for one entity schema.
#[derive(Clone)]
pub struct Model {
    schema: Arc<EntitySchema>,
}

impl Model {
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Model { schema }
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// An empty instance; fields resolve defaults lazily.
    pub fn entity(&self) -> Entity {
        Entity::new(self.schema.clone())
    }

    pub fn entity_from(&self, values: Map<String, Value>) -> Entity {
        Entity::with_values(self.schema.clone(), values)
    }

    /// Fetch entities matching an optional raw predicate fragment
    /// (parameterized by the caller), ordering and limit.
    pub async fn find_all(
        &self,
        db: &Db,
        filter: Option<&str>,
        args: &[Value],
        order_by: Option<&str>,
        limit: Option<Limit>,
    ) -> Result<Vec<Entity>, AppError> {
        let (sql, bound) = find_all_sql(&self.schema, filter, args, order_by, limit);
        let rows = db.query(&sql, &bound, None).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| match r {
                Value::Object(m) => Some(self.entity_from(m)),
                _ => None,
            })
            .collect())
    }

    /// Aggregate select (e.g. `count(id)`); returns the first row's value,
    /// or None when the result set is empty.
    pub async fn count(
        &self,
        db: &Db,
        select_expr: &str,
        filter: Option<&str>,
        args: &[Value],
    ) -> Result<Option<Value>, AppError> {
        let mut sql = format!(
            "SELECT {} AS _num_ FROM {}",
            select_expr,
            quote_ident(&self.schema.table_name)
        );
        if let Some(w) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(w);
        }
        let rows = db.query(&sql, args, Some(1)).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|r| r.get("_num_").cloned().unwrap_or(Value::Null)))
    }

    /// Fetch exactly one entity by primary key; absence is None, not an error.
    pub async fn find_by_key(&self, db: &Db, pk: &Value) -> Result<Option<Entity>, AppError> {
        let sql = format!(
            "{} WHERE {} = ?",
            self.schema.select,
            quote_ident(&self.schema.primary_key.column)
        );
        let rows = db.query(&sql, std::slice::from_ref(pk), Some(1)).await?;
        Ok(rows.into_iter().next().and_then(|r| match r {
            Value::Object(m) => Some(self.entity_from(m)),
            _ => None,
        }))
    }
}

fn find_all_sql(
    schema: &EntitySchema,
    filter: Option<&str>,
    args: &[Value],
    order_by: Option<&str>,
    limit: Option<Limit>,
) -> (String, Vec<Value>) {
    let mut sql = vec![schema.select.clone()];
    let mut bound: Vec<Value> = args.to_vec();
    if let Some(w) = filter {
        sql.push("WHERE".into());
        sql.push(w.into());
    }
    if let Some(o) = order_by {
        sql.push("ORDER BY".into());
        sql.push(o.into());
    }
    match limit {
        None => {}
        Some(Limit::Count(n)) => {
            sql.push("LIMIT ?".into());
            bound.push(Value::from(n));
        }
        Some(Limit::OffsetCount(offset, n)) => {
            // bind order matches the rendered clause: count then offset
            sql.push("LIMIT ? OFFSET ?".into());
            bound.push(Value::from(n));
            bound.push(Value::from(offset));
        }
    }
    (sql.join(" "), bound)
}
