//! Query execution against MySQL using sqlx.
//!
//! An [`Executor`] wraps a connection pool plus compile-time configuration
//! (table resolver, AES key). Loading a query yields a [`CompiledQuery`]
//! that is immutable and safe to share; every run substitutes the caller's
//! parameter map into the bind list before dispatch.

mod params;
mod row;

pub use params::{resolve_flag, resolve_int, resolve_value, Params};
pub use row::{format_json_columns, row_to_record, Record};

use crate::compile::{Compiled, Compiler, IdentityResolver, TableResolver};
use crate::dsl::Query;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use std::sync::Arc;

/// Default row cap for plain reads without an authored limit.
const DEFAULT_LIMIT: i64 = 100;
/// Default page size for paginated reads.
const DEFAULT_PAGE_SIZE: i64 = 20;

/// A paginated result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginate {
    pub items: Vec<Record>,
    pub total: i64,
    pub page: i64,
    #[serde(rename = "pagesize")]
    pub page_size: i64,
    #[serde(rename = "pagecount")]
    pub page_count: i64,
    pub prev: i64,
    pub next: i64,
}

/// The execution engine: a MySQL pool plus compilation settings.
#[derive(Clone)]
pub struct Executor {
    pool: MySqlPool,
    resolver: Arc<dyn TableResolver>,
    aes_key: Option<String>,
}

impl Executor {
    /// Connect to a MySQL database by URL.
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            pool,
            resolver: Arc::new(IdentityResolver),
            aes_key: None,
        }
    }

    /// Use a custom model-to-table resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn TableResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Key used for `field*` decrypted columns.
    pub fn with_aes_key(mut self, key: impl Into<String>) -> Self {
        self.aes_key = Some(key.into());
        self
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Parse, validate and compile a query for repeated execution.
    pub fn load(&self, query: &Query) -> crate::Result<CompiledQuery> {
        let mut compiler = Compiler::new(self.resolver.as_ref());
        if let Some(key) = &self.aes_key {
            compiler = compiler.aes_key(key);
        }
        let compiled = compiler.compile(query)?;
        Ok(CompiledQuery {
            pool: self.pool.clone(),
            compiled,
        })
    }

    /// Load from JSON text.
    pub fn load_json(&self, source: &str) -> crate::Result<CompiledQuery> {
        self.load(&Query::parse(source)?)
    }

    /// Load from a JSON value.
    pub fn load_value(&self, value: &Value) -> crate::Result<CompiledQuery> {
        self.load(&Query::from_value(value, "")?)
    }
}

/// A compiled statement bound to a pool. Immutable after load; the same
/// instance serves concurrent callers with different parameter maps.
#[derive(Clone)]
pub struct CompiledQuery {
    pool: MySqlPool,
    compiled: Compiled,
}

impl CompiledQuery {
    /// The statement as compiled, before limit/offset resolution.
    pub fn sql(&self) -> &str {
        &self.compiled.sql
    }

    pub fn bindings(&self) -> &[Value] {
        &self.compiled.bindings
    }

    /// Dispatch by the query's own fields: raw SQL, paginate, first or get.
    pub async fn run(&self, params: &Params) -> crate::Result<Value> {
        let query = &self.compiled.query;
        if query.sql.is_some() {
            return self.exec(params).await;
        }
        if query.is_paginate() {
            let page = self.paginate(params).await?;
            return serde_json::to_value(page)
                .map_err(|e| Error::Execution(e.to_string()));
        }
        if resolve_flag(&query.first, params) {
            let record = self.first(params).await?;
            return Ok(record.map(Value::Object).unwrap_or(Value::Null));
        }
        let records = self.get(params).await?;
        Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
    }

    /// Multi-row read.
    pub async fn get(&self, params: &Params) -> crate::Result<Vec<Record>> {
        let (sql, bindings) = statement(&self.compiled, params);
        let rows = bind_all(sqlx::query(&sql), &bindings)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        self.format_rows(rows)
    }

    /// Single-row read; forces `limit 1`.
    pub async fn first(&self, params: &Params) -> crate::Result<Option<Record>> {
        let (sql, bindings) = first_statement(&self.compiled, params);
        let row = bind_all(sqlx::query(&sql), &bindings)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        match row {
            Some(row) => {
                let mut record = row_to_record(&row);
                format_json_columns(&mut record, &self.compiled.select)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Paginated read. Runs the COUNT derivation unless `data-only` asked
    /// to skip it, then fetches the requested window.
    pub async fn paginate(&self, params: &Params) -> crate::Result<Paginate> {
        let query = &self.compiled.query;
        let page = resolve_int(&query.page, params).unwrap_or(1).max(1);
        let page_size = match resolve_int(&query.page_size, params) {
            Some(n) if n >= 1 => n,
            _ => DEFAULT_PAGE_SIZE,
        };
        let data_only = resolve_flag(&query.data_only, params);
        let bindings: Vec<Value> = self
            .compiled
            .bindings
            .iter()
            .map(|v| resolve_value(v, params))
            .collect();

        let total = if data_only {
            -1
        } else {
            let count_sql = self.compiled.count_sql();
            let row: MySqlRow = bind_all(sqlx::query(&count_sql), &bindings)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| Error::Execution(e.to_string()))?;
            sqlx::Row::try_get::<i64, _>(&row, 0)
                .map_err(|e| Error::Execution(e.to_string()))?
        };

        let sql = format!(
            "{} limit {} offset {}",
            self.compiled.sql,
            page_size,
            (page - 1) * page_size
        );
        let rows = bind_all(sqlx::query(&sql), &bindings)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        let items = self.format_rows(rows)?;

        let (page_count, prev, next) = if data_only {
            // no COUNT was run: a full window implies a possible next page
            let next = if items.len() as i64 == page_size { page + 1 } else { -1 };
            (-1, if page <= 1 { -1 } else { page - 1 }, next)
        } else {
            page_math(total, page, page_size)
        };

        Ok(Paginate {
            items,
            total,
            page,
            page_size,
            page_count,
            prev,
            next,
        })
    }

    /// Raw statement escape hatch. Read statements return their rows,
    /// anything else the affected row count.
    pub async fn exec(&self, params: &Params) -> crate::Result<Value> {
        let bindings: Vec<Value> = self
            .compiled
            .bindings
            .iter()
            .map(|v| resolve_value(v, params))
            .collect();
        let sql = &self.compiled.sql;

        if is_read_statement(sql) {
            let rows = bind_all(sqlx::query(sql), &bindings)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Execution(e.to_string()))?;
            let records: Vec<Value> = rows
                .iter()
                .map(|row| Value::Object(row_to_record(row)))
                .collect();
            return Ok(Value::Array(records));
        }

        let result = bind_all(sqlx::query(sql), &bindings)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        Ok(serde_json::json!({ "affected": result.rows_affected() }))
    }

    fn format_rows(&self, rows: Vec<MySqlRow>) -> crate::Result<Vec<Record>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = row_to_record(row);
            format_json_columns(&mut record, &self.compiled.select)?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Resolve the effective statement and bind list for a plain read.
fn statement(compiled: &Compiled, params: &Params) -> (String, Vec<Value>) {
    let bindings = compiled
        .bindings
        .iter()
        .map(|v| resolve_value(v, params))
        .collect();
    let query = &compiled.query;
    if query.sql.is_some() {
        return (compiled.sql.clone(), bindings);
    }

    let mut sql = compiled.sql.clone();
    let limit = resolve_int(&query.limit, params).unwrap_or(DEFAULT_LIMIT);
    sql.push_str(&format!(" limit {}", limit));
    if let Some(offset) = resolve_int(&query.offset, params) {
        sql.push_str(&format!(" offset {}", offset));
    }
    (sql, bindings)
}

/// Like [`statement`] but capped at one row.
fn first_statement(compiled: &Compiled, params: &Params) -> (String, Vec<Value>) {
    let bindings = compiled
        .bindings
        .iter()
        .map(|v| resolve_value(v, params))
        .collect();
    let mut sql = compiled.sql.clone();
    if compiled.query.sql.is_none() {
        sql.push_str(" limit 1");
    }
    (sql, bindings)
}

/// Page arithmetic: `(page_count, prev, next)`.
fn page_math(total: i64, page: i64, page_size: i64) -> (i64, i64, i64) {
    let page_count = if total == 0 {
        -1
    } else {
        (total + page_size - 1) / page_size
    };
    let prev = if page <= 1 { -1 } else { page - 1 };
    let next = if page_count == -1 || page >= page_count {
        -1
    } else {
        page + 1
    };
    (page_count, prev, next)
}

fn is_read_statement(sql: &str) -> bool {
    let head = sql.trim_start().to_lowercase();
    ["select", "show", "desc", "describe", "explain"]
        .iter()
        .any(|kw| head.starts_with(kw))
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    values: &'q [Value],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else {
                    query.bind(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Compiler, IdentityResolver};
    use crate::lint::must_parse;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> Compiled {
        Compiler::new(&IdentityResolver)
            .compile(&must_parse(source))
            .unwrap()
    }

    #[test]
    fn test_page_math_matches_window() {
        // five rows, page 2 of size 2
        assert_eq!(page_math(5, 2, 2), (3, 1, 3));
        // first page has no previous
        assert_eq!(page_math(5, 1, 2), (3, -1, 2));
        // last page has no next
        assert_eq!(page_math(5, 3, 2), (3, 2, -1));
        // zero rows
        assert_eq!(page_math(0, 1, 20), (-1, -1, -1));
    }

    #[test]
    fn test_default_limit_applied() {
        let compiled = compile(r#"{"select": "id", "from": "t"}"#);
        let (sql, _) = statement(&compiled, &Params::new());
        assert_eq!(sql, "select `id` from `t` limit 100");
    }

    #[test]
    fn test_late_bound_limit() {
        let compiled = compile(r#"{"select": "id", "from": "t", "limit": "?:max", "offset": 4}"#);
        let params: Params =
            serde_json::from_value(serde_json::json!({"max": 7})).unwrap();
        let (sql, _) = statement(&compiled, &params);
        assert_eq!(sql, "select `id` from `t` limit 7 offset 4");
    }

    #[test]
    fn test_bindings_substituted_per_run() {
        let compiled = compile(
            r#"{"select": "id", "from": "t", "wheres": [{"field": "name", "like": "?:keyword"}]}"#,
        );
        let params: Params =
            serde_json::from_value(serde_json::json!({"keyword": "%li%"})).unwrap();
        let (_, bindings) = statement(&compiled, &params);
        assert_eq!(bindings, vec![Value::from("%li%")]);

        // same compiled statement, different parameters
        let params: Params =
            serde_json::from_value(serde_json::json!({"keyword": "%wang%"})).unwrap();
        let (_, bindings) = statement(&compiled, &params);
        assert_eq!(bindings, vec![Value::from("%wang%")]);
    }

    #[test]
    fn test_first_statement_caps_at_one() {
        let compiled = compile(r#"{"select": "id", "from": "t", "first": true}"#);
        let (sql, _) = first_statement(&compiled, &Params::new());
        assert_eq!(sql, "select `id` from `t` limit 1");
    }

    #[test]
    fn test_raw_statement_untouched() {
        let compiled = compile(r#"{"sql": {"stmt": "show tables"}}"#);
        let (sql, _) = statement(&compiled, &Params::new());
        assert_eq!(sql, "show tables");
        assert!(is_read_statement(&sql));
        assert!(!is_read_statement("update t set a = 1"));
    }
}
