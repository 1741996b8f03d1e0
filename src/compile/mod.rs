//! Compilation of a validated [`Query`] into a parameterized MySQL
//! statement.
//!
//! The compiler drives a [`Builder`] clause by clause: select, from,
//! wheres, orders, groups (which may rewrite the select list and add
//! joins), havings, unions, sub-query, joins, raw SQL. Validation
//! accumulates; compilation fails fast on the first problem.

mod builder;
mod expr;

pub use builder::{quote, quote_str, Builder};

use crate::dsl::{Group, Having, Query, Table, Where};
use crate::error::Error;
use crate::expr::{ArrayIndex, ExprKind, Expression};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Rewrites the select projection into a COUNT for pagination totals.
static COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^select\s+.+?\s+from\s").unwrap());

/// Maps logical model names (`$user`) to physical table names.
pub trait TableResolver: Send + Sync {
    fn table_name(&self, model: &str) -> String;
}

/// Uses the model name as the table name unchanged.
pub struct IdentityResolver;

impl TableResolver for IdentityResolver {
    fn table_name(&self, model: &str) -> String {
        model.to_string()
    }
}

/// The output of compilation: a statement, its bind values in placeholder
/// order, and the select list the executor needs for row formatting.
///
/// `limit`/`offset`/pagination are an executor concern (any of them may be
/// a late-bound template), so `sql` never carries a limit clause; the
/// executor appends one after resolving the runtime parameters.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub sql: String,
    /// May contain `?:name` / `{{ ... }}` template strings substituted at
    /// execution time.
    pub bindings: Vec<Value>,
    pub select: Vec<Expression>,
    pub query: Query,
}

impl Compiled {
    /// The COUNT derivation used for pagination totals; runs with the same
    /// bindings as the main statement.
    pub fn count_sql(&self) -> String {
        COUNT_RE
            .replace(&self.sql, "select count(*) as `total` from ")
            .into_owned()
    }
}

pub struct Compiler<'a> {
    resolver: &'a dyn TableResolver,
    aes_key: Option<&'a str>,
    bindings: Map<String, Value>,
}

impl<'a> Compiler<'a> {
    pub fn new(resolver: &'a dyn TableResolver) -> Self {
        Self {
            resolver,
            aes_key: None,
            bindings: Map::new(),
        }
    }

    /// Key used for `field*` decrypted columns.
    pub fn aes_key(mut self, key: &'a str) -> Self {
        self.aes_key = Some(key);
        self
    }

    /// Provide a compile-time value for a `?:name` expression.
    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    /// Validate and compile a query.
    pub fn compile(&self, query: &Query) -> crate::Result<Compiled> {
        let errors = query.validate();
        if !errors.is_empty() {
            return Err(Error::Invalid(errors));
        }

        let mut b = Builder::new();
        self.fill(query, &mut b)?;
        let compiled = Compiled {
            sql: b.to_sql(),
            bindings: b.bindings(),
            select: query.select.clone(),
            query: query.clone(),
        };
        if query.debug {
            tracing::debug!(sql = %compiled.sql, bindings = ?compiled.bindings, "compiled query");
        }
        Ok(compiled)
    }

    fn ctx(&self) -> expr::ExprContext<'_> {
        expr::ExprContext {
            resolver: self.resolver,
            aes_key: self.aes_key,
            bindings: &self.bindings,
        }
    }

    fn fill(&self, query: &Query, b: &mut Builder) -> crate::Result<()> {
        // Select fragments are staged so the group pass can rewrite
        // JSON-table and rollup entries before they reach the builder.
        let mut selects = Vec::with_capacity(query.select.len());
        for entry in &query.select {
            selects.push(expr::select_fragment(entry, &self.ctx())?);
        }

        if let Some(table) = &query.from {
            b.from(self.table_sql(table));
        }

        for entry in &query.wheres {
            self.fill_where(entry, b)?;
        }

        for order in &query.orders {
            let field = self.require(&order.field)?;
            b.order_by(&field, &order.direction().to_lowercase());
        }

        if let Some(groups) = &query.groups {
            let mut json_tables = 0usize;
            for group in groups {
                self.fill_group(group, query, &mut selects, &mut json_tables, b)?;
            }
        }

        for fragment in selects.into_iter().flatten() {
            b.select(fragment);
        }

        for entry in &query.havings {
            self.fill_having(entry, b)?;
        }

        for union in &query.unions {
            let mut result = Ok(());
            b.union_all(|sub| result = self.fill(union, sub));
            result?;
        }

        if let Some(sub_query) = &query.sub_query {
            let alias = query.alias.as_deref().unwrap_or("_SUB_");
            let mut result = Ok(());
            b.from_sub(alias, |sub| result = self.fill(sub_query, sub));
            result?;
        }

        for join in &query.joins {
            // presence is guaranteed by validation
            let (table, key, foreign) = match (&join.from, &join.key, &join.foreign) {
                (Some(table), Some(key), Some(foreign)) => (table, key, foreign),
                _ => return Err(Error::Compile("join is incomplete".to_string())),
            };
            let table = self.table_sql(table);
            let lhs = self.require(key)?;
            let rhs = self.require(foreign)?;
            if join.left {
                b.left_join(&table, &lhs, &rhs);
            } else if join.right {
                b.right_join(&table, &lhs, &rhs);
            } else {
                b.join(&table, &lhs, &rhs);
            }
        }

        if let Some(sql) = &query.sql {
            b.sql(sql.stmt.clone(), sql.args.clone());
        }

        Ok(())
    }

    fn table_sql(&self, table: &Table) -> String {
        let name = if table.is_model {
            self.resolver.table_name(&table.name)
        } else {
            table.name.clone()
        };
        match &table.alias {
            Some(alias) => format!("{} as {}", quote(&name), quote(alias)),
            None => quote(&name),
        }
    }

    /// Compile an expression that must produce SQL (not a deferred binding).
    fn require(&self, expression: &Expression) -> crate::Result<String> {
        expr::to_sql(expression, &self.ctx())?.ok_or_else(|| {
            Error::Compile(format!("'{}' has no compile-time value", expression.origin))
        })
    }

    fn fill_where(&self, entry: &Where, b: &mut Builder) -> crate::Result<()> {
        if entry.is_group() {
            let mut result = Ok(());
            b.where_group(entry.condition.or, |sub| {
                for nested in &entry.wheres {
                    if result.is_ok() {
                        result = self.fill_where(nested, sub);
                    }
                }
            });
            return result;
        }

        let cond = &entry.condition;
        let field = match &cond.field {
            Some(field) => self.require(field)?,
            None => return Err(Error::Compile("condition is missing its field".to_string())),
        };
        let or = cond.or;

        // sub-query right-hand side
        if let Some(sub_query) = &cond.query {
            let op = if cond.op.is_empty() { "in" } else { &cond.op };
            let mut result = Ok(());
            b.where_sub(&field, op, or, |sub| result = self.fill(sub_query, sub));
            return result;
        }

        match cond.op.as_str() {
            "match" => {
                let value = match &cond.value {
                    Some(Value::String(s)) => format!("%{}%", s),
                    Some(other) => format!("%{}%", other),
                    None => return Err(Error::Compile("match needs a value".to_string())),
                };
                if or {
                    b.or_where(&field, "like", value.into());
                } else {
                    b.where_basic(&field, "like", value.into());
                }
            }
            "is" => match cond.value.as_ref().and_then(Value::as_str) {
                Some("null") => b.where_null(&field, or),
                Some("not null") => b.where_not_null(&field, or),
                _ => return Err(Error::Compile("is needs \"null\" or \"not null\"".to_string())),
            },
            "in" => {
                let values = match &cond.value {
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => vec![other.clone()],
                    None => return Err(Error::Compile("in needs a value".to_string())),
                };
                b.where_in(&field, values, or);
            }
            op => {
                // column-vs-column only on the plain comparison mapping;
                // a value expression under like binds its text instead
                if let Some(value_expr) = &cond.value_expr {
                    if op != "like" {
                        let right = self.require(value_expr)?;
                        b.where_column(&field, op, &right, or);
                        return Ok(());
                    }
                }
                let value = match (&cond.value_expr, &cond.value) {
                    (Some(value_expr), _) => Value::from(value_expr.origin.clone()),
                    (None, Some(value)) => value.clone(),
                    (None, None) => {
                        return Err(Error::Compile("condition is missing its value".to_string()))
                    }
                };
                if or {
                    b.or_where(&field, op, value);
                } else {
                    b.where_basic(&field, op, value);
                }
            }
        }
        Ok(())
    }

    fn fill_having(&self, entry: &Having, b: &mut Builder) -> crate::Result<()> {
        if entry.is_group() {
            let mut result = Ok(());
            b.having_group(entry.condition.or, |sub| {
                for nested in &entry.havings {
                    if result.is_ok() {
                        result = self.fill_having(nested, sub);
                    }
                }
            });
            return result;
        }

        let cond = &entry.condition;
        let field = match &cond.field {
            Some(field) => self.require(field)?,
            None => return Err(Error::Compile("condition is missing its field".to_string())),
        };
        let or = cond.or;

        match cond.op.as_str() {
            "is" => match cond.value.as_ref().and_then(Value::as_str) {
                Some("null") => b.having_column(&field, "is", "null", or),
                Some("not null") => b.having_column(&field, "is", "not null", or),
                _ => return Err(Error::Compile("is needs \"null\" or \"not null\"".to_string())),
            },
            "match" => {
                let value = match &cond.value {
                    Some(Value::String(s)) => format!("%{}%", s),
                    Some(other) => format!("%{}%", other),
                    None => return Err(Error::Compile("match needs a value".to_string())),
                };
                b.having_basic(&field, "like", value.into(), or);
            }
            op => {
                if let Some(value_expr) = &cond.value_expr {
                    let right = self.require(value_expr)?;
                    b.having_column(&field, op, &right, or);
                    return Ok(());
                }
                let value = cond
                    .value
                    .clone()
                    .ok_or_else(|| Error::Compile("condition is missing its value".to_string()))?;
                b.having_basic(&field, op, value, or);
            }
        }
        Ok(())
    }

    /// Compile one GROUP BY entry. JSON-array fields synthesize a
    /// `JSON_TABLE` join and rewrite the matching select entry to read
    /// from it; a rollup label wraps that entry in `IF(GROUPING(...))`
    /// and enables `WITH ROLLUP`.
    fn fill_group(
        &self,
        group: &Group,
        query: &Query,
        selects: &mut [Option<String>],
        json_tables: &mut usize,
        b: &mut Builder,
    ) -> crate::Result<()> {
        if group.field.is_array() {
            let (i, entry) = query
                .select
                .iter()
                .enumerate()
                .find(|(_, s)| s.is_array() && s.field == group.field.field)
                .ok_or_else(|| {
                    Error::Compile(format!(
                        "group field '{}' is not in the select list",
                        group.field.origin
                    ))
                })?;
            *json_tables += 1;
            let n = *json_tables;

            let cast = entry.cast.as_ref().ok_or_else(|| {
                Error::Compile(format!(
                    "group field '{}' needs a type annotation",
                    entry.origin
                ))
            })?;
            let sql_type = cast.mysql_type().ok_or_else(|| {
                Error::Compile(format!("unknown json column type '{}'", cast.name))
            })?;

            let path = match &entry.kind {
                ExprKind::Array { key: Some(key), .. } => format!("$.{}", key),
                _ => "$".to_string(),
            };

            let alias = quote(&format!("__JSON_T{}", n));
            let source = match &entry.table {
                Some(_) => self.require(&plain_column(entry))?,
                None => quote(&entry.field),
            };
            b.join_raw(format!(
                "cross join JSON_TABLE({}, '$[*]' columns ({} {} path '{}') ) AS {}",
                source,
                quote(&format!("F{}", n)),
                sql_type,
                path,
                alias
            ));

            let column = format!("{}.{}", alias, quote(&format!("F{}", n)));
            let output = quote(entry.output_name().unwrap_or(&entry.field));
            selects[i] = Some(match &group.rollup {
                Some(label) => format!(
                    "IF(GROUPING({}),{},{}) as {}",
                    column,
                    quote_str(label),
                    column,
                    output
                ),
                None => format!("{} as {}", column, output),
            });
            b.group_by_raw(column);
            if group.rollup.is_some() {
                b.with_rollup();
            }
            return Ok(());
        }

        let column = self.require(&group.field)?;
        if let Some(label) = &group.rollup {
            if let Some((i, entry)) = query
                .select
                .iter()
                .enumerate()
                .find(|(_, s)| s.field == group.field.field)
            {
                let output = quote(entry.output_name().unwrap_or(&entry.field));
                selects[i] = Some(format!(
                    "IF(GROUPING({}),{},{}) as {}",
                    column,
                    quote_str(label),
                    column,
                    output
                ));
            }
            b.with_rollup();
        }
        b.group_by_raw(column);
        Ok(())
    }
}

/// The bare column reference of a JSON-path expression (drops the path).
fn plain_column(entry: &Expression) -> Expression {
    let mut column = entry.clone();
    column.kind = ExprKind::Array {
        index: ArrayIndex::All,
        key: None,
    };
    column.alias = None;
    column
}
