//! The query model.
//!
//! A [`Query`] is the normalized form of the JSON DSL document. Parsing is
//! deliberately lenient: anything structurally readable is accepted and
//! sugar is canonicalized, while semantic problems are left for
//! [`Query::validate`](crate::dsl::validate) to report all at once.

use crate::dsl::{Group, Having, Join, Order, RawSql, Table, Where};
use crate::error::Error;
use crate::expr::{split_args, Expression};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub select: Vec<Expression>,
    pub from: Option<Table>,
    pub wheres: Vec<Where>,
    pub orders: Vec<Order>,
    /// `None` means no GROUP BY clause; `Some(vec![])` is authored-but-empty
    /// and rejected by validation.
    pub groups: Option<Vec<Group>>,
    pub havings: Vec<Having>,
    pub unions: Vec<Query>,
    pub joins: Vec<Join>,
    /// Derived-table source; takes the place of `from` when present.
    pub sub_query: Option<Box<Query>>,
    pub alias: Option<String>,
    /// Raw statement escape hatch; bypasses compilation when present.
    pub sql: Option<RawSql>,

    // Pagination knobs. Kept as raw JSON values since any of them may be a
    // `?:name` binding resolved at execution time.
    pub first: Option<Value>,
    pub limit: Option<Value>,
    pub offset: Option<Value>,
    pub page: Option<Value>,
    pub page_size: Option<Value>,
    pub data_only: Option<Value>,

    pub debug: bool,
    pub comment: Option<String>,
}

impl Query {
    /// Parse a DSL document from JSON text.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| Error::parse("", format!("invalid JSON: {}", e)))?;
        Self::from_value(&value, "")
    }

    /// Normalize a JSON value into the query model. `path` names the
    /// position of `value` in the enclosing document, for error reports.
    pub fn from_value(value: &Value, path: &str) -> crate::Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::parse(path, "query must be a JSON object"))?;

        let at = |key: &str| -> String {
            if path.is_empty() {
                key.to_string()
            } else {
                format!("{}.{}", path, key)
            }
        };

        let mut query = Query::default();

        if let Some(select) = map.get("select") {
            query.select = parse_select(select, &at("select"))?;
        }

        if let Some(from) = map.get("from") {
            let s = from
                .as_str()
                .ok_or_else(|| Error::parse(at("from"), "from must be a string"))?;
            query.from = Some(Table::parse(s)?);
        }

        if let Some(wheres) = map.get("wheres") {
            let items = wheres
                .as_array()
                .ok_or_else(|| Error::parse(at("wheres"), "wheres must be an array"))?;
            for (i, item) in items.iter().enumerate() {
                query
                    .wheres
                    .push(Where::from_value(item, &format!("{}[{}]", at("wheres"), i))?);
            }
        }

        if let Some(orders) = map.get("orders") {
            query.orders = Order::parse_list(orders, &at("orders"))?;
        }

        if let Some(groups) = map.get("groups") {
            query.groups = Some(Group::parse_list(groups, &at("groups"))?);
        }

        if let Some(havings) = map.get("havings") {
            let items = havings
                .as_array()
                .ok_or_else(|| Error::parse(at("havings"), "havings must be an array"))?;
            for (i, item) in items.iter().enumerate() {
                query.havings.push(Having::from_value(
                    item,
                    &format!("{}[{}]", at("havings"), i),
                )?);
            }
        }

        if let Some(unions) = map.get("unions") {
            let items = unions
                .as_array()
                .ok_or_else(|| Error::parse(at("unions"), "unions must be an array"))?;
            for (i, item) in items.iter().enumerate() {
                query
                    .unions
                    .push(Query::from_value(item, &format!("{}[{}]", at("unions"), i))?);
            }
        }

        if let Some(joins) = map.get("joins") {
            let items = joins
                .as_array()
                .ok_or_else(|| Error::parse(at("joins"), "joins must be an array"))?;
            for (i, item) in items.iter().enumerate() {
                query
                    .joins
                    .push(Join::from_value(item, &format!("{}[{}]", at("joins"), i))?);
            }
        }

        if let Some(sub) = map.get("query") {
            query.sub_query = Some(Box::new(Query::from_value(sub, &at("query"))?));
        }

        if let Some(alias) = map.get("alias") {
            query.alias = alias.as_str().map(str::to_string);
        }

        if let Some(sql) = map.get("sql") {
            let raw: RawSql = serde_json::from_value(sql.clone())
                .map_err(|e| Error::parse(at("sql"), e.to_string()))?;
            query.sql = Some(raw);
        }

        query.first = map.get("first").cloned();
        query.limit = map.get("limit").cloned();
        query.offset = map.get("offset").cloned();
        query.page = map.get("page").cloned();
        query.page_size = map.get("pagesize").cloned();
        query.data_only = map.get("data-only").cloned();
        query.debug = map.get("debug").and_then(Value::as_bool).unwrap_or(false);
        query.comment = map
            .get("comment")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(query)
    }

    /// Whether the query asks for a single row. Falsy values (`false`,
    /// `0`, `null`, `""`) do not count; template strings do, and are
    /// resolved against the parameter map at execution time.
    pub fn is_first(&self) -> bool {
        self.first.as_ref().map(truthy).unwrap_or(false)
    }

    /// Whether the query asks for paginated execution.
    pub fn is_paginate(&self) -> bool {
        self.page.is_some() || self.page_size.is_some()
    }

    /// Canonical JSON form: sugar resolved, defaults made explicit.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();

        if !self.select.is_empty() {
            map.insert(
                "select".to_string(),
                Value::Array(self.select.iter().map(|e| e.to_string().into()).collect()),
            );
        }
        if let Some(from) = &self.from {
            map.insert("from".to_string(), from.to_string().into());
        }
        if !self.wheres.is_empty() {
            map.insert(
                "wheres".to_string(),
                Value::Array(self.wheres.iter().map(Where::to_value).collect()),
            );
        }
        if !self.orders.is_empty() {
            map.insert(
                "orders".to_string(),
                Value::Array(self.orders.iter().map(Order::to_value).collect()),
            );
        }
        if let Some(groups) = &self.groups {
            map.insert(
                "groups".to_string(),
                Value::Array(groups.iter().map(Group::to_value).collect()),
            );
        }
        if !self.havings.is_empty() {
            map.insert(
                "havings".to_string(),
                Value::Array(self.havings.iter().map(Having::to_value).collect()),
            );
        }
        if !self.unions.is_empty() {
            map.insert(
                "unions".to_string(),
                Value::Array(self.unions.iter().map(Query::to_value).collect()),
            );
        }
        if !self.joins.is_empty() {
            map.insert(
                "joins".to_string(),
                Value::Array(self.joins.iter().map(Join::to_value).collect()),
            );
        }
        if let Some(sub) = &self.sub_query {
            map.insert("query".to_string(), sub.to_value());
        }
        if let Some(alias) = &self.alias {
            map.insert("alias".to_string(), alias.clone().into());
        }
        if let Some(sql) = &self.sql {
            if let Ok(value) = serde_json::to_value(sql) {
                map.insert("sql".to_string(), value);
            }
        }
        if let Some(v) = &self.first {
            map.insert("first".to_string(), v.clone());
        }
        if let Some(v) = &self.limit {
            map.insert("limit".to_string(), v.clone());
        }
        if let Some(v) = &self.offset {
            map.insert("offset".to_string(), v.clone());
        }
        if let Some(v) = &self.page {
            map.insert("page".to_string(), v.clone());
        }
        if let Some(v) = &self.page_size {
            map.insert("pagesize".to_string(), v.clone());
        }
        if let Some(v) = &self.data_only {
            map.insert("data-only".to_string(), v.clone());
        }
        if self.debug {
            map.insert("debug".to_string(), true.into());
        }
        if let Some(comment) = &self.comment {
            map.insert("comment".to_string(), comment.clone().into());
        }

        Value::Object(map)
    }
}

/// DSL truthiness for flag-like values.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        _ => true,
    }
}

/// `select` accepts a comma-separated string or an array of expression
/// strings. Commas nested in function parentheses do not split.
fn parse_select(value: &Value, path: &str) -> crate::Result<Vec<Expression>> {
    match value {
        Value::String(s) => split_args(s)
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(Expression::parse)
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item.as_str() {
                Some(s) => Expression::parse(s),
                None => Err(Error::parse(
                    format!("{}[{}]", path, i),
                    "select entry must be a string",
                )),
            })
            .collect(),
        _ => Err(Error::parse(path, "select must be a string or array")),
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Query {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Query::from_value(&value, "").map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_select_string_form() {
        let q = Query::parse(r#"{"select": "id, name as n, :COUNT(id) as cnt", "from": "user"}"#)
            .unwrap();
        assert_eq!(q.select.len(), 3);
        assert_eq!(q.select[1].alias.as_deref(), Some("n"));
        assert!(q.select[2].is_fun());
        assert_eq!(q.from.as_ref().unwrap().name, "user");
    }

    #[test]
    fn test_select_function_commas_do_not_split() {
        let q = Query::parse(r#"{"select": ":CONCAT(a,b) as ab, id", "from": "t"}"#).unwrap();
        assert_eq!(q.select.len(), 2);
    }

    #[test]
    fn test_invalid_json() {
        let err = Query::parse(r#"{"select": "#).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_pagination_keys_kept_raw() {
        let q = Query::parse(r#"{"from": "t", "page": 1, "pagesize": "?:size"}"#).unwrap();
        assert!(q.is_paginate());
        assert_eq!(q.page, Some(1.into()));
        assert_eq!(q.page_size, Some("?:size".into()));
    }

    #[test]
    fn test_first_requires_a_truthy_value() {
        for source in [
            r#"{"from": "t", "first": false}"#,
            r#"{"from": "t", "first": 0}"#,
            r#"{"from": "t", "first": null}"#,
            r#"{"from": "t", "first": ""}"#,
            r#"{"from": "t"}"#,
        ] {
            assert!(!Query::parse(source).unwrap().is_first(), "{}", source);
        }
        assert!(Query::parse(r#"{"from": "t", "first": true}"#).unwrap().is_first());
        assert!(Query::parse(r#"{"from": "t", "first": 1}"#).unwrap().is_first());
        // templates are resolved at execution time but count as set
        assert!(Query::parse(r#"{"from": "t", "first": "?:one"}"#).unwrap().is_first());
    }

    #[test]
    fn test_sub_query_and_alias() {
        let q = Query::parse(
            r#"{"select": "id", "query": {"select": "id", "from": "user"}, "alias": "u"}"#,
        )
        .unwrap();
        assert!(q.sub_query.is_some());
        assert_eq!(q.alias.as_deref(), Some("u"));
        assert!(q.from.is_none());
    }

    #[test]
    fn test_canonical_roundtrip() {
        let q = Query::parse(
            r#"{
                "select": "id, name as n",
                "from": "user as u",
                "wheres": [{"field": "status", "=": "enabled"}],
                "orders": "id desc",
                "limit": 10
            }"#,
        )
        .unwrap();
        let canonical = q.to_value();
        let reparsed = Query::from_value(&canonical, "").unwrap();
        assert_eq!(q, reparsed);
        assert_eq!(canonical["orders"][0]["sort"], "desc");
    }

    #[test]
    fn test_groups_empty_array_is_kept() {
        let q = Query::parse(r#"{"from": "t", "groups": []}"#).unwrap();
        assert_eq!(q.groups, Some(vec![]));
    }
}
