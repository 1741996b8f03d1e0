//! WHERE / HAVING conditions.
//!
//! A condition compares a field against a value, another expression, or a
//! sub-query. Several sugar shapes are admitted at parse time and
//! normalized away:
//!
//! ```json
//! {"field": "score", "op": "=", "value": 20}     // strict form
//! {"field": "score", "=": 20}                    // operator-keyed
//! {":score": "Score", ">": 10}                   // field + comment
//! {"or :score": "Score", ">": 10}                // same, OR-conjoined
//! {"field": "a", "=": "{t.b}"}                   // column vs column
//! {"field": "id", "op": "in", "query": { ... }}  // sub-query
//! {"wheres": [ ... ]}                            // parenthesized group
//! ```

use crate::dsl::{did_you_mean, Query};
use crate::error::Error;
use crate::expr::Expression;
use serde_json::{Map, Value};

/// The recognized comparison operators.
pub const OPERATORS: &[&str] = &["=", ">", ">=", "<", "<=", "like", "match", "in", "is"];

/// A single condition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    pub field: Option<Expression>,
    /// Operator as authored; constrained to [`OPERATORS`] by validation.
    pub op: String,
    pub value: Option<Value>,
    /// Set when the value was written as `"{expr}"` — the comparison is
    /// column-vs-column (or expression-vs-expression).
    pub value_expr: Option<Expression>,
    /// Toggles the conjunction at this node from AND to OR.
    pub or: bool,
    /// Nested sub-query; when present, `value` is ignored.
    pub query: Option<Box<Query>>,
    pub comment: Option<String>,
}

impl Condition {
    /// Normalize a condition from its JSON object form, resolving sugar.
    pub fn from_map(map: &Map<String, Value>, path: &str) -> crate::Result<Self> {
        let mut cond = Condition::default();

        for (key, val) in map {
            match key.as_str() {
                "field" => {
                    let s = val.as_str().ok_or_else(|| {
                        Error::parse(format!("{}.field", path), "field must be a string")
                    })?;
                    cond.field = Some(Expression::parse(s)?);
                }
                "op" => {
                    cond.op = val.as_str().unwrap_or_default().to_string();
                }
                "value" => cond.set_value(val)?,
                "or" => cond.or = val.as_bool().unwrap_or(false),
                "query" => {
                    let sub = Query::from_value(val, &format!("{}.query", path))?;
                    cond.query = Some(Box::new(sub));
                }
                "comment" => {
                    cond.comment = val.as_str().map(str::to_string);
                }
                // group containers, handled by Where/Having
                "wheres" | "havings" => {}
                key if OPERATORS.contains(&key) => {
                    cond.op = key.to_string();
                    cond.set_value(val)?;
                }
                key if key.starts_with("or :") => {
                    cond.or = true;
                    cond.field = Some(Expression::parse(&key[4..])?);
                    cond.comment = val.as_str().map(str::to_string);
                }
                key if key.starts_with(':') => {
                    cond.field = Some(Expression::parse(&key[1..])?);
                    cond.comment = val.as_str().map(str::to_string);
                }
                _ => {}
            }
        }

        Ok(cond)
    }

    /// Record the right-hand side. `"{expr}"` strings become a
    /// column-vs-column comparison.
    fn set_value(&mut self, val: &Value) -> crate::Result<()> {
        if let Some(s) = val.as_str() {
            if s.len() >= 2 && s.starts_with('{') && s.ends_with('}') {
                self.value_expr = Some(Expression::parse(&s[1..s.len() - 1])?);
                return Ok(());
            }
        }
        self.value = Some(val.clone());
        Ok(())
    }

    /// Local structural checks. Returns `(sub-path, message)` pairs;
    /// a `None` sub-path means the key is absent and the error points at
    /// the condition itself. Recursion into a nested `query` is the
    /// validator's job.
    pub fn check(&self) -> Vec<(Option<&'static str>, String)> {
        let mut errors = Vec::new();

        match &self.field {
            None => errors.push((None, "missing field".to_string())),
            Some(field) => {
                if let Err(message) = field.validate() {
                    errors.push((Some("field"), message));
                }
            }
        }

        if self.op.is_empty() {
            errors.push((None, "missing operator".to_string()));
        } else if !OPERATORS.contains(&self.op.as_str()) {
            let message = match did_you_mean(&self.op, OPERATORS) {
                Some(s) => format!("'{}' is not an operator. Did you mean '{}'?", self.op, s),
                None => format!("'{}' is not an operator", self.op),
            };
            errors.push((Some("op"), message));
        }

        if self.value.is_none() && self.value_expr.is_none() && self.query.is_none() {
            errors.push((None, "missing value".to_string()));
        }

        if self.op == "is" {
            match self.value.as_ref().and_then(Value::as_str) {
                Some("null") | Some("not null") => {}
                _ => errors.push((
                    Some("value"),
                    "the 'is' operator requires \"null\" or \"not null\"".to_string(),
                )),
            }
        }

        if let Some(expr) = &self.value_expr {
            if let Err(message) = expr.validate() {
                errors.push((Some("value"), message));
            }
        }

        errors
    }

    /// Canonical object form (without group containers).
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(field) = &self.field {
            map.insert("field".to_string(), field.to_string().into());
        }
        if !self.op.is_empty() {
            map.insert("op".to_string(), self.op.clone().into());
        }
        if let Some(expr) = &self.value_expr {
            map.insert("value".to_string(), format!("{{{}}}", expr).into());
        } else if let Some(value) = &self.value {
            map.insert("value".to_string(), value.clone());
        }
        if self.or {
            map.insert("or".to_string(), true.into());
        }
        if let Some(query) = &self.query {
            map.insert("query".to_string(), query.to_value());
        }
        if let Some(comment) = &self.comment {
            map.insert("comment".to_string(), comment.clone().into());
        }
        map
    }
}

/// A WHERE entry: a condition, or a parenthesized group of nested entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Where {
    pub condition: Condition,
    pub wheres: Vec<Where>,
}

impl Where {
    pub fn from_value(value: &Value, path: &str) -> crate::Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::parse(path, "where entry must be an object"))?;

        let mut wheres = Vec::new();
        if let Some(nested) = map.get("wheres") {
            let items = nested.as_array().ok_or_else(|| {
                Error::parse(format!("{}.wheres", path), "wheres must be an array")
            })?;
            for (i, item) in items.iter().enumerate() {
                wheres.push(Self::from_value(item, &format!("{}.wheres[{}]", path, i))?);
            }
        }

        Ok(Self {
            condition: Condition::from_map(map, path)?,
            wheres,
        })
    }

    /// Whether this entry is a parenthesized group rather than a leaf.
    pub fn is_group(&self) -> bool {
        !self.wheres.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.condition.to_map();
        if !self.wheres.is_empty() {
            map.insert(
                "wheres".to_string(),
                Value::Array(self.wheres.iter().map(Where::to_value).collect()),
            );
        }
        Value::Object(map)
    }
}

/// A HAVING entry. Same shape as [`Where`], nested under `havings`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Having {
    pub condition: Condition,
    pub havings: Vec<Having>,
}

impl Having {
    pub fn from_value(value: &Value, path: &str) -> crate::Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::parse(path, "having entry must be an object"))?;

        let mut havings = Vec::new();
        if let Some(nested) = map.get("havings") {
            let items = nested.as_array().ok_or_else(|| {
                Error::parse(format!("{}.havings", path), "havings must be an array")
            })?;
            for (i, item) in items.iter().enumerate() {
                havings.push(Self::from_value(item, &format!("{}.havings[{}]", path, i))?);
            }
        }

        Ok(Self {
            condition: Condition::from_map(map, path)?,
            havings,
        })
    }

    pub fn is_group(&self) -> bool {
        !self.havings.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.condition.to_map();
        if !self.havings.is_empty() {
            map.insert(
                "havings".to_string(),
                Value::Array(self.havings.iter().map(Having::to_value).collect()),
            );
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cond(value: Value) -> Condition {
        Condition::from_map(value.as_object().unwrap(), "wheres[0]").unwrap()
    }

    #[test]
    fn test_strict_form() {
        let c = cond(serde_json::json!({"field": "score", "op": "=", "value": 20}));
        assert_eq!(c.field.as_ref().unwrap().field, "score");
        assert_eq!(c.op, "=");
        assert_eq!(c.value, Some(20.into()));
        assert!(c.check().is_empty());
    }

    #[test]
    fn test_operator_keyed_sugar() {
        let c = cond(serde_json::json!({"field": "score", "<": 50}));
        assert_eq!(c.op, "<");
        assert_eq!(c.value, Some(50.into()));
    }

    #[test]
    fn test_comment_sugar() {
        let c = cond(serde_json::json!({":score": "Score", ">": 10}));
        assert_eq!(c.field.as_ref().unwrap().field, "score");
        assert_eq!(c.comment.as_deref(), Some("Score"));
        assert!(!c.or);
    }

    #[test]
    fn test_or_comment_sugar() {
        let c = cond(serde_json::json!({"or :score": "Score", ">": 10}));
        assert!(c.or);
        assert_eq!(c.field.as_ref().unwrap().field, "score");
    }

    #[test]
    fn test_value_expression() {
        let c = cond(serde_json::json!({"field": "t.a", "=": "{t.b}"}));
        assert!(c.value.is_none());
        assert_eq!(c.value_expr.as_ref().unwrap().field, "b");
    }

    #[test]
    fn test_sugar_equals_strict() {
        let sugar = cond(serde_json::json!({"field": "score", "<": 50}));
        let strict = cond(serde_json::json!({"field": "score", "op": "<", "value": 50}));
        assert_eq!(sugar, strict);
        assert_eq!(Value::Object(sugar.to_map()), Value::Object(strict.to_map()));
    }

    #[test]
    fn test_missing_field_and_op() {
        let c = cond(serde_json::json!({"value": "a"}));
        let errors = c.check();
        assert!(errors.iter().any(|(_, m)| m == "missing field"));
        assert!(errors.iter().any(|(_, m)| m == "missing operator"));
    }

    #[test]
    fn test_unknown_op_suggestion() {
        let c = cond(serde_json::json!({"field": "a", "op": "lik", "value": "x"}));
        let errors = c.check();
        let (_, message) = errors.iter().find(|(p, _)| *p == Some("op")).unwrap();
        assert!(message.contains("Did you mean 'like'?"), "{}", message);
    }

    #[test]
    fn test_is_operator_values() {
        let c = cond(serde_json::json!({"field": "a", "is": "null"}));
        assert!(c.check().is_empty());

        let c = cond(serde_json::json!({"field": "a", "is": "maybe"}));
        assert!(!c.check().is_empty());
    }

    #[test]
    fn test_nested_group() {
        let w = Where::from_value(
            &serde_json::json!({"wheres": [
                {"field": "name", "like": "%a"},
                {"or :name": "Name", "like": "%b"}
            ]}),
            "wheres[0]",
        )
        .unwrap();
        assert!(w.is_group());
        assert_eq!(w.wheres.len(), 2);
        assert!(w.wheres[1].condition.or);
    }

    #[test]
    fn test_condition_subquery() {
        let w = Where::from_value(
            &serde_json::json!({"field": "manu_id", "op": "in", "query": {
                "select": ["manu_id as id"], "from": "manu"
            }}),
            "wheres[0]",
        )
        .unwrap();
        let q = w.condition.query.as_ref().unwrap();
        assert_eq!(q.select.len(), 1);
        assert!(w.condition.check().is_empty());
    }
}
