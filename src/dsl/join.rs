//! JOIN entries.

use crate::dsl::Table;
use crate::error::Error;
use crate::expr::Expression;
use serde_json::Value;

/// One JOIN entry: the joined table, the key on the joined side, the
/// foreign key on the source side, and the direction. At most one of
/// `left`/`right` may be set; neither means an inner join.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub from: Option<Table>,
    pub key: Option<Expression>,
    pub foreign: Option<Expression>,
    pub left: bool,
    pub right: bool,
    pub comment: Option<String>,
}

impl Join {
    pub fn from_value(value: &Value, path: &str) -> crate::Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::parse(path, "join entry must be an object"))?;

        let from = match map.get("from").and_then(Value::as_str) {
            Some(s) => Some(Table::parse(s)?),
            None => None,
        };
        let key = match map.get("key").and_then(Value::as_str) {
            Some(s) => Some(Expression::parse(s)?),
            None => None,
        };
        let foreign = match map.get("foreign").and_then(Value::as_str) {
            Some(s) => Some(Expression::parse(s)?),
            None => None,
        };

        Ok(Self {
            from,
            key,
            foreign,
            left: map.get("left").and_then(Value::as_bool).unwrap_or(false),
            right: map.get("right").and_then(Value::as_bool).unwrap_or(false),
            comment: map
                .get("comment")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(from) = &self.from {
            map.insert("from".to_string(), from.to_string().into());
        }
        if let Some(key) = &self.key {
            map.insert("key".to_string(), key.to_string().into());
        }
        if let Some(foreign) = &self.foreign {
            map.insert("foreign".to_string(), foreign.to_string().into());
        }
        if self.left {
            map.insert("left".to_string(), true.into());
        }
        if self.right {
            map.insert("right".to_string(), true.into());
        }
        if let Some(comment) = &self.comment {
            map.insert("comment".to_string(), comment.clone().into());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let value = serde_json::json!({
            "from": "manu as m",
            "key": "m.id",
            "foreign": "u.manu_id",
            "left": true
        });
        let join = Join::from_value(&value, "joins[0]").unwrap();
        assert_eq!(join.from.as_ref().unwrap().name, "manu");
        assert_eq!(join.key.as_ref().unwrap().field, "id");
        assert!(join.left);
        assert!(!join.right);
    }

    #[test]
    fn test_roundtrip() {
        let value = serde_json::json!({
            "from": "manu",
            "key": "manu.id",
            "foreign": "user.manu_id"
        });
        let join = Join::from_value(&value, "joins[0]").unwrap();
        assert_eq!(join.to_value(), value);
    }
}
