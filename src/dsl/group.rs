//! GROUP BY entries.

use crate::error::Error;
use crate::expr::Expression;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ROLLUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+rollup\s+").unwrap());

/// One GROUP BY entry. Sugar: `"field"`, `"field rollup LABEL"`, arrays of
/// either, or the object form. A non-empty rollup label enables the
/// `WITH ROLLUP` compilation with the label standing in for the subtotal
/// rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub field: Expression,
    pub rollup: Option<String>,
    pub comment: Option<String>,
}

impl Group {
    /// Parse a single `"field [rollup LABEL]"` item.
    pub fn parse_item(input: &str, path: &str) -> crate::Result<Self> {
        let parts: Vec<&str> = ROLLUP_RE.splitn(input.trim(), 3).collect();
        match parts[..] {
            [field] => Ok(Self {
                field: Expression::parse(field)?,
                rollup: None,
                comment: None,
            }),
            [field, label] => Ok(Self {
                field: Expression::parse(field)?,
                rollup: Some(label.trim().to_string()),
                comment: None,
            }),
            _ => Err(Error::parse(
                path,
                format!("group '{}' has too many parts", input),
            )),
        }
    }

    /// Normalize any accepted `groups` shape into the canonical list.
    pub fn parse_list(value: &Value, path: &str) -> crate::Result<Vec<Self>> {
        match value {
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Self::parse_item(item, path))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Self::parse_entry(item, &format!("{}[{}]", path, i)))
                .collect(),
            other => Self::parse_entry(other, path).map(|g| vec![g]),
        }
    }

    fn parse_entry(value: &Value, path: &str) -> crate::Result<Self> {
        match value {
            Value::String(s) => Self::parse_item(s, path),
            Value::Object(map) => {
                let field = map
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::parse(path, "group entry is missing 'field'"))?;
                Ok(Self {
                    field: Expression::parse(field)?,
                    rollup: map
                        .get("rollup")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    comment: map
                        .get("comment")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            }
            other => Err(Error::parse(
                path,
                format!("unexpected group entry: {}", other),
            )),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.field.validate()
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("field".to_string(), self.field.to_string().into());
        if let Some(rollup) = &self.rollup {
            map.insert("rollup".to_string(), rollup.clone().into());
        }
        if let Some(comment) = &self.comment {
            map.insert("comment".to_string(), comment.clone().into());
        }
        Value::Object(map)
    }
}
