//! ORDER BY entries.

use crate::error::Error;
use crate::expr::Expression;
use serde_json::Value;

/// One ORDER BY entry. Accepts sugar at parse time: `"id desc"`, an array of
/// strings, an object `{field, sort}`, or a comma-separated string of items.
/// The canonical form is the object shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: Expression,
    /// Sort direction as authored; constrained to `asc`/`desc` by
    /// validation. Empty means the `asc` default.
    pub sort: String,
    pub comment: Option<String>,
}

impl Order {
    /// Parse a single `"field [direction]"` item.
    pub fn parse_item(input: &str, path: &str) -> crate::Result<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        match parts[..] {
            [field] => Ok(Self {
                field: Expression::parse(field)?,
                sort: String::new(),
                comment: None,
            }),
            [field, sort] => Ok(Self {
                field: Expression::parse(field)?,
                sort: sort.to_string(),
                comment: None,
            }),
            _ => Err(Error::parse(
                path,
                format!("order '{}' has too many parts", input),
            )),
        }
    }

    /// Normalize any accepted `orders` shape into the canonical list.
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
            other => Self::parse_entry(other, path).map(|o| vec![o]),
        }
    }

    fn parse_entry(value: &Value, path: &str) -> crate::Result<Self> {
        match value {
            Value::String(s) => Self::parse_item(s, path),
            Value::Object(map) => {
                let field = map
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::parse(path, "order entry is missing 'field'"))?;
                Ok(Self {
                    field: Expression::parse(field)?,
                    sort: map
                        .get("sort")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    comment: map
                        .get("comment")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            }
            other => Err(Error::parse(
                path,
                format!("unexpected order entry: {}", other),
            )),
        }
    }

    /// The effective direction; empty sort falls back to ascending.
    pub fn direction(&self) -> &str {
        if self.sort.is_empty() {
            "asc"
        } else {
            &self.sort
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.field.validate()?;
        let dir = self.direction().to_lowercase();
        if dir != "asc" && dir != "desc" {
            let suggestion = crate::dsl::did_you_mean(&dir, &["asc", "desc"]);
            return Err(match suggestion {
                Some(s) => format!("'{}' is not a sort direction. Did you mean '{}'?", dir, s),
                None => format!("'{}' is not a sort direction (use asc or desc)", dir),
            });
        }
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("field".to_string(), self.field.to_string().into());
        map.insert("sort".to_string(), self.direction().into());
        if let Some(comment) = &self.comment {
            map.insert("comment".to_string(), comment.clone().into());
        }
        Value::Object(map)
    }
}
