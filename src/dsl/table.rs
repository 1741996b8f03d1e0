//! The FROM target of a query.

use crate::error::Error;
use crate::expr::FIELD_RE;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static AS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+as\s+").unwrap());

/// A table reference: `"name"`, `"name as alias"`, `"$model"`, or
/// `"$model as alias"`. Model names are logical names resolved through the
/// compiler's table resolver and may contain dots (`xiang.user`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub alias: Option<String>,
    pub is_model: bool,
}

impl Table {
    /// Parse a table reference string.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::parse("from", "empty table name"));
        }

        let (body, alias) = match AS_RE.splitn(input, 2).collect::<Vec<_>>()[..] {
            [left, right] => (left.trim(), Some(right.trim().to_string())),
            _ => (input, None),
        };

        let (name, is_model) = match body.strip_prefix('$') {
            Some(rest) => (rest.to_string(), true),
            None => (body.to_string(), false),
        };

        Ok(Self {
            name,
            alias,
            is_model,
        })
    }

    /// Structural validation: no whitespace in the name, valid identifier
    /// segments (model names may be dotted), valid alias.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("table name is empty".to_string());
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(format!("table name '{}' contains whitespace", self.name));
        }
        if self.is_model {
            for segment in self.name.split('.') {
                if !FIELD_RE.is_match(segment) {
                    return Err(format!("'{}' is not a valid model name", self.name));
                }
            }
        } else if !FIELD_RE.is_match(&self.name) {
            return Err(format!("'{}' is not a valid table name", self.name));
        }
        if let Some(alias) = &self.alias {
            if !FIELD_RE.is_match(alias) {
                return Err(format!("'{}' is not a valid table alias", alias));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_model {
            write!(f, "${}", self.name)?;
        } else {
            write!(f, "{}", self.name)?;
        }
        if let Some(alias) = &self.alias {
            write!(f, " as {}", alias)?;
        }
        Ok(())
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Table::parse(&s).map_err(D::Error::custom)
    }
}
