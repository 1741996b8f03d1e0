//! Raw SQL escape hatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw statement with bind values. When present at the top of a query it
/// bypasses the compiler entirely; the statement text is the interop
/// boundary and is passed to the driver untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawSql {
    #[serde(default)]
    pub stmt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RawSql {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.stmt.trim().is_empty() {
            return Err("sql.stmt is empty".to_string());
        }
        Ok(())
    }
}
