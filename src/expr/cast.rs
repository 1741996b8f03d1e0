//! Type annotations attached to expressions.
//!
//! An expression may carry a trailing annotation such as `(string 50)`,
//! `(integer)` or `(decimal 10,2)`. The compiler uses it to derive the SQL
//! column type when a JSON array field is lifted into a `JSON_TABLE` join.

use serde::{Deserialize, Serialize};

/// A parsed `(NAME)`, `(NAME L)` or `(NAME P,S)` tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCast {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl TypeCast {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: None,
            precision: None,
            scale: None,
        }
    }

    /// Map the annotation to a MySQL column type for `JSON_TABLE` columns.
    ///
    /// Unknown names yield `None`; the compiler turns that into a compile
    /// error rather than guessing a type.
    pub fn mysql_type(&self) -> Option<String> {
        match self.name.to_lowercase().as_str() {
            "string" => Some(format!("VARCHAR({})", self.length.unwrap_or(255))),
            "integer" => Some("INT".to_string()),
            "boolean" => Some("BOOLEAN".to_string()),
            "date" | "time" | "datetime" | "timestamp" => Some(self.name.to_uppercase()),
            "float" | "double" | "decimal" => Some(format!(
                "{}({},{})",
                self.name.to_uppercase(),
                self.precision.unwrap_or(10),
                self.scale.unwrap_or(2)
            )),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeCast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.length, self.precision, self.scale) {
            (Some(l), _, _) => write!(f, "({} {})", self.name, l),
            (None, Some(p), Some(s)) => write!(f, "({} {},{})", self.name, p, s),
            (None, Some(p), None) => write!(f, "({} {})", self.name, p),
            _ => write!(f, "({})", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_type_mapping() {
        let mut t = TypeCast::new("string");
        assert_eq!(t.mysql_type().unwrap(), "VARCHAR(255)");
        t.length = Some(50);
        assert_eq!(t.mysql_type().unwrap(), "VARCHAR(50)");

        assert_eq!(TypeCast::new("integer").mysql_type().unwrap(), "INT");
        assert_eq!(TypeCast::new("boolean").mysql_type().unwrap(), "BOOLEAN");
        assert_eq!(TypeCast::new("datetime").mysql_type().unwrap(), "DATETIME");

        let mut d = TypeCast::new("decimal");
        assert_eq!(d.mysql_type().unwrap(), "DECIMAL(10,2)");
        d.precision = Some(8);
        d.scale = Some(4);
        assert_eq!(d.mysql_type().unwrap(), "DECIMAL(8,4)");

        assert!(TypeCast::new("blob").mysql_type().is_none());
    }

    #[test]
    fn test_display() {
        let mut t = TypeCast::new("string");
        assert_eq!(t.to_string(), "(string)");
        t.length = Some(50);
        assert_eq!(t.to_string(), "(string 50)");

        let d = TypeCast {
            name: "decimal".to_string(),
            length: None,
            precision: Some(10),
            scale: Some(2),
        };
        assert_eq!(d.to_string(), "(decimal 10,2)");
    }
}
