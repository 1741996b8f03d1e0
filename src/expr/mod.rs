//! The expression micro-language.
//!
//! Every DSL string that names a column, constant, function call, JSON path
//! or parameter binding parses into an [`Expression`]. The grammar is a
//! fixed sequence of ordered tests — first match wins:
//!
//! ```text
//! score                    plain field
//! t.score as s             table prefix + alias
//! $user.name               model table prefix (resolved at compile time)
//! :MAX(score)              function call
//! ?:keyword                runtime parameter binding
//! 20.5  /  'hello'         constants
//! secret*                  AES-encrypted column
//! meta$.tags.color         JSON object path
//! citys[0].name            JSON array path ([*] for all elements)
//! citys[*](string 50)      with a type annotation tail
//! ```
//!
//! `Display` regenerates the canonical string; the JSON form of an
//! expression is that string, so serde round-trips through it.

mod cast;

pub use cast::TypeCast;

use crate::error::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Valid field / table / alias identifier: ASCII word chars plus CJK.
pub static FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\x{4e00}-\x{9fa5}]+$").unwrap());

static AS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+as\s+").unwrap());
static FUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:([A-Za-z0-9_]+)\((.*)\)$").unwrap());
static NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(\.\d*)?$").unwrap());
static CAST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\(\s*([A-Za-z_]+)(?:\s+(\d+)(?:\s*,\s*(\d+))?)?\s*\)$").unwrap()
});
static TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\$?)([A-Za-z0-9_\x{4e00}-\x{9fa5}]+)\.(.+)$").unwrap()
});
static ARRAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_\x{4e00}-\x{9fa5}]+)\[(\d+|\*)\](?:\.(.+))?$").unwrap()
});
static ARRAY_AT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_\x{4e00}-\x{9fa5}]+)@(.*)$").unwrap()
});

/// Index into a JSON array path. `All` is the `[*]` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayIndex {
    All,
    At(u64),
}

impl ArrayIndex {
    /// The wire representation: `-1` for `*`, the index otherwise.
    pub fn as_i64(&self) -> i64 {
        match self {
            ArrayIndex::All => -1,
            ArrayIndex::At(n) => *n as i64,
        }
    }
}

impl std::fmt::Display for ArrayIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayIndex::All => write!(f, "*"),
            ArrayIndex::At(n) => write!(f, "{}", n),
        }
    }
}

/// What an expression refers to. The variants are mutually exclusive;
/// common attributes (table, alias, type annotation) live on
/// [`Expression`] itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A plain column.
    Field,
    /// A numeric constant (int or float by presence of `.`).
    Number(serde_json::Number),
    /// A single-quoted string constant.
    String(String),
    /// A `?:name` runtime parameter binding.
    Binding,
    /// A `:NAME(arg, ...)` function call.
    Function { name: String, args: Vec<Expression> },
    /// A JSON object path: `field$.key`.
    Object { key: String },
    /// A JSON array path: `field[N]`, `field[*]`, with optional `.key` tail.
    Array {
        index: ArrayIndex,
        key: Option<String>,
    },
    /// An AES-encrypted column: trailing `*`.
    Aes,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// The verbatim input, kept for error reporting.
    pub origin: String,
    /// Table (or model) qualifier, from a `table.` prefix.
    pub table: Option<String>,
    /// Whether the table qualifier is a logical model name (`$` prefix).
    pub is_model: bool,
    /// Column name. Empty for constants and function calls.
    pub field: String,
    /// Output alias, from an `as` tail.
    pub alias: Option<String>,
    pub kind: ExprKind,
    /// Optional `(type ...)` annotation.
    pub cast: Option<TypeCast>,
}

impl Expression {
    /// Parse a DSL expression string.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let origin = input.trim();
        if origin.is_empty() {
            return Err(Error::expression(input, "empty expression"));
        }

        // `expr as alias` — case-insensitive, whitespace-padded.
        let (body, alias) = match AS_RE.splitn(origin, 2).collect::<Vec<_>>()[..] {
            [left, right] => (left.trim(), Some(right.trim().to_string())),
            _ => (origin, None),
        };

        let mut expr = Self::parse_body(origin, body)?;
        expr.alias = alias;
        Ok(expr)
    }

    fn parse_body(origin: &str, body: &str) -> crate::Result<Self> {
        let mut expr = Expression {
            origin: origin.to_string(),
            table: None,
            is_model: false,
            field: String::new(),
            alias: None,
            kind: ExprKind::Field,
            cast: None,
        };

        // Function call: :NAME(arg, ...)
        if body.starts_with(':') {
            let caps = FUN_RE
                .captures(body)
                .ok_or_else(|| Error::expression(origin, "malformed function call"))?;
            let name = caps[1].to_string();
            let args = split_args(&caps[2])
                .into_iter()
                .filter(|a| !a.trim().is_empty())
                .map(|a| Expression::parse(&a))
                .collect::<crate::Result<Vec<_>>>()?;
            expr.kind = ExprKind::Function { name, args };
            return Ok(expr);
        }

        // Runtime binding: ?:name
        if let Some(rest) = body.strip_prefix("?:") {
            expr.field = rest.to_string();
            expr.kind = ExprKind::Binding;
            return Ok(expr);
        }

        // Numeric constant
        if NUM_RE.is_match(body) {
            let num = if body.contains('.') {
                serde_json::Number::from_f64(body.parse::<f64>().unwrap_or(0.0))
                    .ok_or_else(|| Error::expression(origin, "invalid float constant"))?
            } else {
                body.parse::<i64>()
                    .map(serde_json::Number::from)
                    .map_err(|_| Error::expression(origin, "invalid integer constant"))?
            };
            expr.kind = ExprKind::Number(num);
            return Ok(expr);
        }

        // String constant
        if body.len() >= 2 && body.starts_with('\'') && body.ends_with('\'') {
            expr.kind = ExprKind::String(body[1..body.len() - 1].to_string());
            return Ok(expr);
        }

        // Trailing type annotation: (name), (name L), (name P,S)
        let mut body = body.to_string();
        if let Some(caps) = CAST_RE.captures(&body) {
            let mut cast = TypeCast::new(&caps[2]);
            match (caps.get(3), caps.get(4)) {
                (Some(p), Some(s)) => {
                    cast.precision = p.as_str().parse().ok();
                    cast.scale = s.as_str().parse().ok();
                }
                (Some(l), None) => cast.length = l.as_str().parse().ok(),
                _ => {}
            }
            let rest = caps[1].trim().to_string();
            expr.cast = Some(cast);
            body = rest;
        }

        // Leading table. / $model. prefix
        if let Some(caps) = TABLE_RE.captures(&body) {
            expr.is_model = !caps[1].is_empty();
            expr.table = Some(caps[2].to_string());
            body = caps[3].to_string();
        }

        // JSON array path: field[N], field[*], field[N].key, field@key
        if let Some(caps) = ARRAY_RE.captures(&body) {
            expr.field = caps[1].to_string();
            let index = match &caps[2] {
                "*" => ArrayIndex::All,
                n => ArrayIndex::At(
                    n.parse()
                        .map_err(|_| Error::expression(origin, "invalid array index"))?,
                ),
            };
            let key = caps.get(3).map(|m| m.as_str().to_string());
            expr.kind = ExprKind::Array { index, key };
            return Ok(expr);
        }
        if let Some(caps) = ARRAY_AT_RE.captures(&body) {
            expr.field = caps[1].to_string();
            let key = if caps[2].is_empty() {
                None
            } else {
                Some(caps[2].to_string())
            };
            expr.kind = ExprKind::Array {
                index: ArrayIndex::All,
                key,
            };
            return Ok(expr);
        }

        // JSON object path: field$... — left of the first `$` is the field.
        if let Some(pos) = body.find('$') {
            let field = body[..pos].to_string();
            let key = body[pos + 1..].trim_start_matches('.').to_string();
            expr.field = field;
            expr.kind = ExprKind::Object { key };
            return Ok(expr);
        }

        // AES-encrypted column: trailing `*` on a multi-char body.
        if body.len() > 1 && body.ends_with('*') {
            expr.field = body[..body.len() - 1].to_string();
            expr.kind = ExprKind::Aes;
            return Ok(expr);
        }

        // Plain field
        expr.field = body.replace('`', "");
        Ok(expr)
    }

    /// Flag accessors matching the wire-level tag view.
    pub fn is_fun(&self) -> bool {
        matches!(self.kind, ExprKind::Function { .. })
    }
    pub fn is_number(&self) -> bool {
        matches!(self.kind, ExprKind::Number(_))
    }
    pub fn is_string(&self) -> bool {
        matches!(self.kind, ExprKind::String(_))
    }
    pub fn is_binding(&self) -> bool {
        matches!(self.kind, ExprKind::Binding)
    }
    pub fn is_object(&self) -> bool {
        matches!(self.kind, ExprKind::Object { .. })
    }
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ExprKind::Array { .. })
    }
    pub fn is_aes(&self) -> bool {
        matches!(self.kind, ExprKind::Aes)
    }
    pub fn is_constant(&self) -> bool {
        self.is_number() || self.is_string()
    }

    /// Whether the expression carries a JSON path (object or array form).
    pub fn is_json_path(&self) -> bool {
        self.is_object() || self.is_array()
    }

    /// The name a SELECT entry is exposed under: alias if present, else the
    /// field name.
    pub fn output_name(&self) -> Option<&str> {
        if let Some(alias) = &self.alias {
            return Some(alias);
        }
        if self.field.is_empty() {
            None
        } else {
            Some(&self.field)
        }
    }

    /// Structural validation. Checks the identifier character set on field,
    /// table and alias; recurses into function arguments.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match &self.kind {
            ExprKind::Number(_) | ExprKind::String(_) => return Ok(()),
            ExprKind::Function { name, args } => {
                if name.is_empty() {
                    return Err("function name is empty".to_string());
                }
                for arg in args {
                    arg.validate()?;
                }
                return self.validate_tail();
            }
            _ => {}
        }
        if self.field.is_empty() {
            return Err(format!("'{}' has no field name", self.origin));
        }
        if self.field == "*" {
            return self.validate_tail();
        }
        if !FIELD_RE.is_match(&self.field) {
            return Err(format!(
                "'{}' is not a valid field name",
                self.field
            ));
        }
        self.validate_tail()
    }

    fn validate_tail(&self) -> std::result::Result<(), String> {
        if let Some(table) = &self.table {
            if !FIELD_RE.is_match(table) {
                return Err(format!("'{}' is not a valid table name", table));
            }
        }
        if let Some(alias) = &self.alias {
            if !FIELD_RE.is_match(alias) {
                return Err(format!("'{}' is not a valid alias", alias));
            }
        }
        Ok(())
    }
}

/// Split a function argument list on top-level commas. Commas nested in
/// parentheses stay inside their argument; commas inside string constants
/// are not supported (known limitation of the grammar).
pub(crate) fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in input.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::Number(n) => write!(f, "{}", n)?,
            ExprKind::String(s) => write!(f, "'{}'", s)?,
            ExprKind::Binding => write!(f, "?:{}", self.field)?,
            ExprKind::Function { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, ":{}({})", name, args.join(","))?;
            }
            _ => {
                if let Some(table) = &self.table {
                    if self.is_model {
                        write!(f, "${}.", table)?;
                    } else {
                        write!(f, "{}.", table)?;
                    }
                }
                match &self.kind {
                    ExprKind::Field => write!(f, "{}", self.field)?,
                    ExprKind::Aes => write!(f, "{}*", self.field)?,
                    ExprKind::Object { key } => {
                        if key.is_empty() {
                            write!(f, "{}$", self.field)?;
                        } else {
                            write!(f, "{}$.{}", self.field, key)?;
                        }
                    }
                    ExprKind::Array { index, key } => {
                        write!(f, "{}[{}]", self.field, index)?;
                        if let Some(key) = key {
                            write!(f, ".{}", key)?;
                        }
                    }
                    _ => unreachable!(),
                }
                if let Some(cast) = &self.cast {
                    write!(f, "{}", cast)?;
                }
            }
        }
        if let Some(alias) = &self.alias {
            write!(f, " as {}", alias)?;
        }
        Ok(())
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Expression::parse(&s).map_err(D::Error::custom)
    }
}

impl std::str::FromStr for Expression {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Expression::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_field() {
        let e = Expression::parse("score").unwrap();
        assert_eq!(e.field, "score");
        assert_eq!(e.kind, ExprKind::Field);
        assert_eq!(e.to_string(), "score");
    }

    #[test]
    fn test_backticks_removed() {
        let e = Expression::parse("`score`").unwrap();
        assert_eq!(e.field, "score");
    }

    #[test]
    fn test_table_prefix_and_alias() {
        let e = Expression::parse("t.score as s").unwrap();
        assert_eq!(e.table.as_deref(), Some("t"));
        assert_eq!(e.field, "score");
        assert_eq!(e.alias.as_deref(), Some("s"));
        assert!(!e.is_model);
        assert_eq!(e.to_string(), "t.score as s");
    }

    #[test]
    fn test_alias_case_insensitive() {
        let e = Expression::parse("score AS s").unwrap();
        assert_eq!(e.alias.as_deref(), Some("s"));
        // canonical form lowercases the separator
        assert_eq!(e.to_string(), "score as s");
    }

    #[test]
    fn test_model_prefix() {
        let e = Expression::parse("$user.name").unwrap();
        assert!(e.is_model);
        assert_eq!(e.table.as_deref(), Some("user"));
        assert_eq!(e.field, "name");
        assert_eq!(e.to_string(), "$user.name");
    }

    #[test]
    fn test_function() {
        let e = Expression::parse(":MAX(score) as top").unwrap();
        match &e.kind {
            ExprKind::Function { name, args } => {
                assert_eq!(name, "MAX");
                assert_eq!(args.len(), 1);
                assert_eq!(args[0].field, "score");
            }
            k => panic!("expected function, got {:?}", k),
        }
        assert_eq!(e.field, "");
        assert_eq!(e.to_string(), ":MAX(score) as top");
    }

    #[test]
    fn test_function_multiple_args() {
        let e = Expression::parse(":IFNULL(score,0)").unwrap();
        match &e.kind {
            ExprKind::Function { name, args } => {
                assert_eq!(name, "IFNULL");
                assert_eq!(args.len(), 2);
                assert!(args[1].is_number());
            }
            k => panic!("expected function, got {:?}", k),
        }
    }

    #[test]
    fn test_function_nested() {
        let e = Expression::parse(":ROUND(:AVG(score),2)").unwrap();
        match &e.kind {
            ExprKind::Function { name, args } => {
                assert_eq!(name, "ROUND");
                assert_eq!(args.len(), 2);
                assert!(args[0].is_fun());
            }
            k => panic!("expected function, got {:?}", k),
        }
    }

    #[test]
    fn test_malformed_function() {
        assert!(Expression::parse(":MAX(score").is_err());
        assert!(Expression::parse(":(score)").is_err());
    }

    #[test]
    fn test_binding() {
        let e = Expression::parse("?:keyword").unwrap();
        assert!(e.is_binding());
        assert_eq!(e.field, "keyword");
        assert_eq!(e.to_string(), "?:keyword");
    }

    #[test]
    fn test_number_constants() {
        let e = Expression::parse("20").unwrap();
        assert_eq!(e.kind, ExprKind::Number(serde_json::Number::from(20)));

        let e = Expression::parse("20.5").unwrap();
        assert!(e.is_number());
        assert_eq!(e.to_string(), "20.5");
    }

    #[test]
    fn test_string_constant() {
        let e = Expression::parse("'hello world'").unwrap();
        assert_eq!(e.kind, ExprKind::String("hello world".to_string()));
        assert_eq!(e.field, "");
        assert_eq!(e.to_string(), "'hello world'");
    }

    #[test]
    fn test_aes_field() {
        let e = Expression::parse("mobile*").unwrap();
        assert!(e.is_aes());
        assert_eq!(e.field, "mobile");
        assert_eq!(e.to_string(), "mobile*");
    }

    #[test]
    fn test_object_path() {
        let e = Expression::parse("meta$.tags.color").unwrap();
        assert_eq!(e.field, "meta");
        assert_eq!(
            e.kind,
            ExprKind::Object {
                key: "tags.color".to_string()
            }
        );
        assert_eq!(e.to_string(), "meta$.tags.color");
    }

    #[test]
    fn test_object_path_with_array_key() {
        let e = Expression::parse("object$.arr[0].id").unwrap();
        assert_eq!(e.field, "object");
        assert_eq!(
            e.kind,
            ExprKind::Object {
                key: "arr[0].id".to_string()
            }
        );
    }

    #[test]
    fn test_array_path() {
        let e = Expression::parse("citys[*]").unwrap();
        assert_eq!(
            e.kind,
            ExprKind::Array {
                index: ArrayIndex::All,
                key: None
            }
        );

        let e = Expression::parse("array[3].id").unwrap();
        assert_eq!(
            e.kind,
            ExprKind::Array {
                index: ArrayIndex::At(3),
                key: Some("id".to_string())
            }
        );
        assert_eq!(e.to_string(), "array[3].id");
    }

    #[test]
    fn test_array_at_sugar() {
        let e = Expression::parse("tags@name").unwrap();
        assert_eq!(
            e.kind,
            ExprKind::Array {
                index: ArrayIndex::All,
                key: Some("name".to_string())
            }
        );
        // canonical form uses the bracket syntax
        assert_eq!(e.to_string(), "tags[*].name");
    }

    #[test]
    fn test_type_annotation() {
        let e = Expression::parse("citys[*](string 50) as Cities").unwrap();
        assert!(e.is_array());
        let cast = e.cast.as_ref().unwrap();
        assert_eq!(cast.name, "string");
        assert_eq!(cast.length, Some(50));
        assert_eq!(e.to_string(), "citys[*](string 50) as Cities");

        let e = Expression::parse("price(decimal 10,2)").unwrap();
        let cast = e.cast.as_ref().unwrap();
        assert_eq!(cast.precision, Some(10));
        assert_eq!(cast.scale, Some(2));
    }

    #[test]
    fn test_empty_is_error() {
        assert!(Expression::parse("").is_err());
        assert!(Expression::parse("   ").is_err());
    }

    #[test]
    fn test_validate_rejects_spaces() {
        let mut e = Expression::parse("score").unwrap();
        e.field = "sc ore".to_string();
        assert!(e.validate().is_err());
    }

    #[test]
    fn test_roundtrip() {
        for s in [
            "score",
            "t.score as s",
            "$user.name",
            ":MAX(score) as top",
            "?:keyword",
            "20.5",
            "'text'",
            "mobile*",
            "meta$.tags.color",
            "array[3].id",
            "citys[*](string 50) as Cities",
        ] {
            let e = Expression::parse(s).unwrap();
            let r = Expression::parse(&e.to_string()).unwrap();
            assert_eq!(e.kind, r.kind, "{}", s);
            assert_eq!(e.field, r.field, "{}", s);
            assert_eq!(e.alias, r.alias, "{}", s);
            assert_eq!(e.table, r.table, "{}", s);
            assert_eq!(e.cast, r.cast, "{}", s);
        }
    }

    #[test]
    fn test_serde_is_string_form() {
        let e = Expression::parse("t.score as s").unwrap();
        assert_eq!(serde_json::to_value(&e).unwrap(), "t.score as s");

        let e: Expression = serde_json::from_value("mobile*".into()).unwrap();
        assert!(e.is_aes());
    }
}
