//! Expression-to-SQL emission for the MySQL 8.x dialect.

use crate::compile::builder::{quote, quote_str};
use crate::compile::TableResolver;
use crate::error::Error;
use crate::expr::{ArrayIndex, ExprKind, Expression};
use serde_json::{Map, Value};

/// Everything expression emission needs from the surrounding compilation.
pub(crate) struct ExprContext<'a> {
    pub resolver: &'a dyn TableResolver,
    pub aes_key: Option<&'a str>,
    /// Compile-time binding values; `?:name` expressions without an entry
    /// here are deferred to execution and emit nothing.
    pub bindings: &'a Map<String, Value>,
}

impl ExprContext<'_> {
    /// The quoted `table`.`field` (or bare `field`) reference, with model
    /// names resolved to physical table names. `*` stays unquoted.
    fn column(&self, expr: &Expression) -> String {
        let field = if expr.field == "*" {
            "*".to_string()
        } else {
            quote(&expr.field)
        };
        match &expr.table {
            Some(table) => {
                let name = if expr.is_model {
                    self.resolver.table_name(table)
                } else {
                    table.clone()
                };
                format!("{}.{}", quote(&name), field)
            }
            None => field,
        }
    }
}

/// Emit an expression. `None` means the expression is a deferred binding
/// and contributes nothing to the statement.
pub(crate) fn to_sql(expr: &Expression, ctx: &ExprContext) -> crate::Result<Option<String>> {
    let sql = match &expr.kind {
        ExprKind::Field => ctx.column(expr),
        ExprKind::Number(n) => n.to_string(),
        ExprKind::String(s) => quote_str(s),
        ExprKind::Binding => match ctx.bindings.get(&expr.field) {
            Some(value) => literal(value),
            None => return Ok(None),
        },
        ExprKind::Function { name, args } => {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                if let Some(sql) = to_sql(arg, ctx)? {
                    parts.push(sql);
                }
            }
            // function names pass through unvalidated (trust boundary)
            format!("{}({})", name, parts.join(","))
        }
        ExprKind::Object { key } => {
            let path = if key.is_empty() {
                "$".to_string()
            } else {
                format!("$.{}", key)
            };
            format!("JSON_EXTRACT({}, {})", ctx.column(expr), quote_str(&path))
        }
        ExprKind::Array { index, key } => match (index, key) {
            // citys[*] with no key reads the column itself
            (ArrayIndex::All, None) => ctx.column(expr),
            (index, key) => {
                let mut path = format!("$[{}]", index);
                if let Some(key) = key {
                    path.push('.');
                    path.push_str(key);
                }
                format!("JSON_EXTRACT({}, {})", ctx.column(expr), quote_str(&path))
            }
        },
        ExprKind::Aes => {
            let key = ctx
                .aes_key
                .ok_or_else(|| Error::Compile("aes key is not configured".to_string()))?;
            format!("AES_DECRYPT(UNHEX({}), {})", ctx.column(expr), quote_str(key))
        }
    };
    Ok(Some(sql))
}

/// Emit a SELECT-list entry: the expression plus its output alias.
/// Decrypted, extracted and function columns default to the original
/// field name so the row keeps its authored shape.
pub(crate) fn select_fragment(
    expr: &Expression,
    ctx: &ExprContext,
) -> crate::Result<Option<String>> {
    let sql = match to_sql(expr, ctx)? {
        Some(sql) => sql,
        None => return Ok(None),
    };

    let alias = match &expr.alias {
        Some(alias) => Some(alias.as_str()),
        None if needs_default_alias(expr) => expr.output_name(),
        None => None,
    };

    Ok(Some(match alias {
        Some(alias) => format!("{} as {}", sql, quote(alias)),
        None => sql,
    }))
}

fn needs_default_alias(expr: &Expression) -> bool {
    match &expr.kind {
        ExprKind::Object { .. } | ExprKind::Aes => true,
        ExprKind::Array { index, key } => !matches!((index, key), (ArrayIndex::All, None)),
        _ => false,
    }
}

/// Render a JSON value as a SQL literal (compile-time bindings only;
/// runtime values always go through `?` placeholders).
fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_str(s),
        other => quote_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::IdentityResolver;
    use pretty_assertions::assert_eq;

    fn ctx<'a>(bindings: &'a Map<String, Value>) -> ExprContext<'a> {
        ExprContext {
            resolver: &IdentityResolver,
            aes_key: Some("secret"),
            bindings,
        }
    }

    fn emit(input: &str) -> String {
        let empty = Map::new();
        to_sql(&Expression::parse(input).unwrap(), &ctx(&empty))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_plain_and_qualified() {
        assert_eq!(emit("score"), "`score`");
        assert_eq!(emit("t.score"), "`t`.`score`");
    }

    #[test]
    fn test_constants() {
        assert_eq!(emit("20"), "20");
        assert_eq!(emit("'hello'"), "'hello'");
        assert_eq!(emit("'it's ok'"), "'it''s ok'");
    }

    #[test]
    fn test_function() {
        assert_eq!(emit(":MAX(id)"), "MAX(`id`)");
        assert_eq!(emit(":IFNULL(t.score,0)"), "IFNULL(`t`.`score`,0)");
    }

    #[test]
    fn test_json_paths() {
        assert_eq!(emit("array[*].id"), "JSON_EXTRACT(`array`, '$[*].id')");
        assert_eq!(emit("array[3].id"), "JSON_EXTRACT(`array`, '$[3].id')");
        assert_eq!(
            emit("object$.arr[0].id"),
            "JSON_EXTRACT(`object`, '$.arr[0].id')"
        );
        // bare [*] reads the column unchanged
        assert_eq!(emit("citys[*]"), "`citys`");
    }

    #[test]
    fn test_aes() {
        assert_eq!(
            emit("mobile*"),
            "AES_DECRYPT(UNHEX(`mobile`), 'secret')"
        );
    }

    #[test]
    fn test_aes_without_key_fails() {
        let empty = Map::new();
        let mut c = ctx(&empty);
        c.aes_key = None;
        let err = to_sql(&Expression::parse("mobile*").unwrap(), &c).unwrap_err();
        assert!(err.to_string().contains("aes key"));
    }

    #[test]
    fn test_binding_deferred_and_resolved() {
        let empty = Map::new();
        let expr = Expression::parse("?:keyword").unwrap();
        assert_eq!(to_sql(&expr, &ctx(&empty)).unwrap(), None);

        let mut bound = Map::new();
        bound.insert("keyword".to_string(), Value::from("abc"));
        assert_eq!(
            to_sql(&expr, &ctx(&bound)).unwrap(),
            Some("'abc'".to_string())
        );
    }

    #[test]
    fn test_select_default_aliases() {
        let empty = Map::new();
        let c = ctx(&empty);
        let frag = select_fragment(&Expression::parse("mobile*").unwrap(), &c)
            .unwrap()
            .unwrap();
        assert_eq!(frag, "AES_DECRYPT(UNHEX(`mobile`), 'secret') as `mobile`");

        let frag = select_fragment(&Expression::parse("meta$.tags as tags").unwrap(), &c)
            .unwrap()
            .unwrap();
        assert_eq!(frag, "JSON_EXTRACT(`meta`, '$.tags') as `tags`");

        let frag = select_fragment(&Expression::parse("id").unwrap(), &c)
            .unwrap()
            .unwrap();
        assert_eq!(frag, "`id`");
    }
}
