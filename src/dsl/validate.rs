//! Structural validation of the query model.
//!
//! Validation is pure and accumulating: it never touches the database and
//! never stops at the first problem, so callers (the linter in particular)
//! get the complete picture in one pass.

use crate::dsl::{Having, Query, Where};
use std::fmt;

/// Stable diagnostic codes. `E0xx` are reported by the linter itself;
/// `E1xx` come from structural validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Raw JSON could not be parsed.
    JsonSyntax,
    /// The parser pipeline failed on otherwise well-formed JSON.
    ParseException,
    /// `select` and `sql` are both absent.
    MissingSelect,
    /// A `select` entry failed expression validation.
    BadExpression,
    /// No `from`, no sub-query, no raw statement.
    MissingFrom,
    /// Table name or alias rejected.
    BadTable,
    /// A condition under `wheres` failed validation.
    BadWhere,
    /// An order entry failed validation.
    BadOrder,
    /// A group entry failed validation.
    BadGroup,
    /// `havings` present without `groups`.
    HavingWithoutGroup,
    /// A condition under `havings` failed validation.
    BadHaving,
    /// A nested union query failed validation.
    BadUnion,
    /// A join is missing its `key`.
    JoinMissingKey,
    /// A join is missing its `foreign` key.
    JoinMissingForeign,
    /// A join is missing its `from` table, or the table is invalid.
    JoinMissingFrom,
    /// A join sets both `left` and `right`.
    JoinConflict,
    /// The raw statement is empty.
    BadSql,
    /// The `query` sub-query failed validation.
    BadSubQuery,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::JsonSyntax => "E001",
            ErrorCode::ParseException => "E002",
            ErrorCode::MissingSelect => "E100",
            ErrorCode::BadExpression => "E101",
            ErrorCode::MissingFrom => "E110",
            ErrorCode::BadTable => "E111",
            ErrorCode::BadWhere => "E120",
            ErrorCode::BadOrder => "E130",
            ErrorCode::BadGroup => "E140",
            ErrorCode::HavingWithoutGroup => "E150",
            ErrorCode::BadHaving => "E151",
            ErrorCode::BadUnion => "E160",
            ErrorCode::JoinMissingKey => "E170",
            ErrorCode::JoinMissingForeign => "E171",
            ErrorCode::JoinMissingFrom => "E172",
            ErrorCode::JoinConflict => "E173",
            ErrorCode::BadSql => "E180",
            ErrorCode::BadSubQuery => "E190",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural error: a code, the dotted+indexed path of the offending
/// node, and a human-readable message.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(code: ErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.code, self.path, self.message)
    }
}

impl Query {
    /// Validate the whole query tree, accumulating every error.
    /// An empty result means the query is structurally sound.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // Raw statement escape hatch.
        if let Some(sql) = &self.sql {
            if let Err(message) = sql.validate() {
                errors.push(ValidationError::new(ErrorCode::BadSql, "sql.stmt", message));
            }
        }

        // Select.
        if self.select.is_empty() && self.sql.is_none() {
            errors.push(ValidationError::new(
                ErrorCode::MissingSelect,
                "select",
                "missing select",
            ));
        }
        for (i, expr) in self.select.iter().enumerate() {
            if let Err(message) = expr.validate() {
                errors.push(ValidationError::new(
                    ErrorCode::BadExpression,
                    format!("select[{}]", i),
                    message,
                ));
            }
        }

        // From.
        match &self.from {
            None => {
                if self.sub_query.is_none() && self.sql.is_none() {
                    errors.push(ValidationError::new(
                        ErrorCode::MissingFrom,
                        "from",
                        "missing from",
                    ));
                }
            }
            Some(table) => {
                if let Err(message) = table.validate() {
                    errors.push(ValidationError::new(ErrorCode::BadTable, "from", message));
                }
            }
        }

        // Wheres.
        for (i, entry) in self.wheres.iter().enumerate() {
            validate_where(entry, &format!("wheres[{}]", i), &mut errors);
        }

        // Orders.
        for (i, order) in self.orders.iter().enumerate() {
            if let Err(message) = order.validate() {
                errors.push(ValidationError::new(
                    ErrorCode::BadOrder,
                    format!("orders[{}]", i),
                    message,
                ));
            }
        }

        // Groups.
        if let Some(groups) = &self.groups {
            if groups.is_empty() {
                errors.push(ValidationError::new(
                    ErrorCode::BadGroup,
                    "groups",
                    "groups is empty",
                ));
            }
            for (i, group) in groups.iter().enumerate() {
                if let Err(message) = group.validate() {
                    errors.push(ValidationError::new(
                        ErrorCode::BadGroup,
                        format!("groups[{}]", i),
                        message,
                    ));
                }
            }
        }

        // Havings.
        if !self.havings.is_empty() && self.groups.is_none() {
            errors.push(ValidationError::new(
                ErrorCode::HavingWithoutGroup,
                "havings",
                "havings requires groups",
            ));
        }
        for (i, entry) in self.havings.iter().enumerate() {
            validate_having(entry, &format!("havings[{}]", i), &mut errors);
        }

        // Unions.
        for (i, union) in self.unions.iter().enumerate() {
            let path = format!("unions[{}]", i);
            for err in union.validate() {
                errors.push(recode(err, ErrorCode::BadUnion, &path));
            }
        }

        // Joins.
        for (i, join) in self.joins.iter().enumerate() {
            let path = format!("joins[{}]", i);
            if join.left && join.right {
                errors.push(ValidationError::new(
                    ErrorCode::JoinConflict,
                    path.clone(),
                    "join cannot be both left and right",
                ));
            }
            match &join.key {
                None => errors.push(ValidationError::new(
                    ErrorCode::JoinMissingKey,
                    format!("{}.key", path),
                    "missing key",
                )),
                Some(key) => {
                    if let Err(message) = key.validate() {
                        errors.push(ValidationError::new(
                            ErrorCode::JoinMissingKey,
                            format!("{}.key", path),
                            message,
                        ));
                    }
                }
            }
            match &join.foreign {
                None => errors.push(ValidationError::new(
                    ErrorCode::JoinMissingForeign,
                    format!("{}.foreign", path),
                    "missing foreign",
                )),
                Some(foreign) => {
                    if let Err(message) = foreign.validate() {
                        errors.push(ValidationError::new(
                            ErrorCode::JoinMissingForeign,
                            format!("{}.foreign", path),
                            message,
                        ));
                    }
                }
            }
            match &join.from {
                None => errors.push(ValidationError::new(
                    ErrorCode::JoinMissingFrom,
                    format!("{}.from", path),
                    "missing from",
                )),
                Some(table) => {
                    if let Err(message) = table.validate() {
                        errors.push(ValidationError::new(
                            ErrorCode::JoinMissingFrom,
                            format!("{}.from", path),
                            message,
                        ));
                    }
                }
            }
        }

        // Sub-query.
        if let Some(sub) = &self.sub_query {
            for err in sub.validate() {
                errors.push(recode(err, ErrorCode::BadSubQuery, "query"));
            }
        }

        errors
    }
}

/// Re-code an error from a nested query into the enclosing context,
/// keeping the original message and extending the path.
fn recode(err: ValidationError, code: ErrorCode, prefix: &str) -> ValidationError {
    ValidationError {
        code,
        path: if err.path.is_empty() {
            prefix.to_string()
        } else {
            format!("{}.{}", prefix, err.path)
        },
        message: err.message,
    }
}

fn validate_where(entry: &Where, path: &str, errors: &mut Vec<ValidationError>) {
    if entry.is_group() {
        for (i, nested) in entry.wheres.iter().enumerate() {
            validate_where(nested, &format!("{}.wheres[{}]", path, i), errors);
        }
        return;
    }
    for (sub, message) in entry.condition.check() {
        errors.push(ValidationError::new(
            ErrorCode::BadWhere,
            join(path, sub),
            message,
        ));
    }
    if let Some(query) = &entry.condition.query {
        let prefix = format!("{}.query", path);
        for err in query.validate() {
            errors.push(recode(err, ErrorCode::BadWhere, &prefix));
        }
    }
}

fn join(path: &str, sub: Option<&str>) -> String {
    match sub {
        Some(sub) => format!("{}.{}", path, sub),
        None => path.to_string(),
    }
}

fn validate_having(entry: &Having, path: &str, errors: &mut Vec<ValidationError>) {
    if entry.is_group() {
        for (i, nested) in entry.havings.iter().enumerate() {
            validate_having(nested, &format!("{}.havings[{}]", path, i), errors);
        }
        return;
    }
    for (sub, message) in entry.condition.check() {
        errors.push(ValidationError::new(
            ErrorCode::BadHaving,
            join(path, sub),
            message,
        ));
    }
    if let Some(query) = &entry.condition.query {
        let prefix = format!("{}.query", path);
        for err in query.validate() {
            errors.push(recode(err, ErrorCode::BadHaving, &prefix));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Query {
        Query::parse(input).unwrap()
    }

    #[test]
    fn test_valid_query() {
        let q = parse(r#"{"select": "id, name", "from": "user"}"#);
        assert!(q.validate().is_empty());
    }

    #[test]
    fn test_missing_select_and_bad_where() {
        let q = parse(r#"{"from": "users", "wheres": [{"op": "=", "value": "a"}]}"#);
        let errors = q.validate();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].code, ErrorCode::MissingSelect);
        assert_eq!(errors[0].path, "select");
        assert_eq!(errors[1].code, ErrorCode::BadWhere);
        assert_eq!(errors[1].path, "wheres[0]");
    }

    #[test]
    fn test_sql_escape_satisfies_select_and_from() {
        let q = parse(r#"{"sql": {"stmt": "show tables"}}"#);
        assert!(q.validate().is_empty());

        let q = parse(r#"{"sql": {"stmt": ""}}"#);
        let errors = q.validate();
        assert!(errors.iter().any(|e| e.code == ErrorCode::BadSql));
    }

    #[test]
    fn test_missing_from() {
        let q = parse(r#"{"select": "id"}"#);
        let errors = q.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::MissingFrom);
    }

    #[test]
    fn test_subquery_replaces_from() {
        let q = parse(r#"{"select": "id", "query": {"select": "id", "from": "t"}, "alias": "s"}"#);
        assert!(q.validate().is_empty());
    }

    #[test]
    fn test_having_without_group() {
        let q = parse(
            r#"{"select": "kind", "from": "t", "havings": [{"field": "kind", "=": "x"}]}"#,
        );
        let errors = q.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::HavingWithoutGroup);
        assert_eq!(errors[0].path, "havings");
    }

    #[test]
    fn test_join_missing_parts() {
        let q = parse(r#"{"select": "id", "from": "t", "joins": [{"left": true}]}"#);
        let codes: Vec<&str> = q.validate().iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["E170", "E171", "E172"]);
    }

    #[test]
    fn test_join_both_directions_rejected() {
        let q = parse(
            r#"{"select": "id", "from": "t", "joins": [{
                "from": "manu", "key": "manu.id", "foreign": "t.manu_id",
                "left": true, "right": true
            }]}"#,
        );
        let errors = q.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::JoinConflict);
        assert_eq!(errors[0].path, "joins[0]");
    }

    #[test]
    fn test_union_errors_recoded() {
        let q = parse(r#"{"select": "id", "from": "t", "unions": [{"select": "id"}]}"#);
        let errors = q.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::BadUnion);
        assert_eq!(errors[0].path, "unions[0].from");
    }

    #[test]
    fn test_condition_subquery_errors_recoded() {
        let q = parse(
            r#"{"select": "id", "from": "t",
                "wheres": [{"field": "id", "op": "in", "query": {"from": "x"}}]}"#,
        );
        let errors = q.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::BadWhere);
        assert_eq!(errors[0].path, "wheres[0].query.select");
    }

    #[test]
    fn test_nested_where_group_paths() {
        let q = parse(
            r#"{"select": "id", "from": "t",
                "wheres": [{"wheres": [{"field": "a", "op": "?", "value": 1}]}]}"#,
        );
        let errors = q.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "wheres[0].wheres[0].op");
    }

    #[test]
    fn test_validate_stable_after_roundtrip() {
        let q = parse(r#"{"from": "users", "wheres": [{"op": "=", "value": "a"}]}"#);
        let reparsed = Query::from_value(&q.to_value(), "").unwrap();
        assert_eq!(q.validate(), reparsed.validate());
    }
}
