//! The MySQL statement builder.
//!
//! Collects clause fragments and bind values, then assembles the final
//! parameterized statement in [`Builder::to_sql`]. Keywords are lowercase,
//! identifiers backtick-quoted, values bound through `?` placeholders.
//!
//! Bind values are kept per clause bucket so that [`Builder::bindings`]
//! returns them in placeholder order regardless of the order the caller
//! drove the builder in (a derived table in FROM binds before the WHERE
//! clause even though it is compiled after it).

use serde_json::Value;

/// Quote an identifier, escaping embedded backticks.
pub fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal, escaping single quotes.
pub fn quote_str(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[derive(Debug, Clone, Default)]
pub struct Builder {
    selects: Vec<String>,
    from: Option<String>,
    from_bindings: Vec<Value>,
    joins: Vec<String>,
    wheres: Vec<(&'static str, String)>,
    where_bindings: Vec<Value>,
    groups: Vec<String>,
    rollup: bool,
    havings: Vec<(&'static str, String)>,
    having_bindings: Vec<Value>,
    orders: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    unions: Vec<Builder>,
    raw: Option<(String, Vec<Value>)>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a compiled SELECT fragment.
    pub fn select(&mut self, fragment: impl Into<String>) {
        self.selects.push(fragment.into());
    }

    /// Set the FROM target; `text` is already quoted.
    pub fn from(&mut self, text: impl Into<String>) {
        self.from = Some(text.into());
    }

    /// Use a derived table as the FROM target.
    pub fn from_sub(&mut self, alias: &str, build: impl FnOnce(&mut Builder)) {
        let mut sub = Builder::new();
        build(&mut sub);
        self.from = Some(format!("({}) as {}", sub.to_sql(), quote(alias)));
        self.from_bindings = sub.bindings();
    }

    pub fn where_basic(&mut self, field: &str, op: &str, value: Value) {
        self.push_where("and", field, op, value);
    }

    pub fn or_where(&mut self, field: &str, op: &str, value: Value) {
        self.push_where("or", field, op, value);
    }

    fn push_where(&mut self, conj: &'static str, field: &str, op: &str, value: Value) {
        self.wheres.push((conj, format!("{} {} ?", field, op)));
        self.where_bindings.push(value);
    }

    pub fn where_in(&mut self, field: &str, values: Vec<Value>, or: bool) {
        let conj = if or { "or" } else { "and" };
        if values.is_empty() {
            // in () is not valid SQL; an empty list matches nothing
            self.wheres.push((conj, format!("{} in (null)", field)));
            return;
        }
        let marks = vec!["?"; values.len()].join(",");
        self.wheres.push((conj, format!("{} in ({})", field, marks)));
        self.where_bindings.extend(values);
    }

    pub fn where_null(&mut self, field: &str, or: bool) {
        let conj = if or { "or" } else { "and" };
        self.wheres.push((conj, format!("{} is null", field)));
    }

    pub fn where_not_null(&mut self, field: &str, or: bool) {
        let conj = if or { "or" } else { "and" };
        self.wheres.push((conj, format!("{} is not null", field)));
    }

    /// Column-vs-column comparison; no bind value.
    pub fn where_column(&mut self, left: &str, op: &str, right: &str, or: bool) {
        let conj = if or { "or" } else { "and" };
        self.wheres.push((conj, format!("{} {} {}", left, op, right)));
    }

    /// Parenthesized group of conditions built in a sub-builder.
    pub fn where_group(&mut self, or: bool, build: impl FnOnce(&mut Builder)) {
        let mut sub = Builder::new();
        build(&mut sub);
        if sub.wheres.is_empty() {
            return;
        }
        let conj = if or { "or" } else { "and" };
        self.wheres
            .push((conj, format!("({})", join_conditions(&sub.wheres))));
        self.where_bindings.append(&mut sub.where_bindings);
    }

    /// `field op (select …)` against a sub-query built in a sub-builder.
    pub fn where_sub(&mut self, field: &str, op: &str, or: bool, build: impl FnOnce(&mut Builder)) {
        let mut sub = Builder::new();
        build(&mut sub);
        let conj = if or { "or" } else { "and" };
        self.wheres
            .push((conj, format!("{} {} ({})", field, op, sub.to_sql())));
        self.where_bindings.extend(sub.bindings());
    }

    pub fn having_basic(&mut self, field: &str, op: &str, value: Value, or: bool) {
        let conj = if or { "or" } else { "and" };
        self.havings.push((conj, format!("{} {} ?", field, op)));
        self.having_bindings.push(value);
    }

    pub fn having_column(&mut self, left: &str, op: &str, right: &str, or: bool) {
        let conj = if or { "or" } else { "and" };
        self.havings.push((conj, format!("{} {} {}", left, op, right)));
    }

    /// Parenthesized group of HAVING conditions.
    pub fn having_group(&mut self, or: bool, build: impl FnOnce(&mut Builder)) {
        let mut sub = Builder::new();
        build(&mut sub);
        if sub.havings.is_empty() {
            return;
        }
        let conj = if or { "or" } else { "and" };
        self.havings
            .push((conj, format!("({})", join_conditions(&sub.havings))));
        self.having_bindings.append(&mut sub.having_bindings);
    }

    pub fn order_by(&mut self, field: &str, direction: &str) {
        self.orders.push(format!("{} {}", field, direction));
    }

    /// Append a raw GROUP BY target.
    pub fn group_by_raw(&mut self, fragment: impl Into<String>) {
        self.groups.push(fragment.into());
    }

    pub fn with_rollup(&mut self) {
        self.rollup = true;
    }

    /// Append a raw JOIN fragment (keyword included by the caller).
    pub fn join_raw(&mut self, fragment: impl Into<String>) {
        self.joins.push(fragment.into());
    }

    pub fn join(&mut self, table: &str, lhs: &str, rhs: &str) {
        self.joins.push(format!("join {} on {} = {}", table, lhs, rhs));
    }

    pub fn left_join(&mut self, table: &str, lhs: &str, rhs: &str) {
        self.joins
            .push(format!("left join {} on {} = {}", table, lhs, rhs));
    }

    pub fn right_join(&mut self, table: &str, lhs: &str, rhs: &str) {
        self.joins
            .push(format!("right join {} on {} = {}", table, lhs, rhs));
    }

    /// Append a UNION ALL arm built in a sub-builder.
    pub fn union_all(&mut self, build: impl FnOnce(&mut Builder)) {
        let mut sub = Builder::new();
        build(&mut sub);
        self.unions.push(sub);
    }

    /// Replace the whole statement with raw text and its bind values.
    pub fn sql(&mut self, stmt: impl Into<String>, args: Vec<Value>) {
        self.raw = Some((stmt.into(), args));
    }

    pub fn limit(&mut self, n: i64) {
        self.limit = Some(n);
    }

    pub fn offset(&mut self, n: i64) {
        self.offset = Some(n);
    }

    /// Assemble the statement.
    pub fn to_sql(&self) -> String {
        if let Some((stmt, _)) = &self.raw {
            return stmt.clone();
        }

        let mut sql = String::from("select ");
        if self.selects.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.selects.join(", "));
        }

        if let Some(from) = &self.from {
            sql.push_str(" from ");
            sql.push_str(from);
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.wheres.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&join_conditions(&self.wheres));
        }

        if !self.groups.is_empty() {
            sql.push_str(" group by ");
            sql.push_str(&self.groups.join(", "));
            if self.rollup {
                sql.push_str(" with rollup");
            }
        }

        if !self.havings.is_empty() {
            sql.push_str(" having ");
            sql.push_str(&join_conditions(&self.havings));
        }

        if !self.orders.is_empty() {
            sql.push_str(" order by ");
            sql.push_str(&self.orders.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" limit {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" offset {}", offset));
        }

        for union in &self.unions {
            sql.push_str(" union all (");
            sql.push_str(&union.to_sql());
            sql.push(')');
        }

        sql
    }

    /// Bind values in placeholder order.
    pub fn bindings(&self) -> Vec<Value> {
        if let Some((_, args)) = &self.raw {
            return args.clone();
        }
        let mut bindings = self.from_bindings.clone();
        bindings.extend(self.where_bindings.iter().cloned());
        bindings.extend(self.having_bindings.iter().cloned());
        for union in &self.unions {
            bindings.extend(union.bindings());
        }
        bindings
    }
}

fn join_conditions(conditions: &[(&'static str, String)]) -> String {
    let mut out = String::new();
    for (i, (conj, fragment)) in conditions.iter().enumerate() {
        if i > 0 {
            out.push(' ');
            out.push_str(conj);
            out.push(' ');
        }
        out.push_str(fragment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_basic_select() {
        let mut b = Builder::new();
        b.from("`table` as `name`");
        assert_eq!(b.to_sql(), "select * from `table` as `name`");
    }

    #[test]
    fn test_where_composition() {
        let mut b = Builder::new();
        b.select("`id`");
        b.from("`user`");
        b.where_basic("`status`", "=", "enabled".into());
        b.or_where("`score`", ">", 90.into());
        assert_eq!(
            b.to_sql(),
            "select `id` from `user` where `status` = ? or `score` > ?"
        );
        assert_eq!(b.bindings(), vec![Value::from("enabled"), Value::from(90)]);
    }

    #[test]
    fn test_where_group() {
        let mut b = Builder::new();
        b.from("`t`");
        b.where_basic("`a`", "=", 1.into());
        b.where_group(false, |g| {
            g.where_basic("`b`", "=", 2.into());
            g.or_where("`c`", "=", 3.into());
        });
        assert_eq!(
            b.to_sql(),
            "select * from `t` where `a` = ? and (`b` = ? or `c` = ?)"
        );
        assert_eq!(b.bindings().len(), 3);
    }

    #[test]
    fn test_where_in_and_null() {
        let mut b = Builder::new();
        b.from("`t`");
        b.where_in("`id`", vec![1.into(), 2.into()], false);
        b.where_null("`deleted_at`", false);
        assert_eq!(
            b.to_sql(),
            "select * from `t` where `id` in (?,?) and `deleted_at` is null"
        );
    }

    #[test]
    fn test_where_sub() {
        let mut b = Builder::new();
        b.from("`user`");
        b.where_sub("`manu_id`", "in", false, |s| {
            s.select("`id`");
            s.from("`manu`");
            s.where_basic("`status`", "=", "enabled".into());
        });
        assert_eq!(
            b.to_sql(),
            "select * from `user` where `manu_id` in (select `id` from `manu` where `status` = ?)"
        );
        assert_eq!(b.bindings(), vec![Value::from("enabled")]);
    }

    #[test]
    fn test_from_sub_binds_before_where() {
        let mut b = Builder::new();
        b.where_basic("`kind`", "=", "b".into());
        b.from_sub("_SUB_", |s| {
            s.from("`t`");
            s.where_basic("`status`", "=", "a".into());
        });
        assert_eq!(
            b.to_sql(),
            "select * from (select * from `t` where `status` = ?) as `_SUB_` where `kind` = ?"
        );
        assert_eq!(b.bindings(), vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_group_rollup_and_having() {
        let mut b = Builder::new();
        b.from("`t`");
        b.group_by_raw("`kind`");
        b.with_rollup();
        b.having_basic("`total`", ">", 10.into(), false);
        assert_eq!(
            b.to_sql(),
            "select * from `t` group by `kind` with rollup having `total` > ?"
        );
    }

    #[test]
    fn test_union_all() {
        let mut b = Builder::new();
        b.select("`id`");
        b.from("`a`");
        b.union_all(|u| {
            u.select("`id`");
            u.from("`b`");
            u.where_basic("`x`", "=", 1.into());
        });
        assert_eq!(
            b.to_sql(),
            "select `id` from `a` union all (select `id` from `b` where `x` = ?)"
        );
        assert_eq!(b.bindings(), vec![Value::from(1)]);
    }

    #[test]
    fn test_raw_overrides() {
        let mut b = Builder::new();
        b.from("`t`");
        b.sql("show tables", vec![]);
        assert_eq!(b.to_sql(), "show tables");
    }

    #[test]
    fn test_limit_offset_order() {
        let mut b = Builder::new();
        b.from("`t`");
        b.order_by("`id`", "desc");
        b.limit(10);
        b.offset(20);
        assert_eq!(
            b.to_sql(),
            "select * from `t` order by `id` desc limit 10 offset 20"
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a`b"), "`a``b`");
        assert_eq!(quote_str("it's"), "'it''s'");
    }
}
