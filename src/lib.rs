//! # Squill
//!
//! A JSON query DSL for MySQL: parse a JSON document into a [`dsl::Query`],
//! lint it with source positions, compile it to a parameterized SQL
//! statement, and execute it against a pool with late-bound runtime
//! parameters.
//!
//! ## Quick Example
//!
//! ```rust
//! use squill::prelude::*;
//!
//! let query = Query::parse(r#"{
//!     "select": "id, name",
//!     "from": "users",
//!     "wheres": [{ "field": "status", "=": 1 }],
//!     "orders": "id desc"
//! }"#).unwrap();
//!
//! assert!(query.validate().is_empty());
//!
//! let compiled = Compiler::new(&IdentityResolver).compile(&query).unwrap();
//! assert_eq!(
//!     compiled.sql,
//!     "select `id`, `name` from `users` where `status` = ? order by `id` desc"
//! );
//! ```

pub mod compile;
pub mod dsl;
pub mod error;
pub mod exec;
pub mod expr;
pub mod lint;
pub mod registry;

pub use error::{Error, Result};

/// Common imports for working with the DSL end to end.
pub mod prelude {
    pub use crate::compile::{Compiled, Compiler, IdentityResolver, TableResolver};
    pub use crate::dsl::{Condition, Group, Having, Join, Order, Query, RawSql, Table, Where};
    pub use crate::dsl::{ErrorCode, ValidationError};
    pub use crate::error::{Error, Result};
    pub use crate::exec::{CompiledQuery, Executor, Paginate, Params, Record};
    pub use crate::expr::Expression;
    pub use crate::lint::{lint, must_parse, parse, Diagnostic, LintResult, Severity};
    pub use crate::registry::{self, Engine};
}
