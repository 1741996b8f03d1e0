//! The JSON query DSL: node types, lenient parsing, and structural
//! validation.
//!
//! Parsing accepts every documented sugar shape and canonicalizes it;
//! [`Query::validate`] then reports all semantic problems at once. The two
//! stages are deliberately separate so the linter can attach positions to
//! each accumulated error.

mod condition;
mod group;
mod join;
mod order;
mod query;
mod raw;
mod table;
mod validate;

pub use condition::{Condition, Having, Where, OPERATORS};
pub use group::Group;
pub use join::Join;
pub use order::Order;
pub use query::Query;
pub use raw::RawSql;
pub use table::Table;
pub use validate::{ErrorCode, ValidationError};

/// Suggest the closest candidate for a misspelled keyword. The edit
/// distance budget scales with input length so short tokens only match
/// exactly.
pub(crate) fn did_you_mean(input: &str, candidates: &[&str]) -> Option<String> {
    let max_distance = match input.len() {
        0..=2 => 0,
        3..=5 => 2,
        _ => 3,
    };
    candidates
        .iter()
        .map(|candidate| (strsim::levenshtein(input, candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_you_mean() {
        assert_eq!(did_you_mean("desk", &["asc", "desc"]), Some("desc".to_string()));
        assert_eq!(did_you_mean("ok", &["asc", "desc"]), None);
        assert_eq!(did_you_mean("xxxxxx", &["asc", "desc"]), None);
    }
}
