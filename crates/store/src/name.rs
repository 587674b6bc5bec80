//! Identifier validation.
//!
//! Table and field names end up interpolated into SQL (table names cannot be
//! bound as parameters), so every name passes through [`validate`] first.

use crate::error::{ErrorKind, Result};

const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validates a table or document field name.
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit.
///
/// # Examples
///
/// ```
/// use shelf_store::validate_name;
/// assert!(validate_name("author").is_ok());
/// assert!(validate_name("author_run0").is_ok());
/// assert!(validate_name("book; DROP TABLE book").is_err());
/// assert!(validate_name("0book").is_err());
/// assert!(validate_name("").is_err());
/// ```
pub fn validate(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LENGTH {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("book")]
    #[case("book_temp")]
    #[case("_hidden")]
    #[case("librate")]
    #[case("title_run12")]
    fn test_valid_names(#[case] name: &str) {
        assert_eq!(validate(name).unwrap(), name);
    }

    #[rstest]
    #[case("")]
    #[case("1st")]
    #[case("with space")]
    #[case("quote\"d")]
    #[case("semi;colon")]
    #[case("dash-ed")]
    #[case("ünïcode")]
    fn test_invalid_names(#[case] name: &str) {
        let err = validate(name).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(n) if n == name));
    }

    #[test]
    fn test_overlong_name() {
        let name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate(&name).is_err());
    }
}
