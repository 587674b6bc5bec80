//! Record filter compiled from a [`FilterSpec`].

mod expr;

pub use self::expr::Expression;
use crate::error::{ErrorKind, Result};
use crate::models::BookRecord;
use crate::normalize;
use shelf_config::FilterSpec;
use std::collections::HashSet;

/// Per-record admission predicate.
///
/// A record is accepted when the expression (if any) matches, its author set
/// intersects the allow-list (if any), and its author set does not intersect
/// the deny-list.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    expression: Option<Expression>,
    include: HashSet<String>,
    exclude: HashSet<String>,
}

impl Filter {
    /// Filter that accepts every record.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Compile a filter spec.
    ///
    /// A spec carrying an expression is refused unless `allow_unsafe` is set;
    /// this is checked before anything else so the build fails before any
    /// table is created.
    pub fn compile(spec: Option<&FilterSpec>, allow_unsafe: bool) -> Result<Self> {
        let Some(spec) = spec else {
            return Ok(Self::accept_all());
        };
        let expression = match spec.filter.as_deref() {
            Some(text) if !allow_unsafe => {
                exn::bail!(ErrorKind::config(format!(
                    "filter expression {text:?} requires unsafe filters to be allowed"
                )))
            },
            Some(text) => {
                tracing::warn!(filter = text, "compiling caller-supplied filter expression");
                Some(Expression::parse(text)?)
            },
            None => None,
        };
        let lower =
            |list: &[String]| -> HashSet<String> { list.iter().map(|author| author.trim().to_lowercase()).collect() };
        Ok(Self {
            expression,
            include: lower(&spec.include_authors),
            exclude: lower(&spec.exclude_authors),
        })
    }

    pub fn accepts(&self, book: &BookRecord) -> bool {
        if let Some(expression) = &self.expression
            && !expression.matches(book)
        {
            return false;
        }
        if self.include.is_empty() && self.exclude.is_empty() {
            return true;
        }
        let authors = normalize::author_set(&book.author);
        let included = self.include.is_empty() || authors.iter().any(|author| self.include.contains(author));
        included && !authors.iter().any(|author| self.exclude.contains(author))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn book(author: &str) -> BookRecord {
        BookRecord {
            author: author.to_string(),
            lang: "ru".to_string(),
            ..Default::default()
        }
    }

    fn spec(include: &[&str], exclude: &[&str], filter: Option<&str>) -> FilterSpec {
        FilterSpec {
            include_authors: include.iter().map(|s| s.to_string()).collect(),
            exclude_authors: exclude.iter().map(|s| s.to_string()).collect(),
            filter: filter.map(str::to_string),
            info: None,
        }
    }

    #[test]
    fn test_no_spec_accepts_everything() {
        let filter = Filter::compile(None, false).unwrap();
        assert!(filter.accepts(&book("")));
    }

    #[test]
    fn test_allow_list() {
        let filter = Filter::compile(Some(&spec(&["alice"], &[], None)), false).unwrap();
        let admitted: Vec<_> = ["Alice", "Bob"].iter().filter(|a| filter.accepts(&book(a))).collect();
        assert_eq!(admitted, vec![&"Alice"]);
    }

    #[rstest]
    #[case("Alice", true)]
    #[case("Alice, Eve", false)]
    #[case("Eve", false)]
    #[case("", true)]
    fn test_deny_list_checks_each_author(#[case] author: &str, #[case] accepted: bool) {
        let filter = Filter::compile(Some(&spec(&[], &["EVE"], None)), false).unwrap();
        assert_eq!(filter.accepts(&book(author)), accepted);
    }

    #[test]
    fn test_co_author_matches_allow_list() {
        let filter = Filter::compile(Some(&spec(&["bob"], &[], None)), false).unwrap();
        assert!(filter.accepts(&book("Alice, Bob")));
    }

    #[test]
    fn test_expression_refused_without_opt_in() {
        let err = Filter::compile(Some(&spec(&[], &[], Some(r#"lang == "ru""#))), false).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Config(_)));
    }

    #[test]
    fn test_expression_combined_with_lists() {
        let filter = Filter::compile(Some(&spec(&["alice"], &[], Some(r#"lang == "en""#))), true).unwrap();
        assert!(!filter.accepts(&book("Alice")));
        let filter = Filter::compile(Some(&spec(&["alice"], &[], Some(r#"lang == "ru""#))), true).unwrap();
        assert!(filter.accepts(&book("Alice")));
        assert!(!filter.accepts(&book("Bob")));
    }
}
