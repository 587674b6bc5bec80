//! Field normalization: raw record fields to index keys.
//!
//! Empty fields map to [`SENTINEL`] so that, for example, books without a
//! series still form one well-defined series entry. Text keys are lowercased
//! and keep the trimmed original as their display name.

use crate::models::{BookRecord, Category, IndexValue};

/// Key used for empty or missing field values.
pub const SENTINEL: &str = "?";

/// A normalized key and the display form it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub value: IndexValue,
    pub name: String,
}

impl Key {
    fn sentinel() -> Self {
        Self {
            value: IndexValue::from(SENTINEL),
            name: SENTINEL.to_string(),
        }
    }
}

/// Normalize a single-valued text field.
pub fn text(raw: &str) -> Key {
    let name = raw.trim();
    if name.is_empty() {
        return Key::sentinel();
    }
    Key {
        value: IndexValue::Text(name.to_lowercase()),
        name: name.to_string(),
    }
}

pub fn number(raw: i64) -> Key {
    Key {
        value: IndexValue::Number(raw),
        name: raw.to_string(),
    }
}

fn split(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|piece| !piece.is_empty())
}

/// Author keys: one per co-author, plus the whole joined string when there
/// is more than one, so exact author combinations can be looked up too.
///
/// ```
/// use shelf_index::normalize::author_keys;
/// let values: Vec<_> = author_keys("Tolstoy Leo, Chekhov Anton").into_iter().map(|k| k.value.to_string()).collect();
/// assert_eq!(values, ["tolstoy leo", "chekhov anton", "tolstoy leo, chekhov anton"]);
/// ```
pub fn author_keys(raw: &str) -> Vec<Key> {
    let mut keys: Vec<Key> = split(raw).map(text).collect();
    match keys.len() {
        0 => keys.push(Key::sentinel()),
        1 => {},
        _ => keys.push(text(raw)),
    }
    keys
}

/// Lowercased co-author names, without the combination string or sentinel.
pub fn author_tokens(raw: &str) -> Vec<String> {
    split(raw).map(str::to_lowercase).collect()
}

/// Every normalized author value a record is indexed under.
pub fn author_set(raw: &str) -> Vec<String> {
    author_keys(raw).into_iter().map(|key| key.value.to_string()).collect()
}

pub fn genre_keys(raw: &str) -> Vec<Key> {
    let keys: Vec<Key> = split(raw).map(text).collect();
    if keys.is_empty() { vec![Key::sentinel()] } else { keys }
}

/// All keys a book contributes to one category.
pub fn keys(category: Category, book: &BookRecord) -> Vec<Key> {
    match category {
        Category::Author => author_keys(&book.author),
        Category::Series => vec![text(&book.series)],
        Category::Title => vec![text(&book.title)],
        Category::Genre => genre_keys(&book.genre),
        Category::Lang => vec![text(&book.lang)],
        Category::Del => vec![number(i64::from(book.del))],
        Category::Date => vec![text(&book.date)],
        Category::Librate => vec![number(book.librate)],
        Category::Ext => vec![text(&book.ext)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn values(keys: Vec<Key>) -> Vec<String> {
        keys.into_iter().map(|key| key.value.to_string()).collect()
    }

    #[rstest]
    #[case("", "?")]
    #[case("   ", "?")]
    #[case("War and Peace", "war and peace")]
    #[case(" Padded ", "padded")]
    fn test_text(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(text(raw).value, IndexValue::from(expected));
    }

    #[test]
    fn test_text_keeps_display_name() {
        assert_eq!(text(" War and Peace ").name, "War and Peace");
    }

    #[rstest]
    #[case("", vec!["?"])]
    #[case("A", vec!["a"])]
    #[case("A, B", vec!["a", "b", "a, b"])]
    #[case("A,,B,", vec!["a", "b", "a,,b,"])]
    #[case(" , ", vec!["?"])]
    fn test_author_keys(#[case] raw: &str, #[case] expected: Vec<&str>) {
        assert_eq!(values(author_keys(raw)), expected);
    }

    #[test]
    fn test_author_tokens_skip_combination() {
        assert_eq!(author_tokens("A, B"), vec!["a", "b"]);
        assert!(author_tokens("").is_empty());
    }

    #[rstest]
    #[case("", vec!["?"])]
    #[case("sf_fantasy", vec!["sf_fantasy"])]
    #[case("sf, sf,det", vec!["sf", "sf", "det"])]
    fn test_genre_keys(#[case] raw: &str, #[case] expected: Vec<&str>) {
        assert_eq!(values(genre_keys(raw)), expected);
    }

    #[test]
    fn test_numeric_categories() {
        let book = BookRecord {
            del: true,
            librate: 4,
            ..Default::default()
        };
        assert_eq!(keys(Category::Del, &book)[0].value, IndexValue::Number(1));
        assert_eq!(keys(Category::Librate, &book)[0].value, IndexValue::Number(4));
        assert_eq!(keys(Category::Series, &book)[0].value, IndexValue::from(SENTINEL));
    }
}
