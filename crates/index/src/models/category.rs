use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The nine index categories. Each one is persisted as a table of the same
/// name.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[display("author")]
    Author,
    #[display("series")]
    Series,
    #[display("title")]
    Title,
    #[display("genre")]
    Genre,
    #[display("lang")]
    Lang,
    #[display("del")]
    Del,
    #[display("date")]
    Date,
    #[display("librate")]
    Librate,
    #[display("ext")]
    Ext,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Self::Author,
        Self::Series,
        Self::Title,
        Self::Genre,
        Self::Lang,
        Self::Del,
        Self::Date,
        Self::Librate,
        Self::Ext,
    ];
    /// Built (and optionally optimized) first.
    pub const PRIMARY: [Category; 3] = [Self::Author, Self::Series, Self::Title];
    pub const SECONDARY: [Category; 6] = [Self::Genre, Self::Lang, Self::Del, Self::Date, Self::Librate, Self::Ext];

    pub fn table(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Series => "series",
            Self::Title => "title",
            Self::Genre => "genre",
            Self::Lang => "lang",
            Self::Del => "del",
            Self::Date => "date",
            Self::Librate => "librate",
            Self::Ext => "ext",
        }
    }

    /// Sorted numerically rather than by collation.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Del | Self::Librate)
    }

    /// Whether the sentinel entry is deleted after ids are assigned.
    pub fn purges_sentinel(self) -> bool {
        self == Self::Series
    }

    /// Table holding merged records after full optimization.
    pub fn merged_table(self) -> String {
        format!("{}_book", self.table())
    }

    /// File holding the book id map after full optimization.
    pub fn id_map_file(self) -> String {
        format!("{}_id.map", self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition() {
        let mut joined: Vec<_> = Category::PRIMARY.iter().chain(Category::SECONDARY.iter()).copied().collect();
        joined.sort();
        assert_eq!(joined, Category::ALL.to_vec());
        for category in Category::ALL {
            assert_eq!(category.to_string(), category.table());
        }
    }
}
