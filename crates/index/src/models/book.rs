use serde::{Deserialize, Serialize};
use shelf_store::Document;

/// One catalog entry, as delivered by the catalog parser.
///
/// `id` is zero until the record is admitted; after that it is immutable and
/// is the row key in the book table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BookRecord {
    pub id: u64,
    /// External unique id of the record.
    pub uid: String,
    /// Comma-separated author names.
    pub author: String,
    pub title: String,
    pub series: String,
    /// Position in the series.
    pub serno: String,
    /// Comma-separated genre codes.
    pub genre: String,
    pub lang: String,
    pub del: bool,
    /// Intake date, `YYYY-MM-DD`.
    pub date: String,
    pub librate: i64,
    pub ext: String,
    pub folder: String,
    pub file: String,
    pub size: u64,
    pub lib_id: String,
    pub keywords: String,
    pub ins_no: u64,
}

impl Document for BookRecord {
    fn id(&self) -> u64 {
        self.id
    }
}

impl BookRecord {
    /// Identity of the archived file this record points at.
    pub fn file_key(&self) -> (&str, &str, &str) {
        (&self.folder, &self.file, &self.ext)
    }
}
