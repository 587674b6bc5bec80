//! Filter file loading.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Format, Json};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Record filter read from a JSON filter file.
///
/// ```json
/// {
///     "info": { "collection": "Fiction only", "version": "2024-01" },
///     "includeAuthors": ["Tolstoy Leo"],
///     "excludeAuthors": ["Anonymous"],
///     "filter": "lang == \"ru\" && del == 0"
/// }
/// ```
///
/// An empty `includeAuthors` list means "no allow-list".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSpec {
    pub info: Option<FilterInfo>,
    pub include_authors: Vec<String>,
    pub exclude_authors: Vec<String>,
    /// Filter expression; only compiled when unsafe filters are allowed.
    pub filter: Option<String>,
}

/// Overrides for the catalog info persisted with the built database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterInfo {
    pub collection: Option<String>,
    pub version: Option<String>,
}

impl FilterSpec {
    /// Whether the spec rejects nothing.
    pub fn is_empty(&self) -> bool {
        self.include_authors.is_empty() && self.exclude_authors.is_empty() && self.filter.is_none()
    }

    fn normalize(mut self) -> Self {
        for list in [&mut self.include_authors, &mut self.exclude_authors] {
            for author in list.iter_mut() {
                *author = author.trim().to_lowercase();
            }
            list.retain(|author| !author.is_empty());
        }
        self.filter = self.filter.filter(|expr| !expr.trim().is_empty());
        self
    }
}

/// Load a filter file. A file that does not exist means "no filter".
pub fn load_filter(path: &Path) -> Result<Option<FilterSpec>> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no filter file");
        return Ok(None);
    }
    let spec: FilterSpec = Figment::from(Json::file(path))
        .extract()
        .or_raise(|| ErrorKind::Load(path.display().to_string()))?;
    Ok(Some(spec.normalize()))
}
