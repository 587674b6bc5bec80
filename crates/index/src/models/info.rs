use serde::{Deserialize, Serialize};
use shelf_config::FilterInfo;

/// Catalog description reported by the parser, persisted as
/// `config.inpxInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogInfo {
    pub collection: String,
    pub description: String,
    pub id: String,
    pub version: String,
}

impl CatalogInfo {
    /// Apply filter-file overrides; unset fields keep the catalog's values.
    pub fn with_overrides(mut self, overrides: Option<&FilterInfo>) -> Self {
        if let Some(overrides) = overrides {
            if let Some(collection) = &overrides.collection {
                self.collection.clone_from(collection);
            }
            if let Some(version) = &overrides.version {
                self.version.clone_from(version);
            }
        }
        self
    }
}
