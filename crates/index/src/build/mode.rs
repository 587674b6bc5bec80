use derive_more::Display;
use serde::Serialize;
use shelf_config::BuilderConfig;

/// Build strategy.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every category is accumulated in memory while the catalog loads, and
    /// duplicates are rejected inline.
    #[display("legacy")]
    Legacy,
    /// Records are stored first, deduplicated in the store, and each
    /// category is built by scanning the stored table with bounded memory.
    #[display("streaming")]
    Streaming,
}

/// Streaming when low-memory mode is forced or the catalog is larger than
/// the configured threshold, legacy otherwise.
pub fn select_mode(config: &BuilderConfig, catalog_size: u64) -> Mode {
    if config.low_memory_mode || catalog_size > config.tuning.streaming_threshold {
        Mode::Streaming
    } else {
        Mode::Legacy
    }
}
