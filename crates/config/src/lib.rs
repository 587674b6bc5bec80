//! Builder configuration.
//!
//! Configuration is layered with `figment`: compiled-in defaults, then an
//! optional file (TOML, YAML or JSON, picked by extension), then environment
//! variables prefixed with `SHELF_`. Nested keys are separated by a double
//! underscore, so `SHELF_BUILDER__LOW_MEMORY_MODE=true` sets
//! `builder.low_memory_mode`.

pub mod error;
mod filter;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::filter::{FilterInfo, FilterSpec, load_filter};

pub const ENV_PREFIX: &str = "SHELF_";
const APPLICATION: &str = "shelf";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub builder: BuilderConfig,
}

/// Options for one index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Path of the catalog source file.
    pub catalog: PathBuf,
    /// Directory the database and id-map files are written to.
    pub data_dir: PathBuf,
    /// Optional JSON filter file; see [`FilterSpec`].
    pub filter_file: Option<PathBuf>,
    /// Force the bounded-memory (streaming) build.
    pub low_memory_mode: bool,
    /// Merge full book rows into the author, series and title indexes.
    pub full_optimization: bool,
    /// Permit the filter file's `filter` expression to be compiled.
    pub allow_unsafe_filter: bool,
    pub tuning: Tuning,
}
impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::new(),
            data_dir: default_data_dir(),
            filter_file: None,
            low_memory_mode: false,
            full_optimization: false,
            allow_unsafe_filter: false,
            tuning: Tuning::default(),
        }
    }
}

/// Size thresholds and chunk sizes. None of these change the output of a
/// build, only its memory profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Catalogs larger than this many bytes are built in streaming mode.
    pub streaming_threshold: u64,
    /// Rows per insert when saving index tables.
    pub insert_chunk_size: usize,
    /// Rows per page when scanning the book table.
    pub scan_chunk_size: usize,
    /// Accumulated entries held in memory before a sorted run is flushed.
    pub flush_threshold: usize,
    /// Book references resolved per optimizer chunk.
    pub optimize_batch_refs: usize,
    /// Pause after this many input batches in streaming mode.
    pub pacing_interval: usize,
    pub pacing_delay_ms: u64,
}
impl Default for Tuning {
    fn default() -> Self {
        Self {
            streaming_threshold: 100 * 1024 * 1024,
            insert_chunk_size: 20_000,
            scan_chunk_size: 5_000,
            flush_threshold: 50_000,
            optimize_batch_refs: 50_000,
            pacing_interval: 10,
            pacing_delay_ms: 10,
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APPLICATION)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl Config {
    /// Load configuration from defaults, an optional file, and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let source = match file {
            Some(path) => {
                figment = match path.extension().and_then(|ext| ext.to_str()) {
                    Some("toml") => figment.merge(Toml::file(path)),
                    Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                    Some("json") => figment.merge(Json::file(path)),
                    _ => exn::bail!(ErrorKind::Invalid(format!(
                        "unsupported configuration format: {}",
                        path.display()
                    ))),
                };
                path.display().to_string()
            },
            None => "environment".to_string(),
        };
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load(source))?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.builder.tuning.validate()
    }
}

impl Tuning {
    /// Every size and interval must be non-zero.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("insert_chunk_size", self.insert_chunk_size),
            ("scan_chunk_size", self.scan_chunk_size),
            ("flush_threshold", self.flush_threshold),
            ("optimize_batch_refs", self.optimize_batch_refs),
            ("pacing_interval", self.pacing_interval),
        ] {
            if value == 0 {
                exn::bail!(ErrorKind::Invalid(format!("tuning.{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.builder.tuning.streaming_threshold, 104_857_600);
        assert!(!config.builder.low_memory_mode);
        assert!(!config.builder.allow_unsafe_filter);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case("shelf.toml", "[builder]\ncatalog = \"lib.inpx\"\nfull_optimization = true\n")]
    #[case("shelf.yaml", "builder:\n  catalog: lib.inpx\n  full_optimization: true\n")]
    #[case("shelf.json", r#"{"builder": {"catalog": "lib.inpx", "full_optimization": true}}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config = Config::load(Some(Path::new(name))).map_err(|e| e.to_string())?;
            assert_eq!(config.builder.catalog, PathBuf::from("lib.inpx"));
            assert!(config.builder.full_optimization);
            assert_eq!(config.builder.tuning, Tuning::default());
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("shelf.toml", "[builder]\nlow_memory_mode = false\n")?;
            jail.set_env("SHELF_BUILDER__LOW_MEMORY_MODE", "true");
            jail.set_env("SHELF_BUILDER__TUNING__FLUSH_THRESHOLD", "10");
            let config = Config::load(Some(Path::new("shelf.toml"))).map_err(|e| e.to_string())?;
            assert!(config.builder.low_memory_mode);
            assert_eq!(config.builder.tuning.flush_threshold, 10);
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::load(Some(Path::new("shelf.ini"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_zero_tuning_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("SHELF_BUILDER__TUNING__SCAN_CHUNK_SIZE", "0");
            let err = Config::load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(msg) if msg.contains("scan_chunk_size")));
            Ok(())
        });
    }
}
