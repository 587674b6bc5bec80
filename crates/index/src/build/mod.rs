//! End-to-end index build.
//!
//! [`Builder::run`] checks the configuration, picks a [`Mode`], and runs the
//! mode's fixed sequence of jobs:
//!
//! | Mode      | Jobs                                                                  |
//! |-----------|-----------------------------------------------------------------------|
//! | legacy    | load, create indexes, other indexes, optimization*, stats             |
//! | streaming | load, remove duplicates, create indexes, finalize, other indexes, optimization*, stats |
//!
//! Jobs marked * run only with full optimization. The `config` record is
//! dropped before the first job and written in one transaction after the
//! last one, so a build that fails anywhere leaves no `config` behind.

mod hash;
mod legacy;
mod mode;
mod streaming;

pub use self::hash::catalog_hash;
pub use self::mode::{Mode, select_mode};
use crate::catalog::{CatalogEvent, CatalogSource};
use crate::error::{ErrorKind, Result};
use crate::filter::Filter;
use crate::models::{BookIdMap, BookRecord, Category, Stats, TableSummary};
use crate::optimize;
use crate::progress::{Job, Progress, Reporter};
use crate::stats;
use exn::ResultExt;
use futures::StreamExt;
use serde_json::json;
use shelf_config::{BuilderConfig, load_filter};
use shelf_store::{META_TABLE, Row, Store, StoreHandle};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::instrument;

/// Final name of the book table in both modes.
pub const BOOK_TABLE: &str = "book";

/// What a finished build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub mode: Mode,
    pub stats: Stats,
    /// One summary per category, in build order.
    pub tables: Vec<TableSummary>,
    /// Present for the optimized categories when full optimization ran.
    pub id_maps: BTreeMap<Category, BookIdMap>,
}

impl BuildReport {
    pub fn table(&self, category: Category) -> Option<&TableSummary> {
        self.tables.iter().find(|summary| summary.category == category)
    }
}

/// Runs index builds against one store.
pub struct Builder {
    store: StoreHandle,
    config: BuilderConfig,
}

impl Builder {
    pub fn new(store: StoreHandle, config: BuilderConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build every index table, the statistics and the `config` record from
    /// `source`.
    ///
    /// Configuration problems (zero tuning values, missing catalog file,
    /// unreadable filter file, filter expression without opt-in) are raised before any table is
    /// touched. Any later failure aborts the build.
    #[instrument(skip_all, fields(catalog = %self.config.catalog.display(), store = self.store.name()))]
    pub async fn run(
        &self,
        source: &dyn CatalogSource,
        on_progress: impl FnMut(&Progress) + Send,
    ) -> Result<BuildReport> {
        let config = &self.config;
        config.tuning.validate().or_raise(|| ErrorKind::config("invalid tuning"))?;
        let catalog = tokio::fs::metadata(&config.catalog)
            .await
            .or_raise(|| ErrorKind::config(format!("catalog not found: {}", config.catalog.display())))?;
        if !catalog.is_file() {
            exn::bail!(ErrorKind::config(format!("catalog is not a file: {}", config.catalog.display())));
        }
        let spec = match &config.filter_file {
            Some(path) => load_filter(path)
                .or_raise(|| ErrorKind::config(format!("filter file could not be loaded: {}", path.display())))?,
            None => None,
        };
        let filter = Filter::compile(spec.as_ref(), config.allow_unsafe_filter)?;
        let hash = catalog_hash(&config.catalog, spec.as_ref()).await?;
        let mode = select_mode(config, catalog.len());
        tracing::info!(%mode, catalog_size = catalog.len(), "build mode selected");

        let store = &*self.store;
        store.drop_table(META_TABLE).await.or_raise(|| ErrorKind::Store)?;
        let mut reporter = Reporter::new(on_progress);
        let context = Context { store, config, filter: &filter };
        let tables = match mode {
            Mode::Legacy => legacy::run(&context, source, &mut reporter).await?,
            Mode::Streaming => streaming::run(&context, source, &mut reporter).await?,
        };
        let report = context.finish(mode, tables, &mut reporter).await?;

        let info = source.info().with_overrides(spec.as_ref().and_then(|spec| spec.info.as_ref()));
        let record = [("inpxInfo", json!(info)), ("stats", json!(report.stats)), ("inpxHash", json!(hash))];
        store.put_meta(&record).await.or_raise(|| ErrorKind::Store)?;
        reporter.finish();
        tracing::info!(%mode, books = report.stats.book_count_all, "build finished");
        Ok(report)
    }
}

/// Tables built by a mode, plus how many raw records the catalog held.
struct Tables {
    recs_loaded: u64,
    summaries: Vec<TableSummary>,
}

/// Decides, record by record, what the loader admits and who else sees it.
trait Intake: Send {
    /// Called for records that passed the filter, before an id is assigned.
    fn admit(&mut self, _book: &BookRecord) -> bool {
        true
    }

    /// Called once the record has its id.
    fn admitted(&mut self, _book: &BookRecord) {}
}

/// Shared state of one build.
struct Context<'a> {
    store: &'a dyn Store,
    config: &'a BuilderConfig,
    filter: &'a Filter,
}

impl Context<'_> {
    fn job_count(&self, jobs: u32) -> u32 {
        if self.config.full_optimization { jobs + 1 } else { jobs }
    }

    /// Load the catalog into `table`, numbering admitted records from 1 in
    /// arrival order. Returns the number of raw records seen.
    ///
    /// With `pace` set, the store is asked to release memory and the loader
    /// pauses every `pacing_interval` batches.
    async fn load_catalog(
        &self,
        source: &dyn CatalogSource,
        table: &str,
        intake: &mut dyn Intake,
        pace: bool,
        reporter: &mut Reporter<'_>,
    ) -> Result<u64> {
        let tuning = &self.config.tuning;
        self.store.create_table(table).await.or_raise(|| ErrorKind::Store)?;
        let mut events = source.parse();
        let mut recs_loaded = 0u64;
        let mut next_id = 0u64;
        let mut batches = 0usize;
        while let Some(event) = events.next().await {
            match event.or_raise(|| ErrorKind::Catalog)? {
                CatalogEvent::Progress { current, total_files } => reporter.read_state(current, total_files),
                CatalogEvent::Batch(records) => {
                    recs_loaded += records.len() as u64;
                    let mut rows = Vec::with_capacity(records.len());
                    for mut book in records {
                        if !self.filter.accepts(&book) || !intake.admit(&book) {
                            continue;
                        }
                        next_id += 1;
                        book.id = next_id;
                        intake.admitted(&book);
                        rows.push(Row::from_document(&book).or_raise(|| ErrorKind::Store)?);
                    }
                    if !rows.is_empty() {
                        self.store.insert(table, rows).await.or_raise(|| ErrorKind::Store)?;
                    }
                    reporter.recs_loaded(recs_loaded);

                    batches += 1;
                    if pace && batches % tuning.pacing_interval.max(1) == 0 {
                        self.store.free_memory().await.or_raise(|| ErrorKind::Store)?;
                        tokio::time::sleep(Duration::from_millis(tuning.pacing_delay_ms)).await;
                        tracing::debug!(batches, "paused loading");
                    }
                },
            }
        }
        reporter.advance(1.0);
        tracing::info!(table, recs_loaded, admitted = next_id, "catalog loaded");
        Ok(recs_loaded)
    }

    /// The jobs both modes end with: optional optimization, then statistics.
    async fn finish(&self, mode: Mode, tables: Tables, reporter: &mut Reporter<'_>) -> Result<BuildReport> {
        let mut id_maps = BTreeMap::new();
        if self.config.full_optimization {
            reporter.start(Job::Optimize);
            let width = 1.0 / Category::PRIMARY.len() as f64;
            for (i, category) in Category::PRIMARY.into_iter().enumerate() {
                let map = optimize::optimize_table(
                    self.store,
                    category,
                    BOOK_TABLE,
                    &self.config.data_dir,
                    &self.config.tuning,
                    mode == Mode::Streaming,
                    &mut reporter.phase(i as f64 * width, width),
                )
                .await?;
                id_maps.insert(category, map);
            }
        }

        reporter.start(Job::Stats);
        let stats = stats::collect(
            self.store,
            BOOK_TABLE,
            tables.recs_loaded,
            &tables.summaries,
            self.config.tuning.scan_chunk_size,
            &mut reporter.phase(0.0, 1.0),
        )
        .await?;
        Ok(BuildReport {
            mode,
            stats,
            tables: tables.summaries,
            id_maps,
        })
    }
}
