//! In-memory build: every category accumulates while the catalog loads.

use super::{BOOK_TABLE, Context, Intake, Tables};
use crate::builder::Accumulator;
use crate::catalog::CatalogSource;
use crate::dedup::InlineDedup;
use crate::error::Result;
use crate::models::{BookRecord, Category, IndexEntry};
use crate::progress::{Job, Reporter};
use crate::sort;
use std::collections::HashMap;
use tracing::instrument;

/// Rejects duplicates against the uids seen so far and feeds every admitted
/// book to all nine accumulators.
struct InMemory {
    dedup: InlineDedup,
    accumulators: HashMap<Category, Accumulator>,
}

impl InMemory {
    fn new() -> Self {
        Self {
            dedup: InlineDedup::default(),
            accumulators: Category::ALL.into_iter().map(|category| (category, Accumulator::new(category))).collect(),
        }
    }

    fn take(&mut self, category: Category) -> Vec<IndexEntry> {
        self.accumulators.remove(&category).map(Accumulator::into_entries).unwrap_or_default()
    }
}

impl Intake for InMemory {
    fn admit(&mut self, book: &BookRecord) -> bool {
        self.dedup.admit(&book.uid)
    }

    fn admitted(&mut self, book: &BookRecord) {
        for accumulator in self.accumulators.values_mut() {
            accumulator.add_book(book);
        }
    }
}

#[instrument(level = "debug", skip_all)]
pub(super) async fn run(context: &Context<'_>, source: &dyn CatalogSource, reporter: &mut Reporter<'_>) -> Result<Tables> {
    let chunk_size = context.config.tuning.insert_chunk_size;
    reporter.job_count(context.job_count(4));

    reporter.start(Job::Load);
    let mut intake = InMemory::new();
    let recs_loaded = context.load_catalog(source, BOOK_TABLE, &mut intake, false, reporter).await?;
    tracing::debug!(uids = intake.dedup.len(), "inline deduplication done");

    let mut summaries = Vec::with_capacity(Category::ALL.len());
    for (job, categories) in [(Job::Index, &Category::PRIMARY[..]), (Job::Secondary, &Category::SECONDARY[..])] {
        reporter.start(job);
        let width = 1.0 / categories.len() as f64;
        for (i, category) in categories.iter().copied().enumerate() {
            let entries = intake.take(category);
            let mut phase = reporter.phase(i as f64 * width, width);
            summaries.push(sort::save_table(context.store, category, entries, chunk_size, &mut phase).await?);
        }
    }

    Ok(Tables { recs_loaded, summaries })
}
