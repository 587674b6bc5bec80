//! Bounded-memory build: store first, deduplicate in the store, then build
//! each category by scanning the stored books.

use super::{BOOK_TABLE, Context, Intake, Tables};
use crate::builder;
use crate::catalog::CatalogSource;
use crate::dedup;
use crate::error::{ErrorKind, Result};
use crate::models::Category;
use crate::progress::{Job, Reporter};
use exn::ResultExt;
use tracing::instrument;

/// Books are staged here until duplicates are gone.
const STAGING_TABLE: &str = "book_temp";

/// Admits every filtered record; duplicates are removed afterwards.
struct Deferred;

impl Intake for Deferred {}

#[instrument(level = "debug", skip_all)]
pub(super) async fn run(context: &Context<'_>, source: &dyn CatalogSource, reporter: &mut Reporter<'_>) -> Result<Tables> {
    let store = context.store;
    let tuning = &context.config.tuning;
    reporter.job_count(context.job_count(6));

    reporter.start(Job::Load);
    let recs_loaded = context.load_catalog(source, STAGING_TABLE, &mut Deferred, true, reporter).await?;

    reporter.start(Job::Dedup);
    dedup::remove_duplicates(store, STAGING_TABLE).await?;
    reporter.advance(1.0);

    let mut summaries = Vec::with_capacity(Category::ALL.len());
    reporter.start(Job::Index);
    let width = 1.0 / Category::PRIMARY.len() as f64;
    for (i, category) in Category::PRIMARY.into_iter().enumerate() {
        let mut phase = reporter.phase(i as f64 * width, width);
        summaries.push(builder::build_from_table(store, STAGING_TABLE, category, tuning, &mut phase).await?);
    }

    reporter.start(Job::Finalize);
    store.rename_table(STAGING_TABLE, BOOK_TABLE).await.or_raise(|| ErrorKind::Store)?;
    store.free_memory().await.or_raise(|| ErrorKind::Store)?;
    reporter.advance(1.0);

    reporter.start(Job::Secondary);
    let width = 1.0 / Category::SECONDARY.len() as f64;
    for (i, category) in Category::SECONDARY.into_iter().enumerate() {
        let mut phase = reporter.phase(i as f64 * width, width);
        summaries.push(builder::build_from_table(store, BOOK_TABLE, category, tuning, &mut phase).await?);
    }

    Ok(Tables { recs_loaded, summaries })
}
