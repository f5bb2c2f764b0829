use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Builder;
use tracing::info;

use crate::aggregate::{enrich, join, project, retain_private_only, EnrichStats, UnmatchedPolicy};
use crate::client::VrcClient;
use crate::errors::{ExportError, TrackerError};
use crate::models::{AggregatedRecord, FavoriteGroupRecord, FavoriteRecord, FavoritedWorld};
use crate::output::{write_report, OutputFormat};
use crate::paging::{collect_all, DEFAULT_PAGE_SIZE};
use crate::session::Session;

pub const FAVORITE_GROUP_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Favorites,
    FavoriteGroups,
    PrivateWorlds,
}

#[derive(Debug, Clone)]
pub struct ExportProgress {
    pub stage: ExportStage,
    pub current: u64,
    pub total: Option<u64>,
}

pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync + 'static>;

#[derive(Clone)]
pub struct ExportOptions {
    pub page_size: usize,
    pub private_world_only: bool,
    pub unmatched_policy: UnmatchedPolicy,
    pub output_format: OutputFormat,
    pub csv_encoding: String,
    pub output_dir: PathBuf,
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            private_world_only: false,
            unmatched_policy: UnmatchedPolicy::Drop,
            output_format: OutputFormat::Json,
            csv_encoding: "utf-8".to_string(),
            output_dir: PathBuf::from("."),
            progress_callback: None,
        }
    }
}

impl ExportOptions {
    fn report(&self, stage: ExportStage, current: usize, total: Option<usize>) {
        if let Some(callback) = self.progress_callback.as_ref() {
            callback(ExportProgress {
                stage,
                current: current as u64,
                total: total.map(|t| t as u64),
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub output_path: PathBuf,
    pub records: Vec<AggregatedRecord>,
    pub favorites_count: usize,
    pub summaries_count: usize,
    pub enrich_stats: EnrichStats,
}

/// Everything fetched from the API before the join.
#[derive(Debug, Clone, Default)]
pub struct CollectedFavorites {
    pub favorites: Vec<FavoriteRecord>,
    pub groups: Vec<FavoriteGroupRecord>,
    pub summaries: Vec<FavoritedWorld>,
}

pub async fn collect_favorites(
    client: &VrcClient,
    user_id: &str,
    options: &ExportOptions,
) -> Result<CollectedFavorites, TrackerError> {
    let limits = client.favorite_limits().await?;
    let bound = limits.total_world_favorites();
    info!(bound, "collecting favorites");
    options.report(ExportStage::Favorites, 0, Some(bound));
    let favorites = collect_all(
        options.page_size,
        Some(bound),
        move |offset, n| client.favorites_page(offset, n),
        |progress| {
            options.report(
                ExportStage::Favorites,
                progress.next_offset.min(bound),
                Some(bound),
            )
        },
    )
    .await?;

    let groups: Vec<FavoriteGroupRecord> = client
        .favorite_groups(FAVORITE_GROUP_LIMIT)
        .await?
        .into_iter()
        .filter(FavoriteGroupRecord::is_world_group)
        .collect();
    info!(groups = groups.len(), "collecting favorited worlds per group");

    let mut summaries = Vec::new();
    for (index, group) in groups.iter().enumerate() {
        options.report(ExportStage::FavoriteGroups, index, Some(groups.len()));
        let name = group.name.as_str();
        let page = collect_all(
            options.page_size,
            None,
            move |offset, n| client.favorited_worlds_page(user_id, name, offset, n),
            |_| {},
        )
        .await?;
        summaries.extend(page);
    }
    options.report(ExportStage::FavoriteGroups, groups.len(), Some(groups.len()));

    Ok(CollectedFavorites {
        favorites,
        groups,
        summaries,
    })
}

/// Joins, filters and enriches collected data into report rows.
pub async fn aggregate_favorites(
    client: &VrcClient,
    collected: &CollectedFavorites,
    options: &ExportOptions,
) -> Result<(Vec<AggregatedRecord>, EnrichStats), TrackerError> {
    let mut joined = join(
        &collected.favorites,
        &collected.summaries,
        &collected.groups,
        options.unmatched_policy,
    );
    if options.private_world_only {
        retain_private_only(&mut joined);
    }
    info!(records = joined.len(), "favorites joined");

    let stats = enrich(&mut joined, client, |done, total| {
        options.report(ExportStage::PrivateWorlds, done, Some(total))
    })
    .await?;
    Ok((project(&joined), stats))
}

/// Runs the whole extraction for an established session. The report file is
/// only written once every step has succeeded.
pub async fn export_favorites(
    session: &Session,
    options: ExportOptions,
) -> Result<ExportResult, ExportError> {
    let client = &session.client;
    let collected = collect_favorites(client, &session.user.id, &options)
        .await
        .map_err(|err| ExportError::from(err).context("fetching favorites"))?;
    let (records, enrich_stats) = aggregate_favorites(client, &collected, &options)
        .await
        .map_err(|err| ExportError::from(err).context("looking up private worlds"))?;

    let output_path = write_report(
        &options.output_dir,
        options.output_format,
        &options.csv_encoding,
        &records,
    )
    .map_err(ExportError::from)?;
    info!(path = %output_path.display(), records = records.len(), "report written");

    Ok(ExportResult {
        output_path,
        records,
        favorites_count: collected.favorites.len(),
        summaries_count: collected.summaries.len(),
        enrich_stats,
    })
}

/// Runs `future` to completion on a fresh multi-threaded runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output, TrackerError> {
    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| TrackerError::Other(format!("failed to start async runtime: {err}")))?;
    Ok(rt.block_on(future))
}
