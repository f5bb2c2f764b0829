//! Three-way join of favorites, favorite groups and favorited-world
//! summaries, plus the detail back-fill for private worlds.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::VrcClient;
use crate::errors::TrackerError;
use crate::models::{
    world_link, world_reference, AggregatedRecord, FavoriteGroupRecord, FavoriteRecord,
    FavoritedWorld, ReleaseStatus, WorldDetail, WorldStatus,
};

/// What to do with a favorite that has no matching summary or group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    #[default]
    Drop,
    Report,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedFavorite {
    pub favorite: FavoriteRecord,
    pub group: Option<FavoriteGroupRecord>,
    pub summary: Option<FavoritedWorld>,
}

impl JoinedFavorite {
    pub fn release_status(&self) -> ReleaseStatus {
        self.summary
            .as_ref()
            .map(|s| s.release_status)
            .unwrap_or_default()
    }

    pub fn is_private(&self) -> bool {
        self.release_status() == ReleaseStatus::Private
    }

    pub fn is_matched(&self) -> bool {
        self.group.is_some() && self.summary.is_some()
    }
}

/// Inner join on `(favorite id, group name)`, in favorites order. With
/// [`UnmatchedPolicy::Report`] unmatched favorites are kept with whatever
/// side could be found.
pub fn join(
    favorites: &[FavoriteRecord],
    summaries: &[FavoritedWorld],
    groups: &[FavoriteGroupRecord],
    policy: UnmatchedPolicy,
) -> Vec<JoinedFavorite> {
    let mut groups_by_name: HashMap<&str, &FavoriteGroupRecord> = HashMap::new();
    for group in groups {
        groups_by_name.entry(group.name.as_str()).or_insert(group);
    }
    let mut summaries_by_key: HashMap<(&str, &str), &FavoritedWorld> = HashMap::new();
    for summary in summaries {
        if let Some(favorite_id) = summary.favorite_id.as_deref() {
            summaries_by_key
                .entry((favorite_id, summary.favorite_group.as_str()))
                .or_insert(summary);
        }
    }

    let mut joined = Vec::with_capacity(favorites.len());
    let mut dropped = 0usize;
    for favorite in favorites {
        let matched = favorite.tags.iter().find_map(|tag| {
            let group = groups_by_name.get(tag.as_str())?;
            let summary = summaries_by_key.get(&(favorite.id.as_str(), tag.as_str()))?;
            Some((*group, *summary))
        });
        match (matched, policy) {
            (Some((group, summary)), _) => joined.push(JoinedFavorite {
                favorite: favorite.clone(),
                group: Some(group.clone()),
                summary: Some(summary.clone()),
            }),
            (None, UnmatchedPolicy::Report) => {
                debug!(favorite = %favorite.id, world = %favorite.favorite_id, "reporting unmatched favorite");
                joined.push(JoinedFavorite {
                    favorite: favorite.clone(),
                    group: favorite
                        .group_name()
                        .and_then(|name| groups_by_name.get(name))
                        .map(|g| (*g).clone()),
                    summary: None,
                });
            }
            (None, UnmatchedPolicy::Drop) => {
                debug!(favorite = %favorite.id, world = %favorite.favorite_id, "dropping unmatched favorite");
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        info!(dropped, "favorites without a matching world summary were dropped");
    }
    joined
}

pub fn retain_private_only(records: &mut Vec<JoinedFavorite>) {
    records.retain(JoinedFavorite::is_private);
}

/// Direct world lookup used by [`enrich`].
pub trait WorldLookup {
    fn lookup_world(
        &self,
        world_id: &str,
    ) -> impl Future<Output = Result<WorldDetail, TrackerError>> + Send;
}

impl WorldLookup for VrcClient {
    async fn lookup_world(&self, world_id: &str) -> Result<WorldDetail, TrackerError> {
        self.world(world_id).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub updated: usize,
    pub not_found: usize,
}

/// Fetches details for every private record and overwrites the masked
/// author, id and name. A 404 leaves the record untouched; any other error
/// aborts.
pub async fn enrich<L, P>(
    records: &mut [JoinedFavorite],
    lookup: &L,
    mut on_progress: P,
) -> Result<EnrichStats, TrackerError>
where
    L: WorldLookup,
    P: FnMut(usize, usize),
{
    let targets: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_private())
        .map(|(idx, _)| idx)
        .collect();
    let total = targets.len();
    let mut stats = EnrichStats::default();
    for (done, idx) in targets.into_iter().enumerate() {
        on_progress(done, total);
        let record = &mut records[idx];
        match lookup.lookup_world(&record.favorite.favorite_id).await {
            Ok(detail) => {
                if let Some(summary) = record.summary.as_mut() {
                    summary.author_name = detail.author_name;
                    summary.id = detail.id;
                    summary.name = detail.name;
                }
                stats.updated += 1;
            }
            Err(err) if err.is_not_found() => {
                warn!(world = %record.favorite.favorite_id, "private world no longer exists");
                stats.not_found += 1;
            }
            Err(err) => return Err(err),
        }
    }
    on_progress(total, total);
    Ok(stats)
}

pub fn project(records: &[JoinedFavorite]) -> Vec<AggregatedRecord> {
    records.iter().map(project_one).collect()
}

fn project_one(record: &JoinedFavorite) -> AggregatedRecord {
    let world_id = record.favorite.favorite_id.clone();
    let summary = record.summary.as_ref();
    AggregatedRecord {
        fav_group: record
            .group
            .as_ref()
            .map(|g| g.display_name.clone())
            .unwrap_or_default(),
        name: summary.map(|s| s.name.clone()).unwrap_or_default(),
        author: summary.map(|s| s.author_name.clone()).unwrap_or_default(),
        description: summary.map(|s| s.description.clone()).unwrap_or_default(),
        link: world_link(&world_id),
        reference: world_reference(&world_id),
        status: WorldStatus::from(record.release_status()),
        created: summary.and_then(|s| s.created_at),
        published: summary.and_then(|s| s.publication_date),
        last_update: summary.and_then(|s| s.updated_at),
        world_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn favorite(id: &str, world: &str, group: &str) -> FavoriteRecord {
        FavoriteRecord {
            id: id.to_string(),
            favorite_id: world.to_string(),
            kind: "world".to_string(),
            tags: vec![group.to_string()],
        }
    }

    fn group(name: &str, display: &str) -> FavoriteGroupRecord {
        FavoriteGroupRecord {
            id: format!("fvgrp_{name}"),
            name: name.to_string(),
            display_name: display.to_string(),
            kind: "world".to_string(),
        }
    }

    fn summary(fav_id: &str, group: &str, name: &str, status: ReleaseStatus) -> FavoritedWorld {
        FavoritedWorld {
            id: format!("wrld_{name}"),
            favorite_id: Some(fav_id.to_string()),
            favorite_group: group.to_string(),
            name: name.to_string(),
            author_name: "someone".to_string(),
            description: String::new(),
            release_status: status,
            created_at: None,
            publication_date: None,
            updated_at: None,
        }
    }

    struct FakeLookup {
        responses: Mutex<HashMap<String, Result<WorldDetail, TrackerError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeLookup {
        fn new(responses: Vec<(&str, Result<WorldDetail, TrackerError>)>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl WorldLookup for FakeLookup {
        async fn lookup_world(&self, world_id: &str) -> Result<WorldDetail, TrackerError> {
            self.calls.lock().unwrap().push(world_id.to_string());
            self.responses
                .lock()
                .unwrap()
                .remove(world_id)
                .unwrap_or_else(|| Err(TrackerError::Other(format!("unexpected {world_id}"))))
        }
    }

    #[test]
    fn favorite_without_group_is_dropped() {
        let favorites = vec![favorite("fvrt_1", "wrld_a", "G1")];
        let summaries = vec![summary("fvrt_1", "G1", "a", ReleaseStatus::Public)];
        let joined = join(&favorites, &summaries, &[], UnmatchedPolicy::Drop);
        assert!(joined.is_empty());
    }

    #[test]
    fn summary_in_other_group_does_not_match() {
        let favorites = vec![favorite("fvrt_1", "wrld_a", "G1")];
        let summaries = vec![summary("fvrt_1", "G2", "a", ReleaseStatus::Public)];
        let groups = vec![group("G1", "One"), group("G2", "Two")];
        assert!(join(&favorites, &summaries, &groups, UnmatchedPolicy::Drop).is_empty());
    }

    #[test]
    fn join_keeps_favorites_order_and_reports_unmatched() {
        let favorites = vec![
            favorite("fvrt_c", "wrld_c", "Travel"),
            favorite("fvrt_a", "wrld_a", "Travel"),
            favorite("fvrt_b", "wrld_b", "Travel"),
        ];
        let summaries = vec![
            summary("fvrt_a", "Travel", "a", ReleaseStatus::Public),
            summary("fvrt_b", "Travel", "b", ReleaseStatus::Private),
        ];
        let groups = vec![group("Travel", "My Travels")];

        let dropped = join(&favorites, &summaries, &groups, UnmatchedPolicy::Drop);
        let ids: Vec<_> = dropped.iter().map(|j| j.favorite.id.as_str()).collect();
        assert_eq!(ids, vec!["fvrt_a", "fvrt_b"]);

        let reported = join(&favorites, &summaries, &groups, UnmatchedPolicy::Report);
        assert_eq!(reported.len(), 3);
        assert!(!reported[0].is_matched());
        let projected = project(&reported);
        assert_eq!(projected[0].world_id, "wrld_c");
        assert_eq!(projected[0].fav_group, "My Travels");
        assert_eq!(projected[0].status, WorldStatus::Deleted);
        assert_eq!(projected[0].name, "");
    }

    #[test]
    fn masked_favorite_id_never_matches() {
        let favorites = vec![favorite("fvrt_1", "wrld_a", "G1")];
        let mut masked = summary("fvrt_1", "G1", "a", ReleaseStatus::Private);
        masked.favorite_id = None;
        let groups = vec![group("G1", "One")];
        assert!(join(&favorites, &[masked], &groups, UnmatchedPolicy::Drop).is_empty());
    }

    #[test]
    fn private_only_filter() {
        let favorites = vec![
            favorite("fvrt_a", "wrld_a", "G"),
            favorite("fvrt_b", "wrld_b", "G"),
            favorite("fvrt_c", "wrld_c", "G"),
        ];
        let summaries = vec![
            summary("fvrt_a", "G", "a", ReleaseStatus::Public),
            summary("fvrt_b", "G", "b", ReleaseStatus::Private),
            summary("fvrt_c", "G", "c", ReleaseStatus::Hidden),
        ];
        let groups = vec![group("G", "Group")];
        let mut joined = join(&favorites, &summaries, &groups, UnmatchedPolicy::Drop);
        assert_eq!(joined.len(), 3);
        retain_private_only(&mut joined);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].favorite.id, "fvrt_b");
    }

    #[tokio::test]
    async fn enrich_overwrites_private_and_tolerates_not_found() {
        let favorites = vec![
            favorite("fvrt_a", "wrld_a", "G"),
            favorite("fvrt_b", "wrld_b", "G"),
            favorite("fvrt_c", "wrld_c", "G"),
        ];
        let mut masked_b = summary("fvrt_b", "G", "???", ReleaseStatus::Private);
        masked_b.author_name = "???".into();
        let mut masked_c = summary("fvrt_c", "G", "???", ReleaseStatus::Private);
        masked_c.author_name = "???".into();
        let summaries = vec![
            summary("fvrt_a", "G", "a", ReleaseStatus::Public),
            masked_b,
            masked_c.clone(),
        ];
        let groups = vec![group("G", "Group")];
        let mut joined = join(&favorites, &summaries, &groups, UnmatchedPolicy::Drop);

        let lookup = FakeLookup::new(vec![
            (
                "wrld_b",
                Ok(WorldDetail {
                    id: "wrld_b".into(),
                    name: "Hidden Garden".into(),
                    author_name: "Gardener".into(),
                }),
            ),
            (
                "wrld_c",
                Err(TrackerError::NotFound {
                    url: "/worlds/wrld_c".into(),
                }),
            ),
        ]);
        let stats = enrich(&mut joined, &lookup, |_, _| {}).await.expect("enrich");
        assert_eq!(stats, EnrichStats { updated: 1, not_found: 1 });
        assert_eq!(*lookup.calls.lock().unwrap(), vec!["wrld_b", "wrld_c"]);

        let b = joined[1].summary.as_ref().expect("summary");
        assert_eq!(b.name, "Hidden Garden");
        assert_eq!(b.author_name, "Gardener");
        assert_eq!(b.id, "wrld_b");
        assert_eq!(joined[2].summary.as_ref(), Some(&masked_c));
    }

    #[tokio::test]
    async fn enrich_aborts_on_other_errors() {
        let favorites = vec![favorite("fvrt_b", "wrld_b", "G")];
        let summaries = vec![summary("fvrt_b", "G", "???", ReleaseStatus::Private)];
        let groups = vec![group("G", "Group")];
        let mut joined = join(&favorites, &summaries, &groups, UnmatchedPolicy::Drop);
        let lookup = FakeLookup::new(vec![(
            "wrld_b",
            Err(TrackerError::Http {
                status: 500,
                url: "/worlds/wrld_b".into(),
            }),
        )]);
        let err = enrich(&mut joined, &lookup, |_, _| {}).await.unwrap_err();
        assert!(matches!(err, TrackerError::Http { status: 500, .. }));
    }

    #[test]
    fn projection_builds_links_and_status() {
        let favorites = vec![favorite("fvrt_a", "wrld_a", "G")];
        let summaries = vec![summary("fvrt_a", "G", "a", ReleaseStatus::Public)];
        let groups = vec![group("G", "Group")];
        let joined = join(&favorites, &summaries, &groups, UnmatchedPolicy::Drop);
        let out = project(&joined);
        assert_eq!(out[0].link, "https://vrchat.com/home/world/wrld_a");
        assert_eq!(out[0].reference, "https://www.vrcw.net/world/detail/wrld_a");
        assert_eq!(out[0].status, WorldStatus::Public);
        assert_eq!(out[0].fav_group, "Group");
    }
}
