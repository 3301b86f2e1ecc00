//! Survivor selection and group-by-group merge execution.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use lineup_catalog::model::{ArtistPatch, CatalogArtist, MergeStrategy};
use lineup_catalog::{CatalogError, CatalogStore};

use crate::groups::DuplicateGroup;

/// One group's merge failure. The batch keeps going.
#[derive(Debug, Clone, Serialize)]
pub struct GroupError {
    pub group: String,
    pub message: String,
}

/// Emitted after each group.
#[derive(Debug, Clone, Serialize)]
pub struct MergeProgress {
    pub completed: usize,
    pub total: usize,
    pub current: String,
    pub errors: Vec<GroupError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeOutcome {
    pub completed: usize,
    pub total: usize,
    /// Duplicate rows removed across all groups.
    pub deleted: usize,
    pub errors: Vec<GroupError>,
}

/// How filled-in an artist's profile is: one point each for description,
/// Spotify link, SoundCloud link and having any genre.
fn completeness(artist: &CatalogArtist) -> usize {
    artist.description.is_some() as usize
        + artist.spotify_url.is_some() as usize
        + artist.soundcloud_url.is_some() as usize
        + (!artist.genre_ids.is_empty()) as usize
}

/// Pick the artist the group collapses into. `vote_counts` is only
/// consulted by the smart strategy to break completeness ties; a missing
/// entry counts as zero. Ties resolve to the earliest group member.
pub fn select_survivor<'a>(
    artists: &'a [CatalogArtist],
    strategy: MergeStrategy,
    vote_counts: &HashMap<String, i64>,
) -> &'a CatalogArtist {
    match strategy {
        MergeStrategy::First => &artists[0],
        MergeStrategy::Newest => artists
            .iter()
            .reduce(|best, a| if a.created_at > best.created_at { a } else { best })
            .expect("group is never empty"),
        MergeStrategy::Oldest => artists
            .iter()
            .reduce(|best, a| if a.created_at < best.created_at { a } else { best })
            .expect("group is never empty"),
        MergeStrategy::Smart => artists
            .iter()
            .reduce(|best, a| {
                let score = |x: &CatalogArtist| {
                    (
                        completeness(x),
                        vote_counts.get(&x.id).copied().unwrap_or(0),
                    )
                };
                if score(a) > score(best) {
                    a
                } else {
                    best
                }
            })
            .expect("group is never empty"),
    }
}

/// First non-empty value per field among the duplicates, in group order.
/// The store only applies it to fields the survivor has empty.
fn backfill_patch(duplicates: &[&CatalogArtist]) -> ArtistPatch {
    ArtistPatch {
        description: duplicates.iter().find_map(|d| d.description.clone()),
        spotify_url: duplicates.iter().find_map(|d| d.spotify_url.clone()),
        soundcloud_url: duplicates.iter().find_map(|d| d.soundcloud_url.clone()),
    }
}

async fn merge_one_group(
    store: &dyn CatalogStore,
    group: &DuplicateGroup,
    strategy: MergeStrategy,
) -> Result<usize, CatalogError> {
    if group.artists.len() < 2 {
        return Ok(0);
    }

    let mut vote_counts = HashMap::new();
    if strategy == MergeStrategy::Smart {
        for artist in &group.artists {
            vote_counts.insert(artist.id.clone(), store.vote_count(&artist.id).await?);
        }
    }

    let survivor = select_survivor(&group.artists, strategy, &vote_counts);
    let duplicates: Vec<&CatalogArtist> = group
        .artists
        .iter()
        .filter(|a| a.id != survivor.id)
        .collect();

    for duplicate in &duplicates {
        store.transfer_votes(&duplicate.id, &survivor.id).await?;
        store.transfer_notes(&duplicate.id, &survivor.id).await?;
        store.transfer_set_links(&duplicate.id, &survivor.id).await?;
        store.transfer_genres(&duplicate.id, &survivor.id).await?;
    }

    store
        .backfill_artist(&survivor.id, &backfill_patch(&duplicates))
        .await?;

    let mut deleted = 0;
    for duplicate in &duplicates {
        store.delete_artist(&duplicate.id).await?;
        deleted += 1;
    }

    Ok(deleted)
}

/// Merge the given groups sequentially with one strategy, reporting after
/// each group. A failing group goes into the error list and the run moves
/// on; it never aborts the batch.
pub async fn merge_duplicate_groups(
    store: &dyn CatalogStore,
    groups: &[DuplicateGroup],
    strategy: MergeStrategy,
    mut on_progress: impl FnMut(&MergeProgress),
) -> MergeOutcome {
    let mut outcome = MergeOutcome {
        total: groups.len(),
        ..Default::default()
    };

    for group in groups {
        match merge_one_group(store, group, strategy).await {
            Ok(deleted) => {
                outcome.deleted += deleted;
            }
            Err(e) => {
                warn!(group = %group.name, error = %e, "merge failed, continuing with next group");
                outcome.errors.push(GroupError {
                    group: group.name.clone(),
                    message: e.to_string(),
                });
            }
        }
        outcome.completed += 1;

        on_progress(&MergeProgress {
            completed: outcome.completed,
            total: outcome.total,
            current: group.name.clone(),
            errors: outcome.errors.clone(),
        });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};

    use lineup_catalog::model::{NewArtist, NewSet};
    use lineup_catalog::MemoryCatalog;

    use crate::groups::find_duplicate_groups;

    use super::*;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn named(name: &str) -> NewArtist {
        NewArtist {
            name: name.into(),
            ..Default::default()
        }
    }

    fn no_progress(_: &MergeProgress) {}

    #[tokio::test]
    async fn oldest_strategy_keeps_the_earliest_artist() {
        let store = MemoryCatalog::new();
        let old = store.seed_artist_created(named("Shpongle"), day(1));
        let newer = store.seed_artist_created(named("Shpongle"), day(5));
        store.seed_vote("u1", &old);
        store.seed_vote("u1", &newer);
        store.seed_vote("u2", &newer);

        let groups = find_duplicate_groups(&store.read_artists().await.unwrap());
        let outcome =
            merge_duplicate_groups(&store, &groups, MergeStrategy::Oldest, no_progress).await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.deleted, 1);
        assert!(store.has_artist(&old));
        assert!(!store.has_artist(&newer));
        // u1 voted for both and keeps exactly one vote on the survivor
        assert_eq!(store.voters_for(&old), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn newest_strategy_keeps_the_latest_artist() {
        let store = MemoryCatalog::new();
        let old = store.seed_artist_created(named("Ott"), day(1));
        let newer = store.seed_artist_created(named("Ott"), day(9));

        let groups = find_duplicate_groups(&store.read_artists().await.unwrap());
        merge_duplicate_groups(&store, &groups, MergeStrategy::Newest, no_progress).await;

        assert!(store.has_artist(&newer));
        assert!(!store.has_artist(&old));
    }

    #[tokio::test]
    async fn smart_strategy_prefers_the_most_complete_profile() {
        let store = MemoryCatalog::new();
        let bare = store.seed_artist_created(named("Juno Reactor"), day(1));
        let rich = store.seed_artist_created(
            NewArtist {
                name: "Juno Reactor".into(),
                description: Some("goa trance pioneers".into()),
                spotify_url: Some("https://open.spotify.com/artist/juno".into()),
                ..Default::default()
            },
            day(3),
        );

        let groups = find_duplicate_groups(&store.read_artists().await.unwrap());
        merge_duplicate_groups(&store, &groups, MergeStrategy::Smart, no_progress).await;

        assert!(store.has_artist(&rich));
        assert!(!store.has_artist(&bare));
    }

    #[tokio::test]
    async fn smart_ties_break_on_vote_activity() {
        let store = MemoryCatalog::new();
        let quiet = store.seed_artist_created(named("Entheogenic"), day(1));
        let popular = store.seed_artist_created(named("Entheogenic"), day(2));
        store.seed_vote("u1", &popular);
        store.seed_vote("u2", &popular);

        let groups = find_duplicate_groups(&store.read_artists().await.unwrap());
        merge_duplicate_groups(&store, &groups, MergeStrategy::Smart, no_progress).await;

        assert!(store.has_artist(&popular));
        assert!(!store.has_artist(&quiet));
    }

    #[tokio::test]
    async fn survivor_gains_missing_fields_notes_links_and_genres() {
        let store = MemoryCatalog::new();
        let genre = store.seed_genre("psybient");
        let survivor = store.seed_artist_created(named("Shpongle"), day(1));
        let duplicate = store.seed_artist_created(
            NewArtist {
                name: "Shpongle".into(),
                description: Some("Simon Posford & Raja Ram".into()),
                soundcloud_url: Some("https://soundcloud.com/shpongle".into()),
                genre_ids: vec![genre.clone()],
                ..Default::default()
            },
            day(2),
        );
        store.seed_note("u1", &duplicate, "saw them at Ozora");
        let set_id = store
            .create_set(&NewSet {
                name: "Shpongle".into(),
                edition_id: "ed1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store.link_set_artist(&set_id, &duplicate).await.unwrap();

        let groups = find_duplicate_groups(&store.read_artists().await.unwrap());
        let outcome =
            merge_duplicate_groups(&store, &groups, MergeStrategy::First, no_progress).await;

        assert!(outcome.errors.is_empty());
        assert!(store.has_artist(&survivor));
        assert!(!store.has_artist(&duplicate));

        let merged = store.artist_snapshot(&survivor).unwrap();
        assert_eq!(merged.description.as_deref(), Some("Simon Posford & Raja Ram"));
        assert_eq!(
            merged.soundcloud_url.as_deref(),
            Some("https://soundcloud.com/shpongle")
        );
        assert_eq!(store.genre_ids_of(&survivor), vec![genre]);
        assert_eq!(store.notes_for(&survivor), vec!["saw them at Ozora"]);
        assert_eq!(store.set_artists_of(&set_id), vec![survivor.clone()]);
    }

    /// Store wrapper whose vote transfer fails for one artist id; everything
    /// else passes through.
    struct FlakyStore<'a> {
        inner: &'a MemoryCatalog,
        fail_votes_from: String,
    }

    #[async_trait]
    impl CatalogStore for FlakyStore<'_> {
        async fn read_artists(&self) -> Result<Vec<CatalogArtist>, CatalogError> {
            self.inner.read_artists().await
        }
        async fn find_artist_by_name(
            &self,
            name: &str,
        ) -> Result<Option<CatalogArtist>, CatalogError> {
            self.inner.find_artist_by_name(name).await
        }
        async fn create_artist(&self, artist: &NewArtist) -> Result<String, CatalogError> {
            self.inner.create_artist(artist).await
        }
        async fn backfill_artist(
            &self,
            artist_id: &str,
            patch: &ArtistPatch,
        ) -> Result<(), CatalogError> {
            self.inner.backfill_artist(artist_id, patch).await
        }
        async fn upsert_stage(&self, name: &str, edition_id: &str) -> Result<String, CatalogError> {
            self.inner.upsert_stage(name, edition_id).await
        }
        async fn find_stage(
            &self,
            name: &str,
            edition_id: &str,
        ) -> Result<Option<String>, CatalogError> {
            self.inner.find_stage(name, edition_id).await
        }
        async fn find_set(
            &self,
            name: &str,
            edition_id: &str,
            stage_id: Option<&str>,
        ) -> Result<Option<String>, CatalogError> {
            self.inner.find_set(name, edition_id, stage_id).await
        }
        async fn create_set(&self, set: &NewSet) -> Result<String, CatalogError> {
            self.inner.create_set(set).await
        }
        async fn update_set(
            &self,
            set_id: &str,
            time_start: Option<NaiveDateTime>,
            time_end: Option<NaiveDateTime>,
            description: Option<&str>,
        ) -> Result<(), CatalogError> {
            self.inner
                .update_set(set_id, time_start, time_end, description)
                .await
        }
        async fn link_set_artist(&self, set_id: &str, artist_id: &str) -> Result<(), CatalogError> {
            self.inner.link_set_artist(set_id, artist_id).await
        }
        async fn ensure_genre(&self, name: &str) -> Result<String, CatalogError> {
            self.inner.ensure_genre(name).await
        }
        async fn link_artist_genre(
            &self,
            artist_id: &str,
            genre_id: &str,
        ) -> Result<(), CatalogError> {
            self.inner.link_artist_genre(artist_id, genre_id).await
        }
        async fn vote_count(&self, artist_id: &str) -> Result<i64, CatalogError> {
            self.inner.vote_count(artist_id).await
        }
        async fn transfer_votes(
            &self,
            from_artist: &str,
            to_artist: &str,
        ) -> Result<(), CatalogError> {
            if from_artist == self.fail_votes_from {
                return Err(CatalogError::Database(sqlx::Error::PoolClosed));
            }
            self.inner.transfer_votes(from_artist, to_artist).await
        }
        async fn transfer_notes(
            &self,
            from_artist: &str,
            to_artist: &str,
        ) -> Result<(), CatalogError> {
            self.inner.transfer_notes(from_artist, to_artist).await
        }
        async fn transfer_set_links(
            &self,
            from_artist: &str,
            to_artist: &str,
        ) -> Result<(), CatalogError> {
            self.inner.transfer_set_links(from_artist, to_artist).await
        }
        async fn transfer_genres(
            &self,
            from_artist: &str,
            to_artist: &str,
        ) -> Result<(), CatalogError> {
            self.inner.transfer_genres(from_artist, to_artist).await
        }
        async fn delete_artist(&self, artist_id: &str) -> Result<(), CatalogError> {
            self.inner.delete_artist(artist_id).await
        }
    }

    #[tokio::test]
    async fn a_failing_group_is_recorded_and_the_batch_continues() {
        let memory = MemoryCatalog::new();
        let bad_dup = memory.seed_artist_created(named("Shpongle"), day(2));
        memory.seed_artist_created(named("Shpongle"), day(1));
        let ott_old = memory.seed_artist_created(named("Ott"), day(1));
        let ott_new = memory.seed_artist_created(named("Ott"), day(3));

        let store = FlakyStore {
            inner: &memory,
            fail_votes_from: bad_dup.clone(),
        };

        let groups = find_duplicate_groups(&memory.read_artists().await.unwrap());
        assert_eq!(groups.len(), 2);

        let mut progressed = Vec::new();
        let outcome = merge_duplicate_groups(&store, &groups, MergeStrategy::Oldest, |p| {
            progressed.push((p.completed, p.errors.len()));
        })
        .await;

        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].group, "Shpongle");
        // the Ott group still merged
        assert!(memory.has_artist(&ott_old));
        assert!(!memory.has_artist(&ott_new));
        // both Shpongle rows survive the failed merge
        assert!(memory.has_artist(&bad_dup));
        assert_eq!(progressed.len(), 2);
    }
}
