//! Turns resolutions and clean candidates into catalog artist ids.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use lineup_catalog::model::NewArtist;
use lineup_catalog::{CatalogError, CatalogStore};

use crate::candidates::ImportCandidate;
use crate::resolution::{ConflictResolution, ResolutionEngine};

/// Outcome of artist resolution: candidate name → catalog artist id, plus
/// the names the operator chose to leave out.
#[derive(Debug, Default)]
pub struct ResolvedArtists {
    pub ids: HashMap<String, String>,
    pub skipped: HashSet<String>,
}

impl ResolvedArtists {
    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.ids.get(name).map(String::as_str)
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.contains(name)
    }
}

async fn create_from_candidate(
    store: &dyn CatalogStore,
    candidate: &ImportCandidate,
    rename: Option<&str>,
) -> Result<String, CatalogError> {
    let mut genre_ids = Vec::with_capacity(candidate.genres.len());
    for genre in &candidate.genres {
        genre_ids.push(store.ensure_genre(genre).await?);
    }
    store
        .create_artist(&NewArtist {
            name: rename.unwrap_or(&candidate.name).to_string(),
            description: candidate.description.clone(),
            spotify_url: candidate.spotify_url.clone(),
            soundcloud_url: candidate.soundcloud_url.clone(),
            genre_ids,
        })
        .await
}

/// Apply the final resolutions: merge targets are reused verbatim (field
/// reconciliation is the bulk merge's job, not this step's), import-new
/// creates a fresh artist under the candidate's or renamed name, skip
/// produces no id. Every clean candidate becomes a new artist.
pub async fn resolve_artists(
    store: &dyn CatalogStore,
    engine: &ResolutionEngine,
    clean: &[ImportCandidate],
) -> Result<ResolvedArtists, CatalogError> {
    let mut resolved = ResolvedArtists::default();

    for (index, conflict, resolution) in engine.iter() {
        let name = conflict.candidate.name.clone();
        match resolution {
            Some(ConflictResolution::Skip) => {
                resolved.skipped.insert(name);
            }
            Some(ConflictResolution::ImportNew { rename }) => {
                let id =
                    create_from_candidate(store, &conflict.candidate, rename.as_deref()).await?;
                resolved.ids.insert(name, id);
            }
            Some(ConflictResolution::Merge {
                target_artist_id, ..
            }) => {
                resolved.ids.insert(name, target_artist_id.clone());
            }
            // commit is gated on zero unresolved conflicts; if one slips
            // through anyway, leave it out rather than guessing
            None => {
                warn!(conflict = index, artist = %name, "conflict left unresolved, candidate not imported");
            }
        }
    }

    for candidate in clean {
        let id = create_from_candidate(store, candidate, None).await?;
        resolved.ids.insert(candidate.name.clone(), id);
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use lineup_catalog::MemoryCatalog;

    use crate::conflict::detect_conflicts;
    use crate::resolution::ResolutionEngine;

    use super::*;

    #[tokio::test]
    async fn merge_reuses_existing_id_without_touching_the_row() {
        let store = MemoryCatalog::new();
        let existing = store.seed_artist(NewArtist {
            name: "Shpongle".into(),
            description: Some("psy dub".into()),
            ..Default::default()
        });

        let catalog = store.read_artists().await.unwrap();
        let scan = detect_conflicts(&[ImportCandidate::from_name("Shpongle")], &catalog);
        let engine = ResolutionEngine::new(scan.conflicts);
        assert!(engine.is_fully_resolved(), "single match defaults to merge");

        let resolved = resolve_artists(&store, &engine, &scan.clean).await.unwrap();

        assert_eq!(resolved.id_for("Shpongle"), Some(existing.as_str()));
        assert_eq!(store.artist_count(), 1);
        let row = store.artist_snapshot(&existing).unwrap();
        assert_eq!(row.description.as_deref(), Some("psy dub"));
    }

    #[tokio::test]
    async fn import_new_creates_artist_with_optional_rename() {
        let store = MemoryCatalog::new();
        store.seed_artist(NewArtist {
            name: "Shpongle".into(),
            ..Default::default()
        });

        let catalog = store.read_artists().await.unwrap();
        let scan = detect_conflicts(&[ImportCandidate::from_name("Shpongles")], &catalog);
        let mut engine = ResolutionEngine::new(scan.conflicts);
        engine
            .update_resolution(
                0,
                ConflictResolution::ImportNew {
                    rename: Some("Shpongle (tribute)".into()),
                },
            )
            .unwrap();

        let resolved = resolve_artists(&store, &engine, &scan.clean).await.unwrap();

        let new_id = resolved.id_for("Shpongles").unwrap().to_string();
        let row = store.artist_snapshot(&new_id).unwrap();
        assert_eq!(row.name, "Shpongle (tribute)");
        assert_eq!(store.artist_count(), 2);
    }

    #[tokio::test]
    async fn skip_produces_no_id_and_clean_candidates_are_created() {
        let store = MemoryCatalog::new();
        store.seed_artist(NewArtist {
            name: "Shpongle".into(),
            ..Default::default()
        });

        let catalog = store.read_artists().await.unwrap();
        let candidates = [
            ImportCandidate::from_name("Shpongle"),
            ImportCandidate::from_name("Ott"),
        ];
        let scan = detect_conflicts(&candidates, &catalog);
        let mut engine = ResolutionEngine::new(scan.conflicts);
        engine.update_resolution(0, ConflictResolution::Skip).unwrap();

        let resolved = resolve_artists(&store, &engine, &scan.clean).await.unwrap();

        assert!(resolved.is_skipped("Shpongle"));
        assert_eq!(resolved.id_for("Shpongle"), None);
        assert!(resolved.id_for("Ott").is_some());
        assert_eq!(store.artist_count(), 2);
    }
}
