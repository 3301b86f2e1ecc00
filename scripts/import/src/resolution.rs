//! The in-session decision store for detected conflicts.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use lineup_catalog::model::MergeStrategy;

use crate::conflict::ImportConflict;

/// The operator's decision for one conflicted candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Leave the candidate out of the import.
    Skip,
    /// Create a new artist anyway, optionally under a different name.
    ImportNew { rename: Option<String> },
    /// Reuse an existing catalog artist.
    Merge {
        target_artist_id: String,
        strategy: Option<MergeStrategy>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ResolutionError {
    #[error("no conflict at index {0}")]
    UnknownConflict(usize),
    #[error("merge target '{target}' is not a match of conflict {index}")]
    ForeignMergeTarget { index: usize, target: String },
}

/// Ordered map from conflict index to resolution, owned by the import
/// session. Conflicts with exactly one match are resolved to a merge with
/// that match up front; the default stands unless the operator changes it.
/// Commit stays blocked while any conflict has no entry.
pub struct ResolutionEngine {
    conflicts: Vec<ImportConflict>,
    resolutions: BTreeMap<usize, ConflictResolution>,
}

impl ResolutionEngine {
    pub fn new(conflicts: Vec<ImportConflict>) -> Self {
        let mut resolutions = BTreeMap::new();
        for (index, conflict) in conflicts.iter().enumerate() {
            if conflict.matches.len() == 1 {
                resolutions.insert(
                    index,
                    ConflictResolution::Merge {
                        target_artist_id: conflict.matches[0].id.clone(),
                        strategy: None,
                    },
                );
            }
        }
        Self {
            conflicts,
            resolutions,
        }
    }

    pub fn conflicts(&self) -> &[ImportConflict] {
        &self.conflicts
    }

    pub fn total(&self) -> usize {
        self.conflicts.len()
    }

    pub fn resolution(&self, index: usize) -> Option<&ConflictResolution> {
        self.resolutions.get(&index)
    }

    /// Conflicts in order with their current resolution, if any.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ImportConflict, Option<&ConflictResolution>)> {
        self.conflicts
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c, self.resolutions.get(&i)))
    }

    /// Overwrite the resolution of a single conflict. A merge target must be
    /// one of that conflict's own matches.
    pub fn update_resolution(
        &mut self,
        index: usize,
        resolution: ConflictResolution,
    ) -> Result<(), ResolutionError> {
        let conflict = self
            .conflicts
            .get(index)
            .ok_or(ResolutionError::UnknownConflict(index))?;

        if let ConflictResolution::Merge {
            target_artist_id, ..
        } = &resolution
        {
            if !conflict.matches.iter().any(|m| &m.id == target_artist_id) {
                return Err(ResolutionError::ForeignMergeTarget {
                    index,
                    target: target_artist_id.clone(),
                });
            }
        }

        self.resolutions.insert(index, resolution);
        Ok(())
    }

    /// Set the given resolution on every conflict that has none yet.
    /// Explicit prior choices (and the single-match defaults) are never
    /// overwritten. Returns how many conflicts were resolved by this call.
    ///
    /// Intended for `Skip` and `ImportNew`; a `Merge` value is only applied
    /// where its target happens to be a match of that conflict.
    pub fn apply_bulk(&mut self, resolution: ConflictResolution) -> usize {
        let mut applied = 0;
        for (index, conflict) in self.conflicts.iter().enumerate() {
            if self.resolutions.contains_key(&index) {
                continue;
            }
            if let ConflictResolution::Merge {
                target_artist_id, ..
            } = &resolution
            {
                if !conflict.matches.iter().any(|m| &m.id == target_artist_id) {
                    continue;
                }
            }
            self.resolutions.insert(index, resolution.clone());
            applied += 1;
        }
        applied
    }

    /// Resolve every still-open conflict to a merge with its first match,
    /// tagging the strategy that drove the decision. Conflicts always carry
    /// at least one match, but the guard stays for safety.
    pub fn apply_bulk_merge_first_match(&mut self, strategy: MergeStrategy) -> usize {
        let mut applied = 0;
        for (index, conflict) in self.conflicts.iter().enumerate() {
            if self.resolutions.contains_key(&index) {
                continue;
            }
            let Some(first) = conflict.matches.first() else {
                continue;
            };
            self.resolutions.insert(
                index,
                ConflictResolution::Merge {
                    target_artist_id: first.id.clone(),
                    strategy: Some(strategy),
                },
            );
            applied += 1;
        }
        applied
    }

    pub fn resolved_count(&self) -> usize {
        self.resolutions.len()
    }

    pub fn unresolved_count(&self) -> usize {
        self.conflicts.len() - self.resolutions.len()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use lineup_catalog::model::CatalogArtist;

    use crate::candidates::ImportCandidate;

    use super::*;

    fn artist(id: &str, name: &str) -> CatalogArtist {
        CatalogArtist {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            spotify_url: None,
            soundcloud_url: None,
            created_at: Utc::now().naive_utc(),
            genre_ids: Vec::new(),
        }
    }

    fn conflict(name: &str, matches: Vec<CatalogArtist>) -> ImportConflict {
        ImportConflict {
            candidate: ImportCandidate::from_name(name),
            matches,
        }
    }

    #[test]
    fn single_match_conflicts_default_to_merge() {
        let engine = ResolutionEngine::new(vec![
            conflict("Shpongle", vec![artist("a1", "Shpongle")]),
            conflict(
                "Ott",
                vec![artist("a2", "Ott"), artist("a3", "Otto")],
            ),
        ]);

        assert_eq!(
            engine.resolution(0),
            Some(&ConflictResolution::Merge {
                target_artist_id: "a1".into(),
                strategy: None,
            })
        );
        assert_eq!(engine.resolution(1), None);
        assert_eq!(engine.unresolved_count(), 1);
    }

    #[test]
    fn update_rejects_foreign_merge_target() {
        let mut engine =
            ResolutionEngine::new(vec![conflict("Shpongle", vec![artist("a1", "Shpongle")])]);

        let err = engine
            .update_resolution(
                0,
                ConflictResolution::Merge {
                    target_artist_id: "somebody-else".into(),
                    strategy: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ResolutionError::ForeignMergeTarget { .. }));

        assert_eq!(
            engine.update_resolution(7, ConflictResolution::Skip),
            Err(ResolutionError::UnknownConflict(7))
        );
    }

    #[test]
    fn bulk_apply_never_overwrites_prior_choices() {
        let mut engine = ResolutionEngine::new(vec![
            conflict("Shpongle", vec![artist("a1", "Shpongle")]),
            conflict("Ott", vec![artist("a2", "Ott"), artist("a3", "Otto")]),
            conflict("Juno", vec![artist("a4", "Juno"), artist("a5", "Juno Reactor")]),
        ]);
        engine
            .update_resolution(1, ConflictResolution::ImportNew { rename: None })
            .unwrap();

        let applied = engine.apply_bulk(ConflictResolution::Skip);

        // only the Juno conflict was still open
        assert_eq!(applied, 1);
        assert!(matches!(
            engine.resolution(0),
            Some(ConflictResolution::Merge { .. })
        ));
        assert_eq!(
            engine.resolution(1),
            Some(&ConflictResolution::ImportNew { rename: None })
        );
        assert_eq!(engine.resolution(2), Some(&ConflictResolution::Skip));
        assert!(engine.is_fully_resolved());
    }

    #[test]
    fn bulk_merge_picks_first_match_and_tags_strategy() {
        let mut engine = ResolutionEngine::new(vec![conflict(
            "Ott",
            vec![artist("a2", "Ott"), artist("a3", "Otto")],
        )]);

        let applied = engine.apply_bulk_merge_first_match(MergeStrategy::Smart);

        assert_eq!(applied, 1);
        assert_eq!(
            engine.resolution(0),
            Some(&ConflictResolution::Merge {
                target_artist_id: "a2".into(),
                strategy: Some(MergeStrategy::Smart),
            })
        );
    }

    #[test]
    fn resolving_everything_zeroes_unresolved_count() {
        let mut engine = ResolutionEngine::new(vec![
            conflict("Ott", vec![artist("a2", "Ott"), artist("a3", "Otto")]),
            conflict("Juno", vec![artist("a4", "Juno"), artist("a5", "Juno Reactor")]),
        ]);
        assert_eq!(engine.unresolved_count(), 2);

        engine.update_resolution(0, ConflictResolution::Skip).unwrap();
        engine.apply_bulk(ConflictResolution::ImportNew { rename: None });

        assert_eq!(engine.unresolved_count(), 0);
        assert!(engine.is_fully_resolved());
    }
}
