//! Duplicate detection between import candidates and the existing catalog.

use lineup_catalog::model::CatalogArtist;
use lineup_catalog::similarity::names_match;

use crate::candidates::ImportCandidate;

/// A candidate with at least one plausible catalog match. The matches keep
/// catalog iteration order; they are not ranked.
#[derive(Debug, Clone)]
pub struct ImportConflict {
    pub candidate: ImportCandidate,
    pub matches: Vec<CatalogArtist>,
}

/// Result of a detection scan: `conflicts` and `clean` partition the input
/// candidates.
#[derive(Debug, Clone, Default)]
pub struct ConflictScan {
    pub conflicts: Vec<ImportConflict>,
    pub clean: Vec<ImportCandidate>,
}

fn urls_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

fn is_match(candidate: &ImportCandidate, artist: &CatalogArtist) -> bool {
    names_match(&candidate.name, &artist.name)
        || urls_equal(candidate.spotify_url.as_deref(), artist.spotify_url.as_deref())
        || urls_equal(
            candidate.soundcloud_url.as_deref(),
            artist.soundcloud_url.as_deref(),
        )
}

/// Compare every candidate against the whole catalog.
///
/// Pure and read-only. The scan is quadratic in candidates × catalog with a
/// Levenshtein inner loop; it is an operator-triggered batch step, not a hot
/// path, and large catalogs will feel it.
pub fn detect_conflicts(
    candidates: &[ImportCandidate],
    catalog: &[CatalogArtist],
) -> ConflictScan {
    let mut scan = ConflictScan::default();

    for candidate in candidates {
        let matches: Vec<CatalogArtist> = catalog
            .iter()
            .filter(|artist| is_match(candidate, artist))
            .cloned()
            .collect();

        if matches.is_empty() {
            scan.clean.push(candidate.clone());
        } else {
            scan.conflicts.push(ImportConflict {
                candidate: candidate.clone(),
                matches,
            });
        }
    }

    scan
}
