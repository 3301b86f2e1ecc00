//! Artist candidate extraction from parsed set rows.

use std::collections::HashSet;

use serde::Serialize;

use crate::csv::SetRow;

/// An artist name pulled from import rows, not yet linked to the catalog.
/// CSV rows only carry names; the metadata fields exist for callers that
/// assemble candidates from richer sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportCandidate {
    pub name: String,
    pub description: Option<String>,
    pub spotify_url: Option<String>,
    pub soundcloud_url: Option<String>,
    pub genres: Vec<String>,
}

impl ImportCandidate {
    pub fn from_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            spotify_url: None,
            soundcloud_url: None,
            genres: Vec::new(),
        }
    }
}

/// Split each row's `artist_names` on commas and collect the unique trimmed
/// names in first-seen order. Repeats across rows collapse to one candidate.
pub fn extract_artist_candidates(rows: &[SetRow]) -> Vec<ImportCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for row in rows {
        for name in row.artist_names.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if seen.insert(name.to_string()) {
                candidates.push(ImportCandidate::from_name(name));
            }
        }
    }

    candidates
}
