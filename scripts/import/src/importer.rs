//! Row-by-row commit of stages, sets and artist links.
//!
//! Rows are imported strictly in order, one backend round trip at a time,
//! because colliding natural keys (same stage or set name) must not
//! interleave. Row-level problems go into the report; a database error
//! aborts the remaining rows.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use lineup_catalog::model::NewSet;
use lineup_catalog::time::local_time_to_utc;
use lineup_catalog::{CatalogError, CatalogStore};

use crate::candidates::{extract_artist_candidates, ImportCandidate};
use crate::csv::{SetRow, StageRow};
use crate::resolution::ResolutionEngine;
use crate::resolver::{resolve_artists, ResolvedArtists};

/// A problem confined to one row (or one artist within a row).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// 1-based row number as the operator sees it in the file.
    pub row: usize,
    pub message: String,
}

/// Emitted after every row, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct RowProgress {
    pub completed: usize,
    pub total: usize,
    pub current: String,
    pub ok: bool,
}

/// End-of-run summary. `success` is false only when nothing at all was
/// imported from a non-empty batch.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub message: String,
    pub inserted: usize,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    fn finish(what: &str, attempted: usize, inserted: usize, errors: Vec<RowError>) -> Self {
        let message = if errors.is_empty() {
            format!("Imported {} of {} {}", inserted, attempted, what)
        } else {
            format!(
                "Imported {} of {} {} ({} error(s))",
                inserted,
                attempted,
                what,
                errors.len()
            )
        };
        ImportReport {
            success: inserted > 0 || attempted == 0,
            message,
            inserted,
            errors,
        }
    }

    pub fn merged(self, other: ImportReport) -> ImportReport {
        let mut errors = self.errors;
        errors.extend(other.errors);
        ImportReport {
            success: self.success && other.success,
            message: format!("{}; {}", self.message, other.message),
            inserted: self.inserted + other.inserted,
            errors,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{unresolved} conflict(s) still unresolved")]
    ResolutionRequired { unresolved: usize },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Display name for a set without an explicit one: the artist for a solo
/// set, "A & B" for a duo, "A & n others" beyond that.
pub fn derive_set_name(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => (*only).to_string(),
        [a, b] => format!("{} & {}", a, b),
        [first, rest @ ..] => format!("{} & {} others", first, rest.len()),
    }
}

/// Upsert every stage row by `(name, edition)`. Re-running the same file
/// converges on the same rows.
pub async fn import_stages(
    store: &dyn CatalogStore,
    rows: &[StageRow],
    edition_id: &str,
    mut on_progress: impl FnMut(&RowProgress),
) -> Result<ImportReport, CatalogError> {
    let total = rows.len();
    let mut inserted = 0;
    let mut errors = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let row_no = index + 1;
        let mut ok = false;

        if row.name.is_empty() {
            errors.push(RowError {
                row: row_no,
                message: "stage row has no name".to_string(),
            });
        } else {
            store.upsert_stage(&row.name, edition_id).await?;
            inserted += 1;
            ok = true;
        }

        on_progress(&RowProgress {
            completed: row_no,
            total,
            current: row.name.clone(),
            ok,
        });
    }

    Ok(ImportReport::finish("stage(s)", total, inserted, errors))
}

/// Import set rows without a conflict pass: every extracted candidate is
/// created as a new artist. Meant for the zero-conflict path; run detection
/// first when the catalog may already know these names.
pub async fn import_sets(
    store: &dyn CatalogStore,
    rows: &[SetRow],
    edition_id: &str,
    timezone: &str,
    on_progress: impl FnMut(&RowProgress),
) -> Result<ImportReport, CatalogError> {
    let candidates = extract_artist_candidates(rows);
    let engine = ResolutionEngine::new(Vec::new());
    let resolved = resolve_artists(store, &engine, &candidates).await?;
    import_set_rows(store, rows, edition_id, timezone, &resolved, on_progress).await
}

/// Import set rows after conflict resolution. Refuses to start while any
/// conflict is unresolved; once started, committed rows stay committed.
pub async fn import_sets_with_resolutions(
    store: &dyn CatalogStore,
    rows: &[SetRow],
    edition_id: &str,
    engine: &ResolutionEngine,
    clean: &[ImportCandidate],
    timezone: &str,
    on_progress: impl FnMut(&RowProgress),
) -> Result<ImportReport, ImportError> {
    if !engine.is_fully_resolved() {
        return Err(ImportError::ResolutionRequired {
            unresolved: engine.unresolved_count(),
        });
    }

    let resolved = resolve_artists(store, engine, clean).await?;
    Ok(import_set_rows(store, rows, edition_id, timezone, &resolved, on_progress).await?)
}

/// What became of one set row: the committed set's name, or nothing plus
/// the reasons.
struct RowOutcome {
    set_name: Option<String>,
    errors: Vec<String>,
}

impl RowOutcome {
    fn failed(message: String, mut errors: Vec<String>) -> Self {
        errors.push(message);
        RowOutcome {
            set_name: None,
            errors,
        }
    }
}

async fn import_one_set_row(
    store: &dyn CatalogStore,
    row: &SetRow,
    edition_id: &str,
    timezone: &str,
    resolved: &ResolvedArtists,
) -> Result<RowOutcome, CatalogError> {
    let mut errors = Vec::new();

    let names: Vec<&str> = row
        .artist_names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(RowOutcome::failed(
            "set row has no artist names".to_string(),
            errors,
        ));
    }

    // Resolve each artist; one bad name loses that artist, not the row.
    let mut linked: Vec<(&str, String)> = Vec::with_capacity(names.len());
    for &name in &names {
        if resolved.is_skipped(name) {
            errors.push(format!("artist '{}' was skipped during resolution", name));
            continue;
        }
        if let Some(id) = resolved.id_for(name) {
            linked.push((name, id.to_string()));
            continue;
        }
        match store.find_artist_by_name(name).await? {
            Some(artist) => linked.push((name, artist.id)),
            None => {
                debug!(artist = name, "no catalog id for artist");
                errors.push(format!("could not resolve artist '{}'", name));
            }
        }
    }
    if linked.is_empty() {
        return Ok(RowOutcome::failed(
            "no resolvable artists, row skipped".to_string(),
            errors,
        ));
    }

    let stage_id = match &row.stage_name {
        Some(stage_name) => match store.find_stage(stage_name, edition_id).await? {
            Some(id) => Some(id),
            None => {
                return Ok(RowOutcome::failed(
                    format!("stage '{}' not found for this edition", stage_name),
                    errors,
                ));
            }
        },
        None => None,
    };

    let linked_names: Vec<&str> = linked.iter().map(|(n, _)| *n).collect();
    let set_name = row
        .name
        .clone()
        .unwrap_or_else(|| derive_set_name(&linked_names));

    let time_start = row
        .time_start
        .as_deref()
        .and_then(|t| local_time_to_utc(t, timezone))
        .map(|dt| dt.naive_utc());
    let time_end = row
        .time_end
        .as_deref()
        .and_then(|t| local_time_to_utc(t, timezone))
        .map(|dt| dt.naive_utc());

    let set_id = match store
        .find_set(&set_name, edition_id, stage_id.as_deref())
        .await?
    {
        Some(id) => {
            store
                .update_set(&id, time_start, time_end, row.description.as_deref())
                .await?;
            id
        }
        None => {
            store
                .create_set(&NewSet {
                    name: set_name.clone(),
                    edition_id: edition_id.to_string(),
                    stage_id,
                    time_start,
                    time_end,
                    description: row.description.clone(),
                })
                .await?
        }
    };

    for (_, artist_id) in &linked {
        store.link_set_artist(&set_id, artist_id).await?;
    }

    Ok(RowOutcome {
        set_name: Some(set_name),
        errors,
    })
}

async fn import_set_rows(
    store: &dyn CatalogStore,
    rows: &[SetRow],
    edition_id: &str,
    timezone: &str,
    resolved: &ResolvedArtists,
    mut on_progress: impl FnMut(&RowProgress),
) -> Result<ImportReport, CatalogError> {
    let total = rows.len();
    let mut inserted = 0;
    let mut errors = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let row_no = index + 1;
        let outcome = import_one_set_row(store, row, edition_id, timezone, resolved).await?;

        for message in outcome.errors {
            errors.push(RowError {
                row: row_no,
                message,
            });
        }

        let ok = outcome.set_name.is_some();
        if ok {
            inserted += 1;
        }
        let current = outcome.set_name.unwrap_or_else(|| {
            row.name
                .clone()
                .unwrap_or_else(|| row.artist_names.trim().to_string())
        });
        on_progress(&RowProgress {
            completed: row_no,
            total,
            current,
            ok,
        });
    }

    Ok(ImportReport::finish("set(s)", total, inserted, errors))
}
