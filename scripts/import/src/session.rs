//! One import session from raw files to committed rows.

use thiserror::Error;

use lineup_catalog::{CatalogError, CatalogStore};

use crate::candidates::{extract_artist_candidates, ImportCandidate};
use crate::conflict::detect_conflicts;
use crate::csv::{parse_sets_csv, parse_stages_csv, SetRow, StageRow};
use crate::importer::{
    import_sets_with_resolutions, import_stages, ImportError, ImportReport, RowProgress,
};
use crate::resolution::ResolutionEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    ParsingFiles,
    DetectingConflicts,
    AwaitingResolution,
    Importing,
    Completed,
    CompletedWithErrors,
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("cancel is only possible while awaiting resolution (currently {0:?})")]
    CancelUnavailable(ImportPhase),
}

/// Owns the parsed rows, the detected conflicts and the resolution map for
/// a single operator session. Rows committed by `commit` are never rolled
/// back; cancelling is only possible before the commit starts.
pub struct ImportSession {
    phase: ImportPhase,
    edition_id: String,
    timezone: String,
    stage_rows: Vec<StageRow>,
    set_rows: Vec<SetRow>,
    clean: Vec<ImportCandidate>,
    engine: Option<ResolutionEngine>,
}

impl ImportSession {
    pub fn new(edition_id: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            phase: ImportPhase::Idle,
            edition_id: edition_id.into(),
            timezone: timezone.into(),
            stage_rows: Vec::new(),
            set_rows: Vec::new(),
            clean: Vec::new(),
            engine: None,
        }
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn stage_rows(&self) -> &[StageRow] {
        &self.stage_rows
    }

    pub fn set_rows(&self) -> &[SetRow] {
        &self.set_rows
    }

    pub fn clean_candidates(&self) -> &[ImportCandidate] {
        &self.clean
    }

    pub fn engine(&self) -> Option<&ResolutionEngine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut ResolutionEngine> {
        self.engine.as_mut()
    }

    /// Parse the raw files into rows.
    pub fn load(&mut self, stages_text: Option<&str>, sets_text: Option<&str>) {
        self.phase = ImportPhase::ParsingFiles;
        self.stage_rows = stages_text.map(parse_stages_csv).unwrap_or_default();
        self.set_rows = sets_text.map(parse_sets_csv).unwrap_or_default();
    }

    /// Scan the catalog for duplicates of the extracted candidates. With
    /// conflicts the session waits for resolutions, otherwise it is ready
    /// to commit.
    pub async fn detect(&mut self, store: &dyn CatalogStore) -> Result<(), CatalogError> {
        self.phase = ImportPhase::DetectingConflicts;

        let candidates = extract_artist_candidates(&self.set_rows);
        let catalog = store.read_artists().await?;
        let scan = detect_conflicts(&candidates, &catalog);

        self.clean = scan.clean;
        let has_conflicts = !scan.conflicts.is_empty();
        self.engine = Some(ResolutionEngine::new(scan.conflicts));
        if has_conflicts {
            self.phase = ImportPhase::AwaitingResolution;
        }
        Ok(())
    }

    /// Abandon the session. Only possible while the operator is still
    /// deciding; once the commit has started there is no way back.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if self.phase != ImportPhase::AwaitingResolution {
            return Err(SessionError::CancelUnavailable(self.phase));
        }
        self.phase = ImportPhase::Idle;
        self.stage_rows.clear();
        self.set_rows.clear();
        self.clean.clear();
        self.engine = None;
        Ok(())
    }

    /// Commit stages first, then sets. Blocked while conflicts are
    /// unresolved.
    pub async fn commit(
        &mut self,
        store: &dyn CatalogStore,
        mut on_progress: impl FnMut(&RowProgress),
    ) -> Result<ImportReport, ImportError> {
        let engine = match &self.engine {
            Some(engine) => engine,
            None => return Err(ImportError::ResolutionRequired { unresolved: 0 }),
        };
        if !engine.is_fully_resolved() {
            return Err(ImportError::ResolutionRequired {
                unresolved: engine.unresolved_count(),
            });
        }

        self.phase = ImportPhase::Importing;

        let stage_report =
            import_stages(store, &self.stage_rows, &self.edition_id, &mut on_progress).await?;

        let set_report = import_sets_with_resolutions(
            store,
            &self.set_rows,
            &self.edition_id,
            engine,
            &self.clean,
            &self.timezone,
            &mut on_progress,
        )
        .await?;

        let report = stage_report.merged(set_report);
        self.phase = if report.errors.is_empty() {
            ImportPhase::Completed
        } else {
            ImportPhase::CompletedWithErrors
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use lineup_catalog::model::NewArtist;
    use lineup_catalog::MemoryCatalog;

    use super::*;

    fn no_progress(_: &RowProgress) {}

    #[tokio::test]
    async fn no_conflicts_goes_straight_to_commit() {
        let store = MemoryCatalog::new();
        let mut session = ImportSession::new("ed1", "Europe/Amsterdam");
        session.load(Some("name\nMain\n"), Some("artist_names,stage_name\nOtt,Main\n"));
        session.detect(&store).await.unwrap();

        assert_eq!(session.phase(), ImportPhase::DetectingConflicts);

        let report = session.commit(&store, no_progress).await.unwrap();
        assert!(report.success);
        assert_eq!(session.phase(), ImportPhase::Completed);
        assert_eq!(store.stage_count(), 1);
        assert_eq!(store.set_count(), 1);
    }

    #[tokio::test]
    async fn conflicts_move_the_session_to_awaiting_resolution() {
        let store = MemoryCatalog::new();
        store.seed_artist(NewArtist {
            name: "Amelie Lens".into(),
            ..Default::default()
        });
        store.seed_artist(NewArtist {
            name: "Amelie Lenz".into(),
            ..Default::default()
        });

        let mut session = ImportSession::new("ed1", "Europe/Amsterdam");
        session.load(None, Some("artist_names\nAmelie Lens\n"));
        session.detect(&store).await.unwrap();

        assert_eq!(session.phase(), ImportPhase::AwaitingResolution);

        let err = session.commit(&store, no_progress).await.unwrap_err();
        assert!(matches!(err, ImportError::ResolutionRequired { .. }));
        // commit was refused, not started
        assert_eq!(session.phase(), ImportPhase::AwaitingResolution);
    }

    #[tokio::test]
    async fn cancel_only_while_awaiting_resolution() {
        let store = MemoryCatalog::new();
        let mut session = ImportSession::new("ed1", "Europe/Amsterdam");

        assert_eq!(
            session.cancel(),
            Err(SessionError::CancelUnavailable(ImportPhase::Idle))
        );

        store.seed_artist(NewArtist {
            name: "Shpongle".into(),
            ..Default::default()
        });
        session.load(None, Some("artist_names\nShpongle\nShpongle,Ott\n"));
        session.detect(&store).await.unwrap();
        assert_eq!(session.phase(), ImportPhase::AwaitingResolution);

        session.cancel().unwrap();
        assert_eq!(session.phase(), ImportPhase::Idle);
        assert!(session.set_rows().is_empty());

        // nothing was written
        assert_eq!(store.set_count(), 0);
        assert_eq!(store.artist_count(), 1);
    }

    #[tokio::test]
    async fn completed_with_errors_when_some_rows_fail() {
        let store = MemoryCatalog::new();
        let mut session = ImportSession::new("ed1", "Europe/Amsterdam");
        session.load(
            Some("name\nMain\n"),
            Some("artist_names,stage_name\nOtt,Main\nShpongle,Nowhere\n"),
        );
        session.detect(&store).await.unwrap();

        let report = session.commit(&store, no_progress).await.unwrap();

        assert!(report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(session.phase(), ImportPhase::CompletedWithErrors);
    }
}
