//! Bulk lineup import pipeline.
//!
//! Raw CSV text flows through the parser into row records, artist name
//! candidates are extracted and checked against the existing catalog for
//! plausible duplicates, the operator resolves each conflict (or applies a
//! bulk resolution), and the importer commits stages, sets and artist links
//! row by row. Row-level problems are collected into the result report;
//! only a failing backend aborts a run.

pub mod candidates;
pub mod conflict;
pub mod csv;
pub mod importer;
pub mod resolution;
pub mod resolver;
pub mod session;

pub use candidates::{extract_artist_candidates, ImportCandidate};
pub use conflict::{detect_conflicts, ConflictScan, ImportConflict};
pub use csv::{parse_sets_csv, parse_stages_csv, SetRow, StageRow};
pub use importer::{
    derive_set_name, import_sets, import_sets_with_resolutions, import_stages, ImportError,
    ImportReport, RowError, RowProgress,
};
pub use resolution::{ConflictResolution, ResolutionEngine, ResolutionError};
pub use session::{ImportPhase, ImportSession, SessionError};
