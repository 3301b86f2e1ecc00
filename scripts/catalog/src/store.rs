use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::CatalogError;
use crate::model::{ArtistPatch, CatalogArtist, NewArtist, NewSet};

/// The catalog surface the operator scripts depend on.
///
/// The import pipeline uses the artist/stage/set half; the vote, note and
/// link transfer operations exist only for the bulk duplicate merge.
/// Implemented by [`crate::PgCatalog`] against the web app's database and by
/// [`crate::MemoryCatalog`] for tests and dry runs.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All artists with their genre links, in stable name order.
    async fn read_artists(&self) -> Result<Vec<CatalogArtist>, CatalogError>;

    /// Exact-name lookup, case-insensitive.
    async fn find_artist_by_name(&self, name: &str)
        -> Result<Option<CatalogArtist>, CatalogError>;

    /// Insert a new artist row and return its id.
    async fn create_artist(&self, artist: &NewArtist) -> Result<String, CatalogError>;

    /// Fill empty fields on an artist from the patch; set fields are kept.
    async fn backfill_artist(&self, artist_id: &str, patch: &ArtistPatch)
        -> Result<(), CatalogError>;

    /// Upsert a stage by its `(name, edition)` natural key and return its id.
    /// An existing row is updated, never ignored.
    async fn upsert_stage(&self, name: &str, edition_id: &str) -> Result<String, CatalogError>;

    /// Stage id for `(name, edition)`, if present.
    async fn find_stage(&self, name: &str, edition_id: &str)
        -> Result<Option<String>, CatalogError>;

    /// Set id for the `(name, edition[, stage])` natural key, if present.
    async fn find_set(
        &self,
        name: &str,
        edition_id: &str,
        stage_id: Option<&str>,
    ) -> Result<Option<String>, CatalogError>;

    /// Insert a new set row and return its id.
    async fn create_set(&self, set: &NewSet) -> Result<String, CatalogError>;

    /// Update times and description of an existing set and clear its
    /// archived flag.
    async fn update_set(
        &self,
        set_id: &str,
        time_start: Option<NaiveDateTime>,
        time_end: Option<NaiveDateTime>,
        description: Option<&str>,
    ) -> Result<(), CatalogError>;

    /// Link an artist to a set; linking twice is a no-op.
    async fn link_set_artist(&self, set_id: &str, artist_id: &str) -> Result<(), CatalogError>;

    /// Genre row id for a name, created on first use.
    async fn ensure_genre(&self, name: &str) -> Result<String, CatalogError>;

    /// Link an artist to a genre; linking twice is a no-op.
    async fn link_artist_genre(&self, artist_id: &str, genre_id: &str)
        -> Result<(), CatalogError>;

    /// Number of votes cast for an artist.
    async fn vote_count(&self, artist_id: &str) -> Result<i64, CatalogError>;

    /// Move votes from one artist to another. A user who voted for both
    /// keeps exactly one vote on the target.
    async fn transfer_votes(&self, from_artist: &str, to_artist: &str)
        -> Result<(), CatalogError>;

    /// Move notes from one artist to another.
    async fn transfer_notes(&self, from_artist: &str, to_artist: &str)
        -> Result<(), CatalogError>;

    /// Re-point set links from one artist to another, dropping links that
    /// would duplicate an existing `(set, artist)` pair.
    async fn transfer_set_links(&self, from_artist: &str, to_artist: &str)
        -> Result<(), CatalogError>;

    /// Union genre links into the target artist and remove them from the
    /// source.
    async fn transfer_genres(&self, from_artist: &str, to_artist: &str)
        -> Result<(), CatalogError>;

    /// Delete an artist row. References must have been transferred first.
    async fn delete_artist(&self, artist_id: &str) -> Result<(), CatalogError>;
}
