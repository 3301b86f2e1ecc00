//! In-memory catalog store.
//!
//! Mirrors the Postgres store's observable behavior (natural-key upserts,
//! idempotent links, vote dedup on transfer) over plain vectors. Backs the
//! test suites and the import CLI's dry-run mode.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use crate::error::CatalogError;
use crate::model::{ArtistPatch, CatalogArtist, NewArtist, NewSet};
use crate::store::CatalogStore;

#[derive(Debug, Clone)]
struct StoredArtist {
    id: String,
    name: String,
    description: Option<String>,
    spotify_url: Option<String>,
    soundcloud_url: Option<String>,
    created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
struct StoredStage {
    id: String,
    name: String,
    edition_id: String,
}

#[derive(Debug, Clone)]
struct StoredSet {
    id: String,
    name: String,
    edition_id: String,
    stage_id: Option<String>,
    time_start: Option<NaiveDateTime>,
    time_end: Option<NaiveDateTime>,
    description: Option<String>,
    is_archived: bool,
}

#[derive(Debug, Default)]
struct Inner {
    artists: Vec<StoredArtist>,
    stages: Vec<StoredStage>,
    sets: Vec<StoredSet>,
    /// (set_id, artist_id)
    set_artists: Vec<(String, String)>,
    /// (user_id, artist_id)
    votes: Vec<(String, String)>,
    /// (user_id, artist_id, body)
    notes: Vec<(String, String, String)>,
    /// (genre_id, name)
    genres: Vec<(String, String)>,
    /// (artist_id, genre_id)
    artist_genres: Vec<(String, String)>,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<Inner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn artist_to_public(inner: &Inner, a: &StoredArtist) -> CatalogArtist {
        CatalogArtist {
            id: a.id.clone(),
            name: a.name.clone(),
            description: a.description.clone(),
            spotify_url: a.spotify_url.clone(),
            soundcloud_url: a.soundcloud_url.clone(),
            created_at: a.created_at,
            genre_ids: inner
                .artist_genres
                .iter()
                .filter(|(artist_id, _)| *artist_id == a.id)
                .map(|(_, genre_id)| genre_id.clone())
                .collect(),
        }
    }

    // --- seeding and inspection helpers for tests and dry runs ---

    pub fn seed_artist(&self, artist: NewArtist) -> String {
        self.seed_artist_created(artist, Utc::now().naive_utc())
    }

    pub fn seed_artist_created(&self, artist: NewArtist, created_at: NaiveDateTime) -> String {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id("artist");
        for genre_id in &artist.genre_ids {
            inner.artist_genres.push((id.clone(), genre_id.clone()));
        }
        inner.artists.push(StoredArtist {
            id: id.clone(),
            name: artist.name,
            description: artist.description,
            spotify_url: artist.spotify_url,
            soundcloud_url: artist.soundcloud_url,
            created_at,
        });
        id
    }

    pub fn seed_vote(&self, user_id: &str, artist_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.votes.push((user_id.to_string(), artist_id.to_string()));
    }

    pub fn seed_note(&self, user_id: &str, artist_id: &str, body: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .notes
            .push((user_id.to_string(), artist_id.to_string(), body.to_string()));
    }

    pub fn seed_genre(&self, name: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id("genre");
        inner.genres.push((id.clone(), name.to_string()));
        id
    }

    pub fn artist_count(&self) -> usize {
        self.inner.lock().unwrap().artists.len()
    }

    pub fn stage_count(&self) -> usize {
        self.inner.lock().unwrap().stages.len()
    }

    pub fn set_count(&self) -> usize {
        self.inner.lock().unwrap().sets.len()
    }

    pub fn has_artist(&self, artist_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .artists
            .iter()
            .any(|a| a.id == artist_id)
    }

    pub fn set_id_by_name(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .sets
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id.clone())
    }

    pub fn set_stage_id(&self, set_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .sets
            .iter()
            .find(|s| s.id == set_id)
            .and_then(|s| s.stage_id.clone())
    }

    pub fn set_time_start(&self, set_id: &str) -> Option<NaiveDateTime> {
        self.inner
            .lock()
            .unwrap()
            .sets
            .iter()
            .find(|s| s.id == set_id)
            .and_then(|s| s.time_start)
    }

    pub fn set_artists_of(&self, set_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .set_artists
            .iter()
            .filter(|(s, _)| s == set_id)
            .map(|(_, a)| a.clone())
            .collect()
    }

    /// User ids with a vote for the artist, sorted.
    pub fn voters_for(&self, artist_id: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .inner
            .lock()
            .unwrap()
            .votes
            .iter()
            .filter(|(_, a)| a == artist_id)
            .map(|(u, _)| u.clone())
            .collect();
        users.sort();
        users
    }

    pub fn notes_for(&self, artist_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .notes
            .iter()
            .filter(|(_, a, _)| a == artist_id)
            .map(|(_, _, body)| body.clone())
            .collect()
    }

    pub fn genre_ids_of(&self, artist_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .artist_genres
            .iter()
            .filter(|(a, _)| a == artist_id)
            .map(|(_, g)| g.clone())
            .collect()
    }

    pub fn artist_snapshot(&self, artist_id: &str) -> Option<CatalogArtist> {
        let inner = self.inner.lock().unwrap();
        inner
            .artists
            .iter()
            .find(|a| a.id == artist_id)
            .map(|a| Self::artist_to_public(&inner, a))
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn read_artists(&self) -> Result<Vec<CatalogArtist>, CatalogError> {
        let inner = self.inner.lock().unwrap();
        let mut artists: Vec<CatalogArtist> = inner
            .artists
            .iter()
            .map(|a| Self::artist_to_public(&inner, a))
            .collect();
        artists.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artists)
    }

    async fn find_artist_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CatalogArtist>, CatalogError> {
        let inner = self.inner.lock().unwrap();
        let needle = name.to_lowercase();
        Ok(inner
            .artists
            .iter()
            .find(|a| a.name.to_lowercase() == needle)
            .map(|a| Self::artist_to_public(&inner, a)))
    }

    async fn create_artist(&self, artist: &NewArtist) -> Result<String, CatalogError> {
        Ok(self.seed_artist(artist.clone()))
    }

    async fn backfill_artist(
        &self,
        artist_id: &str,
        patch: &ArtistPatch,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.artists.iter_mut().find(|a| a.id == artist_id) {
            if a.description.is_none() {
                a.description = patch.description.clone();
            }
            if a.spotify_url.is_none() {
                a.spotify_url = patch.spotify_url.clone();
            }
            if a.soundcloud_url.is_none() {
                a.soundcloud_url = patch.soundcloud_url.clone();
            }
        }
        Ok(())
    }

    async fn upsert_stage(&self, name: &str, edition_id: &str) -> Result<String, CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(stage) = inner
            .stages
            .iter()
            .find(|s| s.edition_id == edition_id && s.name == name)
        {
            return Ok(stage.id.clone());
        }
        let id = inner.next_id("stage");
        inner.stages.push(StoredStage {
            id: id.clone(),
            name: name.to_string(),
            edition_id: edition_id.to_string(),
        });
        Ok(id)
    }

    async fn find_stage(
        &self,
        name: &str,
        edition_id: &str,
    ) -> Result<Option<String>, CatalogError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .stages
            .iter()
            .find(|s| s.edition_id == edition_id && s.name == name)
            .map(|s| s.id.clone()))
    }

    async fn find_set(
        &self,
        name: &str,
        edition_id: &str,
        stage_id: Option<&str>,
    ) -> Result<Option<String>, CatalogError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .iter()
            .find(|s| {
                s.edition_id == edition_id
                    && s.name == name
                    && s.stage_id.as_deref() == stage_id
            })
            .map(|s| s.id.clone()))
    }

    async fn create_set(&self, set: &NewSet) -> Result<String, CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id("set");
        inner.sets.push(StoredSet {
            id: id.clone(),
            name: set.name.clone(),
            edition_id: set.edition_id.clone(),
            stage_id: set.stage_id.clone(),
            time_start: set.time_start,
            time_end: set.time_end,
            description: set.description.clone(),
            is_archived: false,
        });
        Ok(id)
    }

    async fn update_set(
        &self,
        set_id: &str,
        time_start: Option<NaiveDateTime>,
        time_end: Option<NaiveDateTime>,
        description: Option<&str>,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(s) = inner.sets.iter_mut().find(|s| s.id == set_id) {
            s.time_start = time_start;
            s.time_end = time_end;
            s.description = description.map(|d| d.to_string());
            s.is_archived = false;
        }
        Ok(())
    }

    async fn link_set_artist(&self, set_id: &str, artist_id: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        let link = (set_id.to_string(), artist_id.to_string());
        if !inner.set_artists.contains(&link) {
            inner.set_artists.push(link);
        }
        Ok(())
    }

    async fn ensure_genre(&self, name: &str) -> Result<String, CatalogError> {
        {
            let inner = self.inner.lock().unwrap();
            if let Some((id, _)) = inner.genres.iter().find(|(_, n)| n == name) {
                return Ok(id.clone());
            }
        }
        Ok(self.seed_genre(name))
    }

    async fn link_artist_genre(
        &self,
        artist_id: &str,
        genre_id: &str,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        let link = (artist_id.to_string(), genre_id.to_string());
        if !inner.artist_genres.contains(&link) {
            inner.artist_genres.push(link);
        }
        Ok(())
    }

    async fn vote_count(&self, artist_id: &str) -> Result<i64, CatalogError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.votes.iter().filter(|(_, a)| a == artist_id).count() as i64)
    }

    async fn transfer_votes(&self, from_artist: &str, to_artist: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        let target_users: Vec<String> = inner
            .votes
            .iter()
            .filter(|(_, a)| a == to_artist)
            .map(|(u, _)| u.clone())
            .collect();
        inner
            .votes
            .retain(|(u, a)| !(a == from_artist && target_users.contains(u)));
        for (_, a) in inner.votes.iter_mut().filter(|(_, a)| a == from_artist) {
            *a = to_artist.to_string();
        }
        Ok(())
    }

    async fn transfer_notes(&self, from_artist: &str, to_artist: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        for (_, a, _) in inner.notes.iter_mut().filter(|(_, a, _)| a == from_artist) {
            *a = to_artist.to_string();
        }
        Ok(())
    }

    async fn transfer_set_links(
        &self,
        from_artist: &str,
        to_artist: &str,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        let target_sets: Vec<String> = inner
            .set_artists
            .iter()
            .filter(|(_, a)| a == to_artist)
            .map(|(s, _)| s.clone())
            .collect();
        inner
            .set_artists
            .retain(|(s, a)| !(a == from_artist && target_sets.contains(s)));
        for (_, a) in inner
            .set_artists
            .iter_mut()
            .filter(|(_, a)| a == from_artist)
        {
            *a = to_artist.to_string();
        }
        Ok(())
    }

    async fn transfer_genres(
        &self,
        from_artist: &str,
        to_artist: &str,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        let moved: Vec<String> = inner
            .artist_genres
            .iter()
            .filter(|(a, _)| a == from_artist)
            .map(|(_, g)| g.clone())
            .collect();
        inner.artist_genres.retain(|(a, _)| a != from_artist);
        for genre_id in moved {
            let link = (to_artist.to_string(), genre_id);
            if !inner.artist_genres.contains(&link) {
                inner.artist_genres.push(link);
            }
        }
        Ok(())
    }

    async fn delete_artist(&self, artist_id: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock().unwrap();
        inner.artists.retain(|a| a.id != artist_id);
        // the database cascades these; mirror it
        inner.votes.retain(|(_, a)| a != artist_id);
        inner.notes.retain(|(_, a, _)| a != artist_id);
        inner.set_artists.retain(|(_, a)| a != artist_id);
        inner.artist_genres.retain(|(a, _)| a != artist_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vote_transfer_keeps_one_vote_per_user() {
        let store = MemoryCatalog::new();
        let keep = store.seed_artist(NewArtist {
            name: "Shpongle".into(),
            ..Default::default()
        });
        let dup = store.seed_artist(NewArtist {
            name: "Shpongle ".into(),
            ..Default::default()
        });
        store.seed_vote("u1", &keep);
        store.seed_vote("u1", &dup);
        store.seed_vote("u2", &dup);

        store.transfer_votes(&dup, &keep).await.unwrap();

        assert_eq!(store.voters_for(&keep), vec!["u1", "u2"]);
        assert!(store.voters_for(&dup).is_empty());
    }

    #[tokio::test]
    async fn stage_upsert_is_idempotent() {
        let store = MemoryCatalog::new();
        let a = store.upsert_stage("Main", "ed1").await.unwrap();
        let b = store.upsert_stage("Main", "ed1").await.unwrap();
        let c = store.upsert_stage("Main", "ed2").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.stage_count(), 2);
    }

    #[tokio::test]
    async fn backfill_fills_only_empty_fields() {
        let store = MemoryCatalog::new();
        let id = store.seed_artist(NewArtist {
            name: "Ott".into(),
            description: Some("dub producer".into()),
            ..Default::default()
        });
        store
            .backfill_artist(
                &id,
                &ArtistPatch {
                    description: Some("other text".into()),
                    spotify_url: Some("https://open.spotify.com/artist/ott".into()),
                    soundcloud_url: None,
                },
            )
            .await
            .unwrap();

        let artist = store.artist_snapshot(&id).unwrap();
        assert_eq!(artist.description.as_deref(), Some("dub producer"));
        assert_eq!(
            artist.spotify_url.as_deref(),
            Some("https://open.spotify.com/artist/ott")
        );
    }
}
