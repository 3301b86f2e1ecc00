//! Postgres-backed catalog store.
//!
//! Talks directly to the web app's Prisma-managed schema. Natural-key
//! upserts use `ON CONFLICT` so re-running an import converges on the same
//! rows instead of duplicating them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use slug::slugify;
use sqlx::{PgPool, Row};

use crate::error::CatalogError;
use crate::model::{ArtistPatch, CatalogArtist, NewArtist, NewSet};
use crate::store::CatalogStore;

pub struct PgCatalog {
    pool: PgPool,
    created_by: Option<String>,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            created_by: None,
        }
    }

    /// Attribute rows inserted by this store to a user id.
    pub fn with_creator(mut self, user_id: impl Into<String>) -> Self {
        self.created_by = Some(user_id.into());
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Artists without a SoundCloud link, optionally filtered by name
    /// prefix, in name order. Used by the enrichment job.
    pub async fn artists_missing_soundcloud(
        &self,
        only: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, String)>, CatalogError> {
        let mut query = String::from(
            r#"SELECT id, name FROM "Artist" WHERE "soundcloudUrl" IS NULL"#,
        );
        if only.is_some() {
            query.push_str(r#" AND LOWER(name) LIKE $1"#);
        }
        query.push_str(" ORDER BY name");
        if limit > 0 {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query_as::<_, (String, String)>(&query);
        if let Some(prefix) = only {
            q = q.bind(format!("{}%", prefix.to_lowercase()));
        }
        Ok(q.fetch_all(&self.pool).await?)
    }

    pub async fn set_soundcloud_url(&self, artist_id: &str, url: &str) -> Result<(), CatalogError> {
        sqlx::query(
            r#"UPDATE "Artist" SET "soundcloudUrl" = $1, "updatedAt" = NOW() WHERE id = $2"#,
        )
        .bind(url)
        .bind(artist_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Slug for a new artist, suffixed when the plain slug is already taken
    /// so an operator's deliberate "import as new" never collides away.
    async fn free_artist_slug(&self, name: &str, id: &str) -> Result<String, CatalogError> {
        let base = slugify(name);
        let taken: Option<(String,)> =
            sqlx::query_as(r#"SELECT id FROM "Artist" WHERE slug = $1"#)
                .bind(&base)
                .fetch_optional(&self.pool)
                .await?;
        if taken.is_none() {
            return Ok(base);
        }
        Ok(format!("{}-{}", base, &id[..6.min(id.len())]))
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn read_artists(&self) -> Result<Vec<CatalogArtist>, CatalogError> {
        type ArtistRow = (
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            NaiveDateTime,
        );
        let rows: Vec<ArtistRow> = sqlx::query_as(
            r#"SELECT id, name, description, "spotifyUrl", "soundcloudUrl", "createdAt"
               FROM "Artist" ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let links: Vec<(String, String)> =
            sqlx::query_as(r#"SELECT "A", "B" FROM "_ArtistGenres""#)
                .fetch_all(&self.pool)
                .await?;
        let mut genres_by_artist: HashMap<String, Vec<String>> = HashMap::new();
        for (artist_id, genre_id) in links {
            genres_by_artist.entry(artist_id).or_default().push(genre_id);
        }

        Ok(rows
            .into_iter()
            .map(
                |(id, name, description, spotify_url, soundcloud_url, created_at)| CatalogArtist {
                    genre_ids: genres_by_artist.remove(&id).unwrap_or_default(),
                    id,
                    name,
                    description,
                    spotify_url,
                    soundcloud_url,
                    created_at,
                },
            )
            .collect())
    }

    async fn find_artist_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CatalogArtist>, CatalogError> {
        type ArtistRow = (
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            NaiveDateTime,
        );
        let row: Option<ArtistRow> = sqlx::query_as(
            r#"SELECT id, name, description, "spotifyUrl", "soundcloudUrl", "createdAt"
               FROM "Artist" WHERE LOWER(name) = LOWER($1) LIMIT 1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, name, description, spotify_url, soundcloud_url, created_at)) = row else {
            return Ok(None);
        };

        let genre_ids: Vec<(String,)> =
            sqlx::query_as(r#"SELECT "B" FROM "_ArtistGenres" WHERE "A" = $1"#)
                .bind(&id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(CatalogArtist {
            id,
            name,
            description,
            spotify_url,
            soundcloud_url,
            created_at,
            genre_ids: genre_ids.into_iter().map(|(g,)| g).collect(),
        }))
    }

    async fn create_artist(&self, artist: &NewArtist) -> Result<String, CatalogError> {
        let id = cuid2::create_id();
        let artist_slug = self.free_artist_slug(&artist.name, &id).await?;
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"INSERT INTO "Artist"
               (id, name, slug, description, "spotifyUrl", "soundcloudUrl", "createdAt", "updatedAt")
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)"#,
        )
        .bind(&id)
        .bind(&artist.name)
        .bind(&artist_slug)
        .bind(&artist.description)
        .bind(&artist.spotify_url)
        .bind(&artist.soundcloud_url)
        .bind(now)
        .execute(&self.pool)
        .await?;

        for genre_id in &artist.genre_ids {
            self.link_artist_genre(&id, genre_id).await?;
        }

        Ok(id)
    }

    async fn backfill_artist(
        &self,
        artist_id: &str,
        patch: &ArtistPatch,
    ) -> Result<(), CatalogError> {
        if patch.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"UPDATE "Artist" SET
                 description = COALESCE(description, $1),
                 "spotifyUrl" = COALESCE("spotifyUrl", $2),
                 "soundcloudUrl" = COALESCE("soundcloudUrl", $3),
                 "updatedAt" = $4
               WHERE id = $5"#,
        )
        .bind(&patch.description)
        .bind(&patch.spotify_url)
        .bind(&patch.soundcloud_url)
        .bind(Utc::now().naive_utc())
        .bind(artist_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_stage(&self, name: &str, edition_id: &str) -> Result<String, CatalogError> {
        let id = cuid2::create_id();
        let now = Utc::now().naive_utc();
        let row = sqlx::query(
            r#"INSERT INTO "Stage" (id, name, "editionId", "createdAt", "updatedAt")
               VALUES ($1, $2, $3, $4, $4)
               ON CONFLICT ("editionId", name) DO UPDATE SET "updatedAt" = $4
               RETURNING id"#,
        )
        .bind(&id)
        .bind(name)
        .bind(edition_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<String, _>("id"))
    }

    async fn find_stage(
        &self,
        name: &str,
        edition_id: &str,
    ) -> Result<Option<String>, CatalogError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT id FROM "Stage" WHERE "editionId" = $1 AND name = $2"#,
        )
        .bind(edition_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn find_set(
        &self,
        name: &str,
        edition_id: &str,
        stage_id: Option<&str>,
    ) -> Result<Option<String>, CatalogError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT id FROM "Set"
               WHERE "editionId" = $1 AND name = $2 AND "stageId" IS NOT DISTINCT FROM $3"#,
        )
        .bind(edition_id)
        .bind(name)
        .bind(stage_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn create_set(&self, set: &NewSet) -> Result<String, CatalogError> {
        let id = cuid2::create_id();
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"INSERT INTO "Set"
               (id, name, "editionId", "stageId", "timeStart", "timeEnd", description,
                "isArchived", "createdBy", "createdAt", "updatedAt")
               VALUES ($1, $2, $3, $4, $5, $6, $7, false, $8, $9, $9)"#,
        )
        .bind(&id)
        .bind(&set.name)
        .bind(&set.edition_id)
        .bind(&set.stage_id)
        .bind(set.time_start)
        .bind(set.time_end)
        .bind(&set.description)
        .bind(&self.created_by)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_set(
        &self,
        set_id: &str,
        time_start: Option<NaiveDateTime>,
        time_end: Option<NaiveDateTime>,
        description: Option<&str>,
    ) -> Result<(), CatalogError> {
        sqlx::query(
            r#"UPDATE "Set" SET
                 "timeStart" = $1, "timeEnd" = $2, description = $3,
                 "isArchived" = false, "updatedAt" = $4
               WHERE id = $5"#,
        )
        .bind(time_start)
        .bind(time_end)
        .bind(description)
        .bind(Utc::now().naive_utc())
        .bind(set_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn link_set_artist(&self, set_id: &str, artist_id: &str) -> Result<(), CatalogError> {
        let id = cuid2::create_id();
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"INSERT INTO "SetArtist" (id, "setId", "artistId", "createdAt")
               VALUES ($1, $2, $3, $4)
               ON CONFLICT ("setId", "artistId") DO NOTHING"#,
        )
        .bind(&id)
        .bind(set_id)
        .bind(artist_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_genre(&self, name: &str) -> Result<String, CatalogError> {
        let existing: Option<(String,)> =
            sqlx::query_as(r#"SELECT id FROM "Genre" WHERE name = $1"#)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((id,)) = existing {
            return Ok(id);
        }

        let id = cuid2::create_id();
        sqlx::query(
            r#"INSERT INTO "Genre" (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING"#,
        )
        .bind(&id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        let row: (String,) = sqlx::query_as(r#"SELECT id FROM "Genre" WHERE name = $1"#)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    async fn link_artist_genre(
        &self,
        artist_id: &str,
        genre_id: &str,
    ) -> Result<(), CatalogError> {
        sqlx::query(
            r#"INSERT INTO "_ArtistGenres" ("A", "B")
               VALUES ($1, $2)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(artist_id)
        .bind(genre_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn vote_count(&self, artist_id: &str) -> Result<i64, CatalogError> {
        let row: (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*)::bigint FROM "Vote" WHERE "artistId" = $1"#)
                .bind(artist_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn transfer_votes(&self, from_artist: &str, to_artist: &str) -> Result<(), CatalogError> {
        // Drop votes that would collide with an existing vote on the target,
        // then re-point the rest. Keeps one vote per user.
        sqlx::query(
            r#"DELETE FROM "Vote" v USING "Vote" s
               WHERE v."artistId" = $1 AND s."artistId" = $2 AND s."userId" = v."userId""#,
        )
        .bind(from_artist)
        .bind(to_artist)
        .execute(&self.pool)
        .await?;

        sqlx::query(r#"UPDATE "Vote" SET "artistId" = $2 WHERE "artistId" = $1"#)
            .bind(from_artist)
            .bind(to_artist)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transfer_notes(&self, from_artist: &str, to_artist: &str) -> Result<(), CatalogError> {
        sqlx::query(r#"UPDATE "ArtistNote" SET "artistId" = $2 WHERE "artistId" = $1"#)
            .bind(from_artist)
            .bind(to_artist)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transfer_set_links(
        &self,
        from_artist: &str,
        to_artist: &str,
    ) -> Result<(), CatalogError> {
        sqlx::query(
            r#"DELETE FROM "SetArtist" d USING "SetArtist" s
               WHERE d."artistId" = $1 AND s."artistId" = $2 AND s."setId" = d."setId""#,
        )
        .bind(from_artist)
        .bind(to_artist)
        .execute(&self.pool)
        .await?;

        sqlx::query(r#"UPDATE "SetArtist" SET "artistId" = $2 WHERE "artistId" = $1"#)
            .bind(from_artist)
            .bind(to_artist)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transfer_genres(
        &self,
        from_artist: &str,
        to_artist: &str,
    ) -> Result<(), CatalogError> {
        sqlx::query(
            r#"INSERT INTO "_ArtistGenres" ("A", "B")
               SELECT $2, "B" FROM "_ArtistGenres" WHERE "A" = $1
               ON CONFLICT DO NOTHING"#,
        )
        .bind(from_artist)
        .bind(to_artist)
        .execute(&self.pool)
        .await?;

        sqlx::query(r#"DELETE FROM "_ArtistGenres" WHERE "A" = $1"#)
            .bind(from_artist)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_artist(&self, artist_id: &str) -> Result<(), CatalogError> {
        sqlx::query(r#"DELETE FROM "Artist" WHERE id = $1"#)
            .bind(artist_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
