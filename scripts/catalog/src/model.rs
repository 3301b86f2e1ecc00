use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A persisted artist row, as read from the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub spotify_url: Option<String>,
    pub soundcloud_url: Option<String>,
    pub created_at: NaiveDateTime,
    /// Ids of linked genres.
    pub genre_ids: Vec<String>,
}

/// Fields for a new artist row. The store assigns id, slug and timestamps.
#[derive(Debug, Clone, Default)]
pub struct NewArtist {
    pub name: String,
    pub description: Option<String>,
    pub spotify_url: Option<String>,
    pub soundcloud_url: Option<String>,
    pub genre_ids: Vec<String>,
}

/// Candidate values for filling empty artist fields. Fields that are already
/// set on the row are left untouched by the store.
#[derive(Debug, Clone, Default)]
pub struct ArtistPatch {
    pub description: Option<String>,
    pub spotify_url: Option<String>,
    pub soundcloud_url: Option<String>,
}

impl ArtistPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.spotify_url.is_none() && self.soundcloud_url.is_none()
    }
}

/// Fields for a new performance set row.
#[derive(Debug, Clone, Default)]
pub struct NewSet {
    pub name: String,
    pub edition_id: String,
    pub stage_id: Option<String>,
    pub time_start: Option<NaiveDateTime>,
    pub time_end: Option<NaiveDateTime>,
    pub description: Option<String>,
}

/// How a bulk merge picks the surviving artist of a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Most complete profile wins, vote activity breaks ties.
    Smart,
    /// First artist in the group's existing order.
    First,
    /// Most recently created artist.
    Newest,
    /// Oldest artist.
    Oldest,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smart => "smart",
            Self::First => "first",
            Self::Newest => "newest",
            Self::Oldest => "oldest",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "smart" => Ok(Self::Smart),
            "first" => Ok(Self::First),
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            other => Err(format!(
                "unknown merge strategy '{}' (expected smart, first, newest or oldest)",
                other
            )),
        }
    }
}
