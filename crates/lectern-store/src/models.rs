//! Library-side value types consumed by the account predicates and the scan
//! ledger.
//!
//! These are plain snapshots: the library and item records themselves are
//! owned elsewhere, callers hand in whatever they loaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryMediaType {
    #[default]
    Book,
    Podcast,
}

/// A folder watched by a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryFolder {
    pub id: String,
    pub full_path: String,
}

/// Library configuration as it is at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub media_type: LibraryMediaType,
    #[serde(default)]
    pub folders: Vec<LibraryFolder>,
    #[serde(default)]
    pub display_order: u32,
}

// ---------------------------------------------------------------------------
// Library item
// ---------------------------------------------------------------------------

/// One episode of a podcast item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodcastEpisode {
    pub id: String,
    /// Length in seconds.
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// Absolute path of the source cover image, if the item has one.
    #[serde(default)]
    pub cover_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub explicit: bool,
    /// Total length in seconds (books).
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub episodes: Vec<PodcastEpisode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub id: String,
    pub library_id: String,
    #[serde(default)]
    pub media: Media,
}

impl LibraryItem {
    pub fn episode(&self, episode_id: &str) -> Option<&PodcastEpisode> {
        self.media.episodes.iter().find(|ep| ep.id == episode_id)
    }
}

// ---------------------------------------------------------------------------
// Playback session
// ---------------------------------------------------------------------------

/// An open playback session, as tracked by the playback manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub id: String,
    pub user_id: String,
    pub library_item_id: String,
    #[serde(default)]
    pub episode_id: Option<String>,
    pub display_title: String,
    /// Position in seconds.
    pub current_time: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// The slice of a [`PlaybackSession`] that is safe to show to other users.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSessionSummary {
    pub id: String,
    pub library_item_id: String,
    pub episode_id: Option<String>,
    pub display_title: String,
    pub current_time: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl PlaybackSession {
    pub fn to_client_summary(&self) -> PlaybackSessionSummary {
        PlaybackSessionSummary {
            id: self.id.clone(),
            library_item_id: self.library_item_id.clone(),
            episode_id: self.episode_id.clone(),
            display_title: self.display_title.clone(),
            current_time: self.current_time,
            updated_at: self.updated_at,
        }
    }
}
