use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserAccount;
use crate::models::LibraryItem;

/// Listening (or reading) progress for one item, or one podcast episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProgress {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub library_item_id: String,
    #[serde(default)]
    pub episode_id: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
    /// Fraction between 0 and 1.
    #[serde(default)]
    pub progress: f64,
    /// Seconds.
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub hide_from_continue_listening: bool,
    #[serde(default)]
    pub ebook_location: Option<String>,
    #[serde(default)]
    pub ebook_progress: Option<f64>,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Progress payload sent by a client; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProgressUpdate {
    pub duration: Option<f64>,
    pub progress: Option<f64>,
    pub current_time: Option<f64>,
    pub is_finished: Option<bool>,
    pub hide_from_continue_listening: Option<bool>,
    pub ebook_location: Option<String>,
    pub ebook_progress: Option<f64>,
    /// Client-side timestamp; offline clients replay updates out of order.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub finished_at: Option<DateTime<Utc>>,
}

fn set_if_changed<T: PartialEq + Clone>(slot: &mut T, value: Option<&T>) -> bool {
    match value {
        Some(v) if v != slot => {
            *slot = v.clone();
            true
        }
        _ => false,
    }
}

impl MediaProgress {
    /// Build a fresh record for `item` owned by `user_id`.
    pub fn new(
        item: &LibraryItem,
        payload: &MediaProgressUpdate,
        episode_id: Option<&str>,
        user_id: &str,
    ) -> Self {
        let now = Utc::now();
        let media_duration = episode_id
            .and_then(|id| item.episode(id))
            .map(|ep| ep.duration)
            .unwrap_or(item.media.duration);
        let progress = payload.progress.unwrap_or(0.0).clamp(0.0, 1.0);
        let is_finished = payload.is_finished.unwrap_or(false) || progress >= 1.0;

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            library_item_id: item.id.clone(),
            episode_id: episode_id.map(str::to_string),
            duration: payload.duration.unwrap_or(media_duration),
            progress: if is_finished { 1.0 } else { progress },
            current_time: payload.current_time.unwrap_or(0.0),
            is_finished,
            hide_from_continue_listening: payload.hide_from_continue_listening.unwrap_or(false),
            ebook_location: payload.ebook_location.clone(),
            ebook_progress: payload.ebook_progress,
            last_update: now,
            started_at: payload.started_at.unwrap_or(now),
            finished_at: is_finished.then(|| payload.finished_at.unwrap_or(now)),
        }
    }

    fn matches(&self, library_item_id: &str, episode_id: Option<&str>) -> bool {
        if let Some(episode_id) = episode_id {
            if self.episode_id.as_deref() != Some(episode_id) {
                return false;
            }
        }
        self.library_item_id == library_item_id
    }

    /// Apply `payload` field by field and report whether anything changed.
    ///
    /// Finishing pins progress to 1 and stamps `finishedAt`; un-finishing,
    /// either explicitly or by reporting progress below 1, clears it. Any change brings the record back to continue-listening
    /// unless the payload says otherwise.
    pub fn update(&mut self, payload: &MediaProgressUpdate) -> bool {
        let now = Utc::now();
        let mut changed = false;

        changed |= set_if_changed(&mut self.duration, payload.duration.as_ref());
        let progress = payload.progress.map(|p| p.clamp(0.0, 1.0));
        changed |= set_if_changed(&mut self.progress, progress.as_ref());
        changed |= set_if_changed(&mut self.current_time, payload.current_time.as_ref());
        changed |= set_if_changed(
            &mut self.hide_from_continue_listening,
            payload.hide_from_continue_listening.as_ref(),
        );
        if payload.ebook_location.is_some() {
            changed |= set_if_changed(&mut self.ebook_location, Some(&payload.ebook_location));
        }
        if payload.ebook_progress.is_some() {
            changed |= set_if_changed(&mut self.ebook_progress, Some(&payload.ebook_progress));
        }

        let finish_requested = payload.is_finished == Some(true) || (payload.is_finished.is_none() && self.progress >= 1.0);
        if finish_requested {
            if !self.is_finished {
                self.is_finished = true;
                self.finished_at = Some(payload.finished_at.unwrap_or(now));
                changed = true;
            }
            self.progress = 1.0;
        } else if self.is_finished && (payload.is_finished == Some(false) || self.progress < 1.0) {
            self.is_finished = false;
            self.finished_at = None;
            changed = true;
        }

        if changed {
            if payload.hide_from_continue_listening.is_none() {
                self.hide_from_continue_listening = false;
            }
            self.last_update = now;
        }
        changed
    }

    /// Hide this record from continue-listening; true if it was visible.
    pub fn remove_from_continue_listening(&mut self) -> bool {
        if self.hide_from_continue_listening {
            return false;
        }
        self.hide_from_continue_listening = true;
        true
    }
}

impl UserAccount {
    pub fn media_progress_records(&self) -> &[MediaProgress] {
        &self.media_progress
    }

    /// Progress for an item; without `episode_id` any record of the item matches.
    pub fn media_progress(&self, library_item_id: &str, episode_id: Option<&str>) -> Option<&MediaProgress> {
        self.media_progress
            .iter()
            .find(|mp| mp.matches(library_item_id, episode_id))
    }

    pub fn all_media_progress_for_item(&self, library_item_id: &str) -> Vec<&MediaProgress> {
        self.media_progress
            .iter()
            .filter(|mp| mp.library_item_id == library_item_id)
            .collect()
    }

    /// Create or update progress for `item` and report whether anything changed.
    ///
    /// A payload `lastUpdate` is copied verbatim onto an existing record even
    /// when nothing else changed, so offline clients can sync their clocks.
    pub fn upsert_media_progress(
        &mut self,
        item: &LibraryItem,
        payload: &MediaProgressUpdate,
        episode_id: Option<&str>,
    ) -> bool {
        let existing = self
            .media_progress
            .iter()
            .position(|mp| mp.matches(&item.id, episode_id));

        let Some(index) = existing else {
            let progress = MediaProgress::new(item, payload, episode_id, &self.id);
            self.media_progress.push(progress);
            return true;
        };

        let progress = &mut self.media_progress[index];
        let changed = progress.update(payload);
        if let Some(last_update) = payload.last_update {
            progress.last_update = last_update;
        }
        changed
    }

    pub fn remove_media_progress(&mut self, progress_id: &str) -> bool {
        let before = self.media_progress.len();
        self.media_progress.retain(|mp| mp.id != progress_id);
        self.media_progress.len() != before
    }

    pub fn remove_progress_from_continue_listening(&mut self, progress_id: &str) -> bool {
        self.media_progress
            .iter_mut()
            .find(|mp| mp.id == progress_id)
            .is_some_and(MediaProgress::remove_from_continue_listening)
    }

    /// Number of episodes of a podcast item not yet finished.
    pub fn incomplete_episode_count(&self, item: &LibraryItem) -> usize {
        item.media
            .episodes
            .iter()
            .filter(|ep| {
                !self
                    .media_progress(&item.id, Some(ep.id.as_str()))
                    .is_some_and(|mp| mp.is_finished)
            })
            .count()
    }

    pub fn hidden_series(&self) -> &[String] {
        &self.series_hide_from_continue_listening
    }

    pub fn is_series_hidden_from_continue_listening(&self, series_id: &str) -> bool {
        self.series_hide_from_continue_listening.iter().any(|s| s == series_id)
    }

    pub fn hide_series_from_continue_listening(&mut self, series_id: &str) -> bool {
        if self.is_series_hidden_from_continue_listening(series_id) {
            return false;
        }
        self.series_hide_from_continue_listening.push(series_id.to_string());
        true
    }

    pub fn unhide_series_from_continue_listening(&mut self, series_id: &str) -> bool {
        if !self.is_series_hidden_from_continue_listening(series_id) {
            return false;
        }
        self.series_hide_from_continue_listening.retain(|s| s != series_id);
        true
    }
}
