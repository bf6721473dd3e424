use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::UserAccount;
use crate::error::{Result, StoreError};

/// A named position inside a library item. Unique per (item, time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioBookmark {
    pub library_item_id: String,
    #[serde(default)]
    pub title: String,
    /// Seconds from the start of the item.
    pub time: f64,
    #[serde(default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl AudioBookmark {
    pub fn new(library_item_id: impl Into<String>, time: f64, title: impl Into<String>) -> Self {
        Self {
            library_item_id: library_item_id.into(),
            title: title.into(),
            time,
            created_at: Utc::now(),
        }
    }

    fn is_at(&self, library_item_id: &str, time: f64) -> bool {
        self.library_item_id == library_item_id && self.time == time
    }
}

impl UserAccount {
    pub fn bookmarks(&self) -> &[AudioBookmark] {
        &self.bookmarks
    }

    pub fn find_bookmark(&self, library_item_id: &str, time: f64) -> Option<&AudioBookmark> {
        self.bookmarks.iter().find(|bm| bm.is_at(library_item_id, time))
    }

    /// Create a bookmark, or retitle the one already at this exact position.
    pub fn upsert_bookmark(&mut self, library_item_id: &str, time: f64, title: &str) -> &AudioBookmark {
        match self.bookmarks.iter().position(|bm| bm.is_at(library_item_id, time)) {
            Some(index) => {
                warn!(library_item_id, time, "bookmark already exists at this time, renaming");
                let bookmark = &mut self.bookmarks[index];
                bookmark.title = title.to_string();
                &*bookmark
            }
            None => {
                self.bookmarks.push(AudioBookmark::new(library_item_id, time, title));
                &self.bookmarks[self.bookmarks.len() - 1]
            }
        }
    }

    /// Retitle an existing bookmark. Fails with [`StoreError::NotFound`] when
    /// nothing sits at exactly (item, time).
    pub fn update_bookmark(&mut self, library_item_id: &str, time: f64, title: &str) -> Result<&AudioBookmark> {
        let Some(bookmark) = self.bookmarks.iter_mut().find(|bm| bm.is_at(library_item_id, time)) else {
            tracing::error!(library_item_id, time, "bookmark to update not found");
            return Err(StoreError::NotFound);
        };
        bookmark.title = title.to_string();
        Ok(&*bookmark)
    }

    pub fn remove_bookmark(&mut self, library_item_id: &str, time: f64) {
        self.bookmarks.retain(|bm| !bm.is_at(library_item_id, time));
    }
}

#[cfg(test)]
mod tests {
    use crate::account::{AccountType, UserAccount};
    use crate::error::StoreError;

    #[test]
    fn test_upsert_same_position_renames() {
        let mut account = UserAccount::new("u1", "alice", AccountType::User);
        account.upsert_bookmark("item1", 120.0, "Chapter 2");
        let bm = account.upsert_bookmark("item1", 120.0, "Ch. 2 renamed");
        assert_eq!(bm.title, "Ch. 2 renamed");

        let at_position: Vec<_> = account
            .bookmarks()
            .iter()
            .filter(|b| b.library_item_id == "item1" && b.time == 120.0)
            .collect();
        assert_eq!(at_position.len(), 1);
        assert_eq!(at_position[0].title, "Ch. 2 renamed");
    }

    #[test]
    fn test_distinct_positions_are_separate() {
        let mut account = UserAccount::new("u1", "alice", AccountType::User);
        account.upsert_bookmark("item1", 120.0, "a");
        account.upsert_bookmark("item1", 121.0, "b");
        account.upsert_bookmark("item2", 120.0, "c");
        assert_eq!(account.bookmarks().len(), 3);
    }

    #[test]
    fn test_update_missing_bookmark() {
        let mut account = UserAccount::new("u1", "alice", AccountType::User);
        account.upsert_bookmark("item1", 120.0, "a");

        let err = account.update_bookmark("item1", 60.0, "b").unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert_eq!(account.find_bookmark("item1", 120.0).unwrap().title, "a");

        let bm = account.update_bookmark("item1", 120.0, "b").unwrap();
        assert_eq!(bm.title, "b");
    }

    #[test]
    fn test_remove_bookmark_is_silent() {
        let mut account = UserAccount::new("u1", "alice", AccountType::User);
        account.upsert_bookmark("item1", 120.0, "a");

        account.remove_bookmark("item1", 999.0);
        assert_eq!(account.bookmarks().len(), 1);
        account.remove_bookmark("item1", 120.0);
        assert!(account.bookmarks().is_empty());
    }
}
