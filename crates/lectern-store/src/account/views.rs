//! Outward-facing projections of a [`UserAccount`].
//!
//! The full persisted document is `UserAccount`'s own `Serialize` impl. The
//! views here never carry the password hash.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AccountType, AudioBookmark, MediaProgress, Permissions, UserAccount};
use crate::models::{PlaybackSession, PlaybackSessionSummary};

/// Account as sent to the web client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountForBrowser<'a> {
    pub id: &'a str,
    pub old_user_id: Option<&'a str>,
    pub username: Option<&'a str>,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_progress: Option<&'a [MediaProgress]>,
    pub series_hide_from_continue_listening: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<&'a [AudioBookmark]>,
    pub is_active: bool,
    pub is_locked: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub permissions: Permissions,
    pub libraries_accessible: &'a [String],
    pub item_tags_selected: &'a [String],
}

/// Account as listed to other users.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountPublic<'a> {
    pub id: &'a str,
    pub old_user_id: Option<&'a str>,
    pub username: Option<&'a str>,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub session: Option<PlaybackSessionSummary>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// Browser projection.
    ///
    /// With `hide_root_token` the root account's token is blanked; with
    /// `minimal` progress and bookmarks are left out entirely.
    pub fn to_browser_json(&self, hide_root_token: bool, minimal: bool) -> UserAccountForBrowser<'_> {
        let token = if self.is_root() && hide_root_token {
            Some("")
        } else {
            self.token.as_deref()
        };

        UserAccountForBrowser {
            id: &self.id,
            old_user_id: self.old_user_id.as_deref(),
            username: self.username.as_deref(),
            account_type: self.account_type,
            token,
            media_progress: (!minimal).then_some(self.media_progress.as_slice()),
            series_hide_from_continue_listening: &self.series_hide_from_continue_listening,
            bookmarks: (!minimal).then_some(self.bookmarks.as_slice()),
            is_active: self.is_active,
            is_locked: self.is_locked,
            last_seen: self.last_seen,
            created_at: self.created_at,
            permissions: self.permissions,
            libraries_accessible: &self.libraries_accessible,
            item_tags_selected: &self.item_tags_selected,
        }
    }

    /// Public projection, with the first open session belonging to this
    /// account (if any).
    pub fn to_public_json(&self, sessions: &[PlaybackSession]) -> UserAccountPublic<'_> {
        let session = sessions
            .iter()
            .find(|s| s.user_id == self.id)
            .map(PlaybackSession::to_client_summary);

        UserAccountPublic {
            id: &self.id,
            old_user_id: self.old_user_id.as_deref(),
            username: self.username.as_deref(),
            account_type: self.account_type,
            session,
            last_seen: self.last_seen,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn root_with_state() -> UserAccount {
        let mut root = UserAccount::new_root("root", Some("secret-hash".into()));
        root.token = Some("root-token".into());
        root.upsert_bookmark("li1", 10.0, "intro");
        root
    }

    #[test]
    fn test_full_form_includes_password_hash() {
        let json = serde_json::to_value(root_with_state()).unwrap();
        assert_eq!(json["passwordHash"], "secret-hash");
        assert_eq!(json["type"], "root");
        assert!(json["createdAt"].is_i64());
    }

    #[test]
    fn test_browser_form_hides_secrets() {
        let root = root_with_state();
        let json = serde_json::to_value(root.to_browser_json(true, false)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["token"], "");
        assert_eq!(json["bookmarks"].as_array().unwrap().len(), 1);

        let json = serde_json::to_value(root.to_browser_json(false, false)).unwrap();
        assert_eq!(json["token"], "root-token");
    }

    #[test]
    fn test_browser_form_keeps_non_root_token() {
        let mut user = UserAccount::new("u1", "alice", AccountType::User);
        user.token = Some("user-token".into());
        let json = serde_json::to_value(user.to_browser_json(true, false)).unwrap();
        assert_eq!(json["token"], "user-token");
    }

    #[test]
    fn test_minimal_browser_form() {
        let json = serde_json::to_value(root_with_state().to_browser_json(false, true)).unwrap();
        assert!(json.get("mediaProgress").is_none());
        assert!(json.get("bookmarks").is_none());
        assert!(json.get("seriesHideFromContinueListening").is_some());
    }

    #[test]
    fn test_public_form_picks_own_session() {
        let user = UserAccount::new("u1", "alice", AccountType::User);
        let session = |id: &str, user_id: &str| PlaybackSession {
            id: id.into(),
            user_id: user_id.into(),
            library_item_id: "li1".into(),
            episode_id: None,
            display_title: "Book".into(),
            current_time: 42.0,
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(user.to_public_json(&[])).unwrap();
        assert_eq!(json["session"], Value::Null);

        let sessions = [session("s1", "other"), session("s2", "u1"), session("s3", "u1")];
        let json = serde_json::to_value(user.to_public_json(&sessions)).unwrap();
        assert_eq!(json["session"]["id"], "s2");
        assert_eq!(json["username"], "alice");
        assert!(json.get("permissions").is_none());
    }
}
