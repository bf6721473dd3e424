//! User accounts: identity, permissions and per-user listening state.
//!
//! A [`UserAccount`] is the canonical persisted shape (its `Serialize` impl is
//! the full document, password hash included). Browser and public
//! projections live in [`views`]. Accounts read back from storage must go
//! through [`normalize_loaded_account`](crate::migrations::normalize_loaded_account).

mod access;
mod bookmarks;
mod permissions;
mod progress;
mod update;
pub mod views;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use bookmarks::AudioBookmark;
pub use permissions::{Permissions, PermissionsUpdate, TagAccessMode};
pub use progress::{MediaProgress, MediaProgressUpdate};
pub use update::UserAccountUpdate;

// ---------------------------------------------------------------------------
// Account type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// The single bootstrap account created on first start.
    Root,
    Admin,
    #[default]
    User,
    Guest,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Admin => "admin",
            Self::User => "user",
            Self::Guest => "guest",
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// One login identity.
///
/// Collections and permissions are private so the access invariants (an
/// account with `accessAllLibraries` has no explicit library list, and so on)
/// can only be changed through [`UserAccount::apply_update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    id: String,
    /// Id used before the account store migration; old access tokens still
    /// reference it.
    #[serde(default)]
    pub old_user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    media_progress: Vec<MediaProgress>,
    #[serde(default)]
    series_hide_from_continue_listening: Vec<String>,
    #[serde(default)]
    bookmarks: Vec<AudioBookmark>,
    pub is_active: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    permissions: Permissions,
    #[serde(default)]
    libraries_accessible: Vec<String>,
    #[serde(default)]
    item_tags_selected: Vec<String>,
}

impl UserAccount {
    /// Create an account with the default permissions for its type.
    pub fn new(id: impl Into<String>, username: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id: id.into(),
            old_user_id: None,
            username: Some(username.into()),
            password_hash: None,
            account_type,
            token: None,
            media_progress: Vec::new(),
            series_hide_from_continue_listening: Vec::new(),
            bookmarks: Vec::new(),
            is_active: true,
            is_locked: false,
            last_seen: None,
            created_at: Utc::now(),
            permissions: Permissions::defaults_for(account_type),
            libraries_accessible: Vec::new(),
            item_tags_selected: Vec::new(),
        }
    }

    /// Create the bootstrap root account.
    pub fn new_root(username: impl Into<String>, password_hash: Option<String>) -> Self {
        let mut account = Self::new("root", username, AccountType::Root);
        account.password_hash = password_hash;
        account
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Library ids this account may see; empty means all of them.
    pub fn libraries_accessible(&self) -> &[String] {
        &self.libraries_accessible
    }

    pub fn item_tags_selected(&self) -> &[String] {
        &self.item_tags_selected
    }

    pub fn tag_access_mode(&self) -> TagAccessMode {
        self.permissions.tag_access_mode()
    }

    pub fn is_root(&self) -> bool {
        self.account_type == AccountType::Root
    }

    pub fn is_admin(&self) -> bool {
        self.account_type == AccountType::Admin
    }

    pub fn is_guest(&self) -> bool {
        self.account_type == AccountType::Guest
    }

    pub fn is_admin_or_up(&self) -> bool {
        self.is_admin() || self.is_root()
    }

    pub fn can_delete(&self) -> bool {
        self.permissions.delete && self.is_active
    }

    pub fn can_update(&self) -> bool {
        self.permissions.update && self.is_active
    }

    pub fn can_download(&self) -> bool {
        self.permissions.download && self.is_active
    }

    pub fn can_upload(&self) -> bool {
        self.permissions.upload && self.is_active
    }

    pub fn can_access_explicit_content(&self) -> bool {
        self.permissions.access_explicit_content && self.is_active
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}
