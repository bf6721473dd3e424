use serde::{Deserialize, Serialize};

use super::AccountType;

/// Permission flags attached to an account.
///
/// A plain value record: every account owns its own copy, and updates build a
/// new record via [`Permissions::with_update`] instead of editing a shared map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    pub download: bool,
    pub update: bool,
    pub delete: bool,
    pub upload: bool,
    pub access_all_libraries: bool,
    pub access_all_tags: bool,
    pub access_explicit_content: bool,
    /// When set, `itemTagsSelected` is a deny-list instead of an allow-list.
    pub selected_tags_not_accessible: bool,
}

/// How an account's selected tags are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAccessMode {
    /// Every item is visible regardless of tags.
    All,
    /// Only items carrying at least one selected tag are visible.
    AllowList,
    /// Items carrying any selected tag are hidden.
    DenyList,
}

impl Permissions {
    /// Defaults for a freshly created account of the given type.
    pub fn defaults_for(account_type: AccountType) -> Self {
        Self {
            download: true,
            update: true,
            delete: account_type == AccountType::Root,
            upload: matches!(account_type, AccountType::Root | AccountType::Admin),
            access_all_libraries: true,
            access_all_tags: true,
            access_explicit_content: true,
            selected_tags_not_accessible: false,
        }
    }

    pub fn tag_access_mode(&self) -> TagAccessMode {
        if self.access_all_tags {
            TagAccessMode::All
        } else if self.selected_tags_not_accessible {
            TagAccessMode::DenyList
        } else {
            TagAccessMode::AllowList
        }
    }

    /// Return a copy with every flag present in `update` applied.
    pub fn with_update(self, update: &PermissionsUpdate) -> Self {
        Self {
            download: update.download.unwrap_or(self.download),
            update: update.update.unwrap_or(self.update),
            delete: update.delete.unwrap_or(self.delete),
            upload: update.upload.unwrap_or(self.upload),
            access_all_libraries: update
                .access_all_libraries
                .unwrap_or(self.access_all_libraries),
            access_all_tags: update.access_all_tags.unwrap_or(self.access_all_tags),
            access_explicit_content: update
                .access_explicit_content
                .unwrap_or(self.access_explicit_content),
            selected_tags_not_accessible: update
                .selected_tags_not_accessible
                .unwrap_or(self.selected_tags_not_accessible),
        }
    }
}

/// Partial permission update; absent keys are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsUpdate {
    pub download: Option<bool>,
    pub update: Option<bool>,
    pub delete: Option<bool>,
    pub upload: Option<bool>,
    pub access_all_libraries: Option<bool>,
    pub access_all_tags: Option<bool>,
    pub access_explicit_content: Option<bool>,
    pub selected_tags_not_accessible: Option<bool>,
}
