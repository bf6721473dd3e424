use super::{TagAccessMode, UserAccount};
use crate::models::LibraryItem;

impl UserAccount {
    pub fn can_access_library(&self, library_id: &str) -> bool {
        self.permissions.access_all_libraries
            || self.libraries_accessible.iter().any(|id| id == library_id)
    }

    /// Tag rule for an item carrying `item_tags`.
    ///
    /// In allow-list mode an untagged item is hidden; in deny-list mode it is
    /// visible.
    pub fn can_access_item_by_tags<S: AsRef<str>>(&self, item_tags: &[S]) -> bool {
        let selected = |tag: &S| self.item_tags_selected.iter().any(|t| t == tag.as_ref());
        match self.tag_access_mode() {
            TagAccessMode::All => true,
            TagAccessMode::DenyList => !item_tags.iter().any(selected),
            TagAccessMode::AllowList => item_tags.iter().any(selected),
        }
    }

    pub fn can_access_library_item(&self, item: &LibraryItem) -> bool {
        if !self.can_access_library(&item.library_id) {
            return false;
        }
        if item.media.explicit && !self.can_access_explicit_content() {
            return false;
        }
        self.can_access_item_by_tags(&item.media.tags)
    }

    /// First library in `ordered_library_ids` (already in display order) the
    /// account may open.
    pub fn default_library_id<'a, S: AsRef<str>>(&self, ordered_library_ids: &'a [S]) -> Option<&'a str> {
        ordered_library_ids
            .iter()
            .map(|id| id.as_ref())
            .find(|id| self.can_access_library(id))
    }
}

#[cfg(test)]
mod tests {
    use crate::account::{AccountType, PermissionsUpdate, UserAccount, UserAccountUpdate};
    use crate::models::{LibraryItem, Media};

    fn restricted_tags(tags: &[&str], deny: bool) -> UserAccount {
        let mut account = UserAccount::new("u1", "alice", AccountType::User);
        account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_tags: Some(false),
                selected_tags_not_accessible: Some(deny),
                ..Default::default()
            }),
            item_tags_selected: Some(tags.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        });
        account
    }

    fn item(library_id: &str, tags: &[&str], explicit: bool) -> LibraryItem {
        LibraryItem {
            id: "li1".into(),
            library_id: library_id.into(),
            media: Media {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                explicit,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_allow_list_tags() {
        let account = restricted_tags(&["kids"], false);
        assert!(account.can_access_item_by_tags(&["kids", "fantasy"]));
        assert!(!account.can_access_item_by_tags::<&str>(&[]));
        assert!(!account.can_access_item_by_tags(&["fantasy"]));
    }

    #[test]
    fn test_deny_list_tags() {
        let account = restricted_tags(&["explicit"], true);
        assert!(!account.can_access_item_by_tags(&["explicit"]));
        assert!(account.can_access_item_by_tags(&["kids"]));
        assert!(account.can_access_item_by_tags::<&str>(&[]));
    }

    #[test]
    fn test_all_tags_ignores_selection() {
        let account = UserAccount::new("u1", "alice", AccountType::User);
        assert!(account.can_access_item_by_tags::<&str>(&[]));
        assert!(account.can_access_item_by_tags(&["anything"]));
    }

    #[test]
    fn test_library_restriction() {
        let mut account = UserAccount::new("u1", "alice", AccountType::User);
        account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_libraries: Some(false),
                ..Default::default()
            }),
            libraries_accessible: Some(vec!["lib2".into()]),
            ..Default::default()
        });

        assert!(!account.can_access_library("lib1"));
        assert!(account.can_access_library("lib2"));
        assert_eq!(account.default_library_id(&["lib1", "lib2", "lib3"]), Some("lib2"));
        assert_eq!(account.default_library_id(&["lib1"]), None);
    }

    #[test]
    fn test_access_all_libraries_is_monotone() {
        let mut account = UserAccount::new("u1", "alice", AccountType::User);
        account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_libraries: Some(false),
                ..Default::default()
            }),
            libraries_accessible: Some(vec!["lib2".into()]),
            ..Default::default()
        });
        assert!(!account.can_access_library("lib9"));

        let changed = account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_libraries: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(changed);
        assert!(account.can_access_library("lib9"));
        assert!(account.can_access_library("lib2"));
        assert!(account.libraries_accessible().is_empty());
    }

    #[test]
    fn test_explicit_content_gate() {
        let mut account = UserAccount::new("u1", "alice", AccountType::User);
        assert!(account.can_access_library_item(&item("lib1", &[], true)));

        account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_explicit_content: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(!account.can_access_library_item(&item("lib1", &[], true)));
        assert!(account.can_access_library_item(&item("lib1", &[], false)));
    }

    #[test]
    fn test_library_item_combines_rules() {
        let mut account = restricted_tags(&["kids"], false);
        account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_libraries: Some(false),
                ..Default::default()
            }),
            libraries_accessible: Some(vec!["lib1".into()]),
            ..Default::default()
        });

        assert!(account.can_access_library_item(&item("lib1", &["kids"], false)));
        assert!(!account.can_access_library_item(&item("lib2", &["kids"], false)));
        assert!(!account.can_access_library_item(&item("lib1", &["horror"], false)));
    }
}
