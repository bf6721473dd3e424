use serde::Deserialize;

use super::{AccountType, PermissionsUpdate, UserAccount};

/// Partial account update as sent by the admin UI.
///
/// Every field is optional; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountUpdate {
    #[serde(alias = "pash")]
    pub password_hash: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<AccountType>,
    pub username: Option<String>,
    pub is_active: Option<bool>,
    pub series_hide_from_continue_listening: Option<Vec<String>>,
    pub permissions: Option<PermissionsUpdate>,
    pub libraries_accessible: Option<Vec<String>>,
    pub item_tags_selected: Option<Vec<String>>,
}

/// Replace `slot` with a non-empty `value` if it differs.
fn set_non_empty(slot: &mut Option<String>, value: Option<&str>) -> bool {
    match value {
        Some(v) if !v.is_empty() && slot.as_deref() != Some(v) => {
            *slot = Some(v.to_string());
            true
        }
        _ => false,
    }
}

impl UserAccount {
    /// Apply a partial update and report whether anything actually changed.
    ///
    /// Username and password hash can never be cleared through an update.
    /// After permissions are applied the library and tag selections are
    /// reconciled so that "access all" always implies an empty selection.
    pub fn apply_update(&mut self, payload: &UserAccountUpdate) -> bool {
        let mut changed = false;

        changed |= set_non_empty(&mut self.password_hash, payload.password_hash.as_deref());
        if let Some(account_type) = payload.account_type {
            if account_type != self.account_type {
                self.account_type = account_type;
                changed = true;
            }
        }
        changed |= set_non_empty(&mut self.username, payload.username.as_deref());
        if let Some(is_active) = payload.is_active {
            if is_active != self.is_active {
                self.is_active = is_active;
                changed = true;
            }
        }

        if let Some(series) = &payload.series_hide_from_continue_listening {
            if *series != self.series_hide_from_continue_listening {
                self.series_hide_from_continue_listening = series.clone();
                changed = true;
            }
        }

        if let Some(update) = &payload.permissions {
            let next = self.permissions.with_update(update);
            if next != self.permissions {
                self.permissions = next;
                changed = true;
            }
        }

        changed |= self.reconcile_libraries(payload.libraries_accessible.as_deref());
        changed |= self.reconcile_tags(payload.item_tags_selected.as_deref());

        changed
    }

    fn reconcile_libraries(&mut self, requested: Option<&[String]>) -> bool {
        if self.permissions.access_all_libraries {
            if self.libraries_accessible.is_empty() {
                return false;
            }
            self.libraries_accessible.clear();
            return true;
        }
        match requested {
            Some(ids) if ids != self.libraries_accessible.as_slice() => {
                self.libraries_accessible = ids.to_vec();
                true
            }
            _ => false,
        }
    }

    fn reconcile_tags(&mut self, requested: Option<&[String]>) -> bool {
        if self.permissions.access_all_tags {
            if self.item_tags_selected.is_empty() && !self.permissions.selected_tags_not_accessible {
                return false;
            }
            self.item_tags_selected.clear();
            self.permissions.selected_tags_not_accessible = false;
            return true;
        }
        match requested {
            Some([]) if !self.item_tags_selected.is_empty() => {
                self.item_tags_selected.clear();
                self.permissions.selected_tags_not_accessible = false;
                true
            }
            Some(tags) if !tags.is_empty() && tags != self.item_tags_selected.as_slice() => {
                self.item_tags_selected = tags.to_vec();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserAccount {
        UserAccount::new("u1", "alice", AccountType::User)
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut account = user();
        let before = account.clone();
        assert!(!account.apply_update(&UserAccountUpdate::default()));
        assert_eq!(account, before);
    }

    #[test]
    fn test_username_and_password_cannot_be_cleared() {
        let mut account = user();
        account.password_hash = Some("hash".into());

        let changed = account.apply_update(&UserAccountUpdate {
            username: Some(String::new()),
            password_hash: Some(String::new()),
            ..Default::default()
        });
        assert!(!changed);
        assert_eq!(account.username.as_deref(), Some("alice"));
        assert_eq!(account.password_hash.as_deref(), Some("hash"));
    }

    #[test]
    fn test_scalar_fields() {
        let mut account = user();
        let changed = account.apply_update(&UserAccountUpdate {
            username: Some("bob".into()),
            account_type: Some(AccountType::Admin),
            is_active: Some(false),
            ..Default::default()
        });
        assert!(changed);
        assert_eq!(account.username.as_deref(), Some("bob"));
        assert!(account.is_admin());
        assert!(!account.is_active);

        // Same values again: nothing to do.
        let changed = account.apply_update(&UserAccountUpdate {
            username: Some("bob".into()),
            account_type: Some(AccountType::Admin),
            is_active: Some(false),
            ..Default::default()
        });
        assert!(!changed);
    }

    #[test]
    fn test_hidden_series_order_sensitive() {
        let mut account = user();
        assert!(account.apply_update(&UserAccountUpdate {
            series_hide_from_continue_listening: Some(vec!["s1".into(), "s2".into()]),
            ..Default::default()
        }));
        assert!(account.apply_update(&UserAccountUpdate {
            series_hide_from_continue_listening: Some(vec!["s2".into(), "s1".into()]),
            ..Default::default()
        }));
        assert!(!account.apply_update(&UserAccountUpdate {
            series_hide_from_continue_listening: Some(vec!["s2".into(), "s1".into()]),
            ..Default::default()
        }));
    }

    #[test]
    fn test_libraries_ignored_while_access_all() {
        let mut account = user();
        let changed = account.apply_update(&UserAccountUpdate {
            libraries_accessible: Some(vec!["lib1".into()]),
            ..Default::default()
        });
        assert!(!changed);
        assert!(account.libraries_accessible().is_empty());
    }

    #[test]
    fn test_libraries_replaced_and_cleared() {
        let mut account = user();
        let restrict = UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_libraries: Some(false),
                ..Default::default()
            }),
            libraries_accessible: Some(vec!["lib1".into()]),
            ..Default::default()
        };
        assert!(account.apply_update(&restrict));
        assert_eq!(account.libraries_accessible(), ["lib1".to_string()]);
        assert!(!account.apply_update(&restrict));

        let clear = UserAccountUpdate {
            libraries_accessible: Some(vec![]),
            ..Default::default()
        };
        assert!(account.apply_update(&clear));
        assert!(account.libraries_accessible().is_empty());
        assert!(!account.apply_update(&clear));
    }

    #[test]
    fn test_tags_cleared_when_access_all_restored() {
        let mut account = user();
        account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_tags: Some(false),
                selected_tags_not_accessible: Some(true),
                ..Default::default()
            }),
            item_tags_selected: Some(vec!["explicit".into()]),
            ..Default::default()
        });
        assert_eq!(account.item_tags_selected(), ["explicit".to_string()]);

        let changed = account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_tags: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(changed);
        assert!(account.item_tags_selected().is_empty());
        assert!(!account.permissions().selected_tags_not_accessible);
    }

    #[test]
    fn test_empty_tag_list_resets_deny_mode() {
        let mut account = user();
        account.apply_update(&UserAccountUpdate {
            permissions: Some(PermissionsUpdate {
                access_all_tags: Some(false),
                selected_tags_not_accessible: Some(true),
                ..Default::default()
            }),
            item_tags_selected: Some(vec!["explicit".into()]),
            ..Default::default()
        });

        let changed = account.apply_update(&UserAccountUpdate {
            item_tags_selected: Some(vec![]),
            ..Default::default()
        });
        assert!(changed);
        assert!(account.item_tags_selected().is_empty());
        assert!(!account.permissions().selected_tags_not_accessible);
    }

    #[test]
    fn test_payload_accepts_legacy_keys() {
        let payload: UserAccountUpdate = serde_json::from_str(
            r#"{ "pash": "h", "type": "guest", "permissions": { "download": false } }"#,
        )
        .unwrap();
        assert_eq!(payload.password_hash.as_deref(), Some("h"));
        assert_eq!(payload.account_type, Some(AccountType::Guest));

        let mut account = user();
        assert!(account.apply_update(&payload));
        assert!(account.is_guest());
        assert!(!account.can_download());
    }
}
