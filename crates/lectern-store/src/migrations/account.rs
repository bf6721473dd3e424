//! Upgrade of stored account documents.
//!
//! Account JSON has grown new fields over time and some keys were renamed.
//! Rather than scatter defaults through the deserializer, every historical
//! rule is listed here once, in release order, and applied to the raw
//! document before it is decoded into a [`UserAccount`].

use chrono::Utc;
use serde_json::{Map, Value};

use crate::account::{AccountType, Permissions, UserAccount};
use crate::error::{Result, StoreError};

type Document = Map<String, Value>;

/// JavaScript-style truthiness, which is how old documents encoded flags.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn is_missing(doc: &Document, key: &str) -> bool {
    matches!(doc.get(key), None | Some(Value::Null))
}

/// Decode a stored account document, upgrading older shapes on the way.
///
/// Fails only when the document is not an object or is missing its id;
/// every other gap is filled with the default the field had when it was
/// introduced.
pub fn normalize_loaded_account(raw: Value) -> Result<UserAccount> {
    let Value::Object(mut doc) = raw else {
        return Err(StoreError::Migration("account document is not an object".into()));
    };
    if !matches!(doc.get("id"), Some(Value::String(id)) if !id.is_empty()) {
        return Err(StoreError::Migration("account document has no id".into()));
    }

    rename_password_hash(&mut doc);
    let account_type = normalize_account_type(&mut doc);
    normalize_status(&mut doc, account_type);
    normalize_created_at(&mut doc);
    normalize_permissions(&mut doc, account_type);
    migrate_item_tags_accessible(&mut doc);
    drop_orphan_records(&mut doc);

    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// The password hash used to be stored under `pash`.
fn rename_password_hash(doc: &mut Document) {
    if let Some(pash) = doc.remove("pash") {
        if is_missing(doc, "passwordHash") {
            doc.insert("passwordHash".into(), pash);
        }
    }
}

fn normalize_account_type(doc: &mut Document) -> AccountType {
    let account_type = doc
        .get("type")
        .cloned()
        .and_then(|t| serde_json::from_value::<AccountType>(t).ok())
        .unwrap_or_default();
    doc.insert("type".into(), Value::String(account_type.as_str().into()));
    account_type
}

/// Accounts predating the active flag are active. Root can never be
/// deactivated or locked.
fn normalize_status(doc: &mut Document, account_type: AccountType) {
    let is_root = account_type == AccountType::Root;
    let is_active = is_root || doc.get("isActive").is_none() || truthy(doc.get("isActive"));
    let is_locked = !is_root && truthy(doc.get("isLocked"));
    doc.insert("isActive".into(), Value::Bool(is_active));
    doc.insert("isLocked".into(), Value::Bool(is_locked));
}

fn normalize_created_at(doc: &mut Document) {
    if is_missing(doc, "createdAt") {
        doc.insert("createdAt".into(), Value::from(Utc::now().timestamp_millis()));
    }
}

fn normalize_permissions(doc: &mut Document, account_type: AccountType) {
    let mut permissions = match doc.remove("permissions") {
        Some(Value::Object(p)) => p,
        _ => match serde_json::to_value(Permissions::defaults_for(account_type)) {
            Ok(Value::Object(p)) => p,
            _ => Map::new(),
        },
    };

    // Upload permission was added after root accounts already existed.
    if account_type == AccountType::Root && !truthy(permissions.get("upload")) {
        permissions.insert("upload".into(), Value::Bool(true));
    }
    // Library restrictions, then tag restrictions, then the explicit content
    // gate were each introduced defaulting to unrestricted.
    for key in ["accessAllLibraries", "accessAllTags", "accessExplicitContent"] {
        if permissions.get(key).is_none() {
            permissions.insert(key.into(), Value::Bool(true));
        }
    }
    for value in permissions.values_mut() {
        if !value.is_boolean() {
            let flag = truthy(Some(&*value));
            *value = Value::Bool(flag);
        }
    }

    doc.insert("permissions".into(), Value::Object(permissions));
}

/// `itemTagsAccessible` (always an allow-list) was renamed to
/// `itemTagsSelected` when deny-lists were introduced.
fn migrate_item_tags_accessible(doc: &mut Document) {
    let Some(legacy) = doc.remove("itemTagsAccessible") else {
        return;
    };
    if !matches!(&legacy, Value::Array(tags) if !tags.is_empty()) {
        return;
    }
    if let Some(Value::Object(permissions)) = doc.get_mut("permissions") {
        permissions.insert("selectedTagsNotAccessible".into(), Value::Bool(false));
    }
    doc.insert("itemTagsSelected".into(), legacy);
}

fn non_empty_string(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if !s.is_empty())
}

/// Epoch milliseconds, accepting the float form some clients wrote.
fn timestamp_ms(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn coerce_number(record: &mut Document, key: &str) {
    if !record.get(key).is_some_and(Value::is_number) {
        record.insert(key.into(), Value::from(0.0));
    }
}

fn coerce_flag(record: &mut Document, key: &str) {
    let flag = truthy(record.get(key));
    record.insert(key.into(), Value::Bool(flag));
}

fn coerce_string(record: &mut Document, key: &str) {
    if !record.get(key).is_some_and(Value::is_string) {
        record.insert(key.into(), Value::String(String::new()));
    }
}

fn coerce_optional(record: &mut Document, key: &str, keep: fn(&Value) -> bool) {
    if record.get(key).is_some_and(|v| !keep(v)) {
        record.insert(key.into(), Value::Null);
    }
}

fn coerce_timestamp(record: &mut Document, key: &str, now: i64) {
    let ms = timestamp_ms(record.get(key)).unwrap_or(now);
    record.insert(key.into(), Value::from(ms));
}

fn coerce_optional_timestamp(record: &mut Document, key: &str) {
    let ms = timestamp_ms(record.get(key)).map(Value::from).unwrap_or(Value::Null);
    record.insert(key.into(), ms);
}

/// Progress records need an id and an item id; anything else missing or
/// null gets the value a fresh record would have.
fn normalize_progress_record(record: &mut Document, now: i64) -> bool {
    if !non_empty_string(record.get("id")) || !non_empty_string(record.get("libraryItemId")) {
        return false;
    }
    coerce_string(record, "userId");
    coerce_optional(record, "episodeId", Value::is_string);
    for key in ["duration", "progress", "currentTime"] {
        coerce_number(record, key);
    }
    for key in ["isFinished", "hideFromContinueListening"] {
        coerce_flag(record, key);
    }
    coerce_optional(record, "ebookLocation", Value::is_string);
    coerce_optional(record, "ebookProgress", Value::is_number);
    coerce_timestamp(record, "lastUpdate", now);
    coerce_timestamp(record, "startedAt", now);
    coerce_optional_timestamp(record, "finishedAt");
    true
}

/// Bookmarks need an item id and a numeric time.
fn normalize_bookmark_record(record: &mut Document, now: i64) -> bool {
    if !record.get("libraryItemId").is_some_and(Value::is_string) || !record.get("time").is_some_and(Value::is_number) {
        return false;
    }
    coerce_string(record, "title");
    coerce_timestamp(record, "createdAt", now);
    true
}

fn normalize_records(doc: &mut Document, key: &str, now: i64, normalize: fn(&mut Document, i64) -> bool) {
    if let Some(Value::Array(records)) = doc.get_mut(key) {
        records.retain_mut(|record| match record {
            Value::Object(record) => normalize(record, now),
            _ => false,
        });
    }
}

/// Unusable progress and bookmark leftovers from early releases are
/// dropped; the rest are filled in field by field.
fn drop_orphan_records(doc: &mut Document) {
    let now = Utc::now().timestamp_millis();
    normalize_records(doc, "mediaProgress", now, normalize_progress_record);
    normalize_records(doc, "bookmarks", now, normalize_bookmark_record);
    for key in ["mediaProgress", "bookmarks", "seriesHideFromContinueListening", "librariesAccessible", "itemTagsSelected"] {
        if !doc.get(key).is_some_and(Value::is_array) {
            doc.insert(key.into(), Value::Array(Vec::new()));
        }
    }
}
