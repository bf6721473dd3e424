use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::account::UserAccount;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::migrations::normalize_loaded_account;

fn decode(document: String) -> Result<UserAccount> {
    normalize_loaded_account(serde_json::from_str(&document)?)
}

impl Database {
    /// Insert or replace the full persisted document for `account`.
    pub fn upsert_user(&self, account: &UserAccount) -> Result<()> {
        let document = serde_json::to_string(account)?;
        self.conn().execute(
            "INSERT INTO users (id, username, token, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                token = excluded.token,
                document = excluded.document,
                updated_at = excluded.updated_at",
            params![
                account.id(),
                account.username,
                account.token,
                document,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tracing::debug!(id = account.id(), "stored user account");
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<UserAccount> {
        let document: String = self
            .conn()
            .query_row(
                "SELECT document FROM users WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        decode(document)
    }

    /// Case-insensitive lookup by login name.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        let document: Option<String> = self
            .conn()
            .query_row(
                "SELECT document FROM users WHERE lower(username) = lower(?1) LIMIT 1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        document.map(decode).transpose()
    }

    pub fn get_user_by_token(&self, token: &str) -> Result<Option<UserAccount>> {
        if token.is_empty() {
            return Ok(None);
        }
        let document: Option<String> = self
            .conn()
            .query_row(
                "SELECT document FROM users WHERE token = ?1 LIMIT 1",
                params![token],
                |row| row.get(0),
            )
            .optional()?;
        document.map(decode).transpose()
    }

    /// All accounts, oldest first. Documents that fail to decode are skipped
    /// with a warning so one bad row can't lock everyone out.
    pub fn list_users(&self) -> Result<Vec<UserAccount>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, document FROM users ORDER BY rowid ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut users = Vec::new();
        for row in rows {
            let (id, document) = row?;
            match decode(document) {
                Ok(account) => users.push(account),
                Err(e) => tracing::warn!(id = %id, error = %e, "skipping unreadable user document"),
            }
        }
        Ok(users)
    }

    pub fn count_users(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn delete_user(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}
