use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::models::{SyncKey, UserToken};

/// Server-side storage: one row per `(user, key)` holding the JSON value, plus
/// the bearer tokens that identify users.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_data (
                    user_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, key)
                );

                CREATE TABLE IF NOT EXISTS user_tokens (
                    token TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_user_tokens_user ON user_tokens(user_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Synced values ---

    pub fn get_value(&self, user_id: &str, key: SyncKey) -> Result<Option<serde_json::Value>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM user_data WHERE user_id = ?1 AND key = ?2")?;
        let mut rows = stmt.query(params![user_id, key.as_str()])?;
        if let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("Stored {key} for {user_id} is not valid JSON"))?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    pub fn put_value(&self, user_id: &str, key: SyncKey, value: &serde_json::Value) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let raw = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO user_data (user_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![user_id, key.as_str(), raw, now],
        )?;
        Ok(())
    }

    // --- Tokens ---

    pub fn insert_token(&self, token: &str, user_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, now],
        )?;
        Ok(())
    }

    pub fn user_for_token(&self, token: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM user_tokens WHERE token = ?1")?;
        let mut rows = stmt.query(params![token])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_tokens(&self) -> Result<Vec<UserToken>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, token, created_at FROM user_tokens ORDER BY user_id, created_at",
        )?;
        let tokens = stmt
            .query_map([], |row| {
                let token: String = row.get(1)?;
                let hint = token
                    .get(token.len().saturating_sub(4)..)
                    .unwrap_or_default()
                    .to_string();
                Ok(UserToken {
                    user_id: row.get(0)?,
                    token_hint: hint,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    pub fn revoke_tokens(&self, user_id: &str) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM user_tokens WHERE user_id = ?1", params![user_id])?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_and_get_value() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_value("u1", SyncKey::Meals).unwrap().is_none());

        db.put_value("u1", SyncKey::Meals, &json!([])).unwrap();
        assert_eq!(db.get_value("u1", SyncKey::Meals).unwrap(), Some(json!([])));
        assert!(db.get_value("u2", SyncKey::Meals).unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites_whole_value() {
        let db = Database::open_in_memory().unwrap();
        db.put_value(
            "u1",
            SyncKey::Settings,
            &json!({ "nickname": "a", "dailyCalorieGoal": 1800, "streakGoal": 5 }),
        )
        .unwrap();
        db.put_value(
            "u1",
            SyncKey::Settings,
            &json!({ "dailyCalorieGoal": 2000, "streakGoal": 7 }),
        )
        .unwrap();

        let stored = db.get_value("u1", SyncKey::Settings).unwrap().unwrap();
        assert!(stored.get("nickname").is_none());
        assert_eq!(stored["dailyCalorieGoal"], 2000);
    }

    #[test]
    fn test_tokens() {
        let db = Database::open_in_memory().unwrap();
        db.insert_token("tok-aaaa1111", "alice").unwrap();
        db.insert_token("tok-bbbb2222", "bob").unwrap();

        assert_eq!(
            db.user_for_token("tok-aaaa1111").unwrap().as_deref(),
            Some("alice")
        );
        assert!(db.user_for_token("nope").unwrap().is_none());

        let listed = db.list_tokens().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].user_id, "alice");
        assert_eq!(listed[0].token_hint, "1111");

        assert_eq!(db.revoke_tokens("alice").unwrap(), 1);
        assert!(db.user_for_token("tok-aaaa1111").unwrap().is_none());
        assert_eq!(db.revoke_tokens("alice").unwrap(), 0);
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_token("same", "alice").unwrap();
        assert!(db.insert_token("same", "bob").is_err());
    }
}
