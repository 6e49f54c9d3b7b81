use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::models::{Bundle, SyncKey, SyncValue};

/// Last-known values per user, persisted on the device so the app can paint
/// before the gateway answers. Rows are keyed `<field>_<userId>` and hold the
/// JSON-serialized value.
pub struct LocalCache {
    conn: Connection,
}

impl LocalCache {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache: {}", path.display()))?;
        let cache = LocalCache { conn };
        cache.migrate()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = LocalCache { conn };
        cache.migrate()?;
        Ok(cache)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS cache_entries (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                PRAGMA user_version = 1;",
            )?;
        }
        Ok(())
    }

    pub fn get_raw(&self, cache_key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM cache_entries WHERE key = ?1")?;
        let mut rows = stmt.query(params![cache_key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn read(&self, user_id: &str, key: SyncKey) -> Result<Option<SyncValue>> {
        let cache_key = key.cache_key(user_id);
        let Some(raw) = self.get_raw(&cache_key)? else {
            return Ok(None);
        };
        let json: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt cache entry '{cache_key}'"))?;
        let value = SyncValue::from_json(key, json)
            .with_context(|| format!("Cache entry '{cache_key}' has the wrong shape"))?;
        Ok(Some(value))
    }

    pub fn write(&self, user_id: &str, value: &SyncValue) -> Result<()> {
        let cache_key = value.key().cache_key(user_id);
        let json = serde_json::to_string(&value.to_json()?)?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO cache_entries (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![cache_key, json, now],
        )?;
        Ok(())
    }

    pub fn remove(&self, user_id: &str, key: SyncKey) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM cache_entries WHERE key = ?1",
            params![key.cache_key(user_id)],
        )?;
        Ok(rows > 0)
    }

    /// Build a bundle from whatever is cached, using defaults for missing or
    /// unreadable entries.
    pub fn load_bundle(&self, user_id: &str) -> Bundle {
        let mut bundle = Bundle::default();
        for key in SyncKey::ALL {
            match self.read(user_id, key) {
                Ok(Some(value)) => bundle.set(value),
                Ok(None) => {}
                Err(e) => tracing::warn!("ignoring cached {key} for {user_id}: {e:#}"),
            }
        }
        bundle
    }

    pub fn clear_user(&self, user_id: &str) -> Result<()> {
        for key in SyncKey::ALL {
            self.remove(user_id, key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Settings, Streak};

    #[test]
    fn test_write_and_read() {
        let cache = LocalCache::open_in_memory().unwrap();
        let settings = Settings {
            nickname: "Sam".to_string(),
            daily_calorie_goal: 1800,
            streak_goal: 5,
        };
        cache
            .write("u1", &SyncValue::Settings(settings.clone()))
            .unwrap();

        let read = cache.read("u1", SyncKey::Settings).unwrap();
        assert_eq!(read, Some(SyncValue::Settings(settings)));
        assert_eq!(cache.read("u2", SyncKey::Settings).unwrap(), None);
    }

    #[test]
    fn test_rows_keyed_by_field_and_user() {
        let cache = LocalCache::open_in_memory().unwrap();
        cache.write("abc", &SyncValue::GoalsAchieved(4)).unwrap();
        assert_eq!(
            cache.get_raw("goalsAchieved_abc").unwrap().as_deref(),
            Some("4")
        );
    }

    #[test]
    fn test_overwrite() {
        let cache = LocalCache::open_in_memory().unwrap();
        cache.write("u1", &SyncValue::GoalsAchieved(1)).unwrap();
        cache.write("u1", &SyncValue::GoalsAchieved(2)).unwrap();
        assert_eq!(
            cache.read("u1", SyncKey::GoalsAchieved).unwrap(),
            Some(SyncValue::GoalsAchieved(2))
        );
    }

    #[test]
    fn test_load_bundle_uses_defaults_for_gaps() {
        let cache = LocalCache::open_in_memory().unwrap();
        let streak = Streak {
            last_log_date: None,
            current_streak: 2,
            longest_streak: 3,
        };
        cache.write("u1", &SyncValue::Streak(streak.clone())).unwrap();

        let bundle = cache.load_bundle("u1");
        assert_eq!(bundle.streak, streak);
        assert_eq!(bundle.settings, Settings::default());
        assert!(bundle.meals.is_empty());
    }

    #[test]
    fn test_corrupt_entry_is_an_error_but_bundle_survives() {
        let cache = LocalCache::open_in_memory().unwrap();
        cache
            .conn
            .execute(
                "INSERT INTO cache_entries (key, value, updated_at) VALUES ('meals_u1', 'not json', '')",
                [],
            )
            .unwrap();
        assert!(cache.read("u1", SyncKey::Meals).is_err());
        assert!(cache.load_bundle("u1").meals.is_empty());
    }

    #[test]
    fn test_clear_user() {
        let cache = LocalCache::open_in_memory().unwrap();
        cache.write("u1", &SyncValue::GoalsAchieved(1)).unwrap();
        cache.write("u2", &SyncValue::GoalsAchieved(9)).unwrap();
        cache.clear_user("u1").unwrap();
        assert_eq!(cache.read("u1", SyncKey::GoalsAchieved).unwrap(), None);
        assert!(cache.read("u2", SyncKey::GoalsAchieved).unwrap().is_some());
        assert!(!cache.remove("u1", SyncKey::GoalsAchieved).unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let cache = LocalCache::open(&path).unwrap();
            cache.write("u1", &SyncValue::GoalsAchieved(7)).unwrap();
        }
        let cache = LocalCache::open(&path).unwrap();
        assert_eq!(
            cache.read("u1", SyncKey::GoalsAchieved).unwrap(),
            Some(SyncValue::GoalsAchieved(7))
        );
    }
}
