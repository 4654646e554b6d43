use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{HostRecord, HostRegistry};

/// Default database location under the user data directory
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("Could not find data directory"))?;
    Ok(data_dir.join("mooncast").join("hosts.db"))
}

/// Host registry persisted in SQLite
#[derive(Clone)]
pub struct SqliteHostRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHostRegistry {
    /// Open (or create) the database at `path` and initialize the schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        registry.init_schema()?;
        Ok(registry)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                address TEXT PRIMARY KEY,
                host_name TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl HostRegistry for SqliteHostRegistry {
    fn get(&self, address: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        let name = conn
            .query_row(
                "SELECT host_name FROM hosts WHERE address = ?1",
                params![address],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(name)
    }

    fn put(&self, address: &str, host_name: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO hosts (address, host_name, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(address) DO UPDATE SET
                host_name = excluded.host_name,
                updated_at = excluded.updated_at
            "#,
            params![address, host_name, Utc::now().to_rfc3339()],
        )?;

        tracing::debug!("Saved host mapping {} -> {}", address, host_name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<HostRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT address, host_name, updated_at FROM hosts ORDER BY updated_at DESC, address",
        )?;
        let records = stmt
            .query_map([], |row| {
                let updated_at: String = row.get(2)?;
                Ok(HostRecord {
                    address: row.get(0)?,
                    host_name: row.get(1)?,
                    updated_at: parse_timestamp(&updated_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn remove(&self, address: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let removed = conn.execute("DELETE FROM hosts WHERE address = ?1", params![address])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let registry = SqliteHostRegistry::open_in_memory().unwrap();
        assert_eq!(registry.get("10.0.0.5").unwrap(), None);

        registry.put("10.0.0.5", "DESKTOP-1").unwrap();
        assert_eq!(registry.get("10.0.0.5").unwrap(), Some("DESKTOP-1".to_string()));
    }

    #[test]
    fn test_put_is_upsert() {
        let registry = SqliteHostRegistry::open_in_memory().unwrap();
        registry.put("10.0.0.5", "OLD-NAME").unwrap();
        registry.put("10.0.0.5", "NEW-NAME").unwrap();

        let records = registry.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host_name, "NEW-NAME");
    }

    #[test]
    fn test_remove() {
        let registry = SqliteHostRegistry::open_in_memory().unwrap();
        registry.put("10.0.0.5", "DESKTOP-1").unwrap();
        registry.put("10.0.0.6", "LAPTOP").unwrap();

        assert!(registry.remove("10.0.0.5").unwrap());
        assert!(!registry.remove("10.0.0.5").unwrap());
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("mooncast-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("hosts.db");

        {
            let registry = SqliteHostRegistry::open(&path).unwrap();
            registry.put("192.168.1.20", "STUDY-PC").unwrap();
        }
        let reopened = SqliteHostRegistry::open(&path).unwrap();
        assert_eq!(
            reopened.get("192.168.1.20").unwrap(),
            Some("STUDY-PC".to_string())
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
