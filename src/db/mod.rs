//! SQLite-backed [`IdeaStorage`].
//!
//! Each idea is one row; the concept forest and usage log travel as a JSON
//! document so the stored copy never shares structure with the live tree.

mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::Idea;
use crate::storage::IdeaStorage;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Idea operations
    // ============================================================

    pub fn put_idea(&self, idea: &Idea) -> Result<(), StorageError> {
        let mut copy = idea.clone();
        copy.updated_at = Utc::now();
        let document = serde_json::to_string(&copy)?;

        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO ideas (id, name, root_idea, document, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                root_idea = excluded.root_idea,
                document = excluded.document,
                updated_at = excluded.updated_at",
            (
                copy.id.to_string(),
                &copy.name,
                &copy.root_idea,
                &document,
                sortable(copy.created_at),
                sortable(copy.updated_at),
            ),
        )?;
        Ok(())
    }

    pub fn get_idea(&self, id: Uuid) -> Result<Option<Idea>, StorageError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM ideas WHERE id = ?",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        document
            .map(|doc| serde_json::from_str(&doc).map_err(StorageError::from))
            .transpose()
    }

    pub fn get_all_ideas(&self) -> Result<Vec<Idea>, StorageError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT document FROM ideas ORDER BY updated_at DESC")?;

        let documents = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(StorageError::from))
            .collect()
    }

    pub fn delete_idea(&self, id: Uuid) -> Result<bool, StorageError> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM ideas WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }
}

/// Fixed-width timestamps so `ORDER BY` on the text column is chronological.
fn sortable(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

#[async_trait]
impl IdeaStorage for Database {
    async fn save(&self, idea: &Idea) -> Result<(), StorageError> {
        self.put_idea(idea)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Idea>, StorageError> {
        self.get_idea(id)
    }

    async fn list(&self) -> Result<Vec<Idea>, StorageError> {
        self.get_all_ideas()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        self.delete_idea(id)
    }
}

/// `$BREAKITDOWN_DB`, or `breakitdown.db` in the platform data directory.
pub fn default_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("BREAKITDOWN_DB") {
        return Ok(PathBuf::from(path));
    }
    let dirs = directories::ProjectDirs::from("", "", "breakitdown")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("breakitdown.db"))
}
