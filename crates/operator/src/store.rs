// Copyright 2025 Instanced Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Durable, single-writer record of live instances.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::{Error, Result};

/// A tracked live instance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Opaque monotonic id assigned by the store on insertion
    pub id: i64,
    /// Challenge name, matches a catalog entry at creation time
    pub challenge: String,
    /// Opaque team identifier
    pub team: String,
    /// 8-character hex uuid, unique per record
    pub uuid: String,
    /// Unix seconds at which this instance becomes reap-eligible
    pub expiry: i64,
}

impl InstanceRecord {
    /// Whether `now` is past this record's expiry
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        now_secs > self.expiry
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<InstanceRecord> {
    Ok(InstanceRecord {
        id: row.get(0)?,
        challenge: row.get(1)?,
        team: row.get(2)?,
        expiry: row.get(3)?,
        uuid: row.get(4)?,
    })
}

/// Durable single-writer store of `InstanceRecord`s, backed by one
/// non-pooled sqlite connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (creating if absent) the sqlite database at `path` and ensures
    /// the `instances` table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory can't be created or the
    /// database can't be opened/migrated.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Message(format!("could not create db directory: {e}")))?;
        }

        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS instances(
                id INTEGER PRIMARY KEY,
                challenge TEXT NOT NULL,
                team TEXT NOT NULL,
                expiry INTEGER NOT NULL,
                uuid TEXT NOT NULL
            );",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the table migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS instances(
                id INTEGER PRIMARY KEY,
                challenge TEXT NOT NULL,
                team TEXT NOT NULL,
                expiry INTEGER NOT NULL,
                uuid TEXT NOT NULL
            );",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Inserts a new instance record with `expiry = now + ttl`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the underlying insert fails.
    pub fn insert(
        &self,
        ttl: Duration,
        team: &str,
        challenge: &str,
        uuid: &str,
    ) -> Result<InstanceRecord> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let expiry = (now + ttl).as_secs() as i64;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO instances(challenge, team, expiry, uuid) VALUES (?1, ?2, ?3, ?4)",
            params![challenge, team, expiry, uuid],
        )?;
        let id = conn.last_insert_rowid();

        Ok(InstanceRecord {
            id,
            challenge: challenge.to_string(),
            team: team.to_string(),
            uuid: uuid.to_string(),
            expiry,
        })
    }

    /// Deletes the record with the given id, if any.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the delete fails. Deleting a missing id is
    /// not an error.
    pub fn delete_by_id(&self, id: i64) -> Result<()> {
        self.lock()
            .execute("DELETE FROM instances WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Reads the record with the given id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no row (or, under corruption, more than
    /// one row) matches.
    pub fn read_by_id(&self, id: i64) -> Result<InstanceRecord> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id, challenge, team, expiry, uuid FROM instances WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], row_to_record)?;

        let first = rows.next().transpose()?;
        let Some(record) = first else {
            return Err(Error::NotFound);
        };
        if rows.next().is_some() {
            return Err(Error::NotFound);
        }
        Ok(record)
    }

    /// Lists every live record.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the query fails.
    pub fn list(&self) -> Result<Vec<InstanceRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, challenge, team, expiry, uuid FROM instances")?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    /// Lists every live record belonging to `team`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Store` if the query fails.
    pub fn list_by_team(&self, team: &str) -> Result<Vec<InstanceRecord>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id, challenge, team, expiry, uuid FROM instances WHERE team = ?1")?;
        let rows = stmt.query_map(params![team], row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }
}
