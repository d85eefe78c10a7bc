use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;

use crate::authorization::domain::authorization_store::AuthorizationStore;
use crate::authorization::domain::detection_event::DetectionEvent;
use crate::authorization::domain::detection_log::DetectionLog;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("authorization query failed: {0}")]
    Query(#[source] rusqlite::Error),
    #[error("detection log insert failed: {0}")]
    Insert(#[source] rusqlite::Error),
}

/// SQLite-backed authorization list and detection log.
///
/// A connection is opened and closed around every call; nothing is pooled.
/// The schema (`authorized_plates`, `detection_logs`) is managed outside
/// this crate, so a missing database file is an error rather than being
/// created on the fly.
pub struct SqlitePlateStore {
    path: PathBuf,
}

impl SqlitePlateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self, flags: OpenFlags) -> Result<Connection, StoreError> {
        Connection::open_with_flags(&self.path, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX).map_err(
            |source| StoreError::Open {
                path: self.path.clone(),
                source,
            },
        )
    }
}

impl AuthorizationStore for SqlitePlateStore {
    fn is_authorized(&self, plate: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let conn = self.connect(OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let found = conn
            .query_row(
                "SELECT 1 FROM authorized_plates WHERE plate_number = ?1 LIMIT 1",
                params![plate],
                |_| Ok(()),
            )
            .optional()
            .map_err(StoreError::Query)?;
        Ok(found.is_some())
    }
}

impl DetectionLog for SqlitePlateStore {
    fn append(&self, event: &DetectionEvent) -> Result<(), Box<dyn std::error::Error>> {
        let conn = self.connect(OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        conn.execute(
            "INSERT INTO detection_logs (timestamp, plate_number, comment) VALUES (?1, ?2, ?3)",
            params![event.formatted_timestamp(), event.plate, event.comment],
        )
        .map_err(StoreError::Insert)?;
        Ok(())
    }
}
