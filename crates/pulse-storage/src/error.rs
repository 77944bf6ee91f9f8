/// Errors surfaced by the storage layer.
///
/// The transient/terminal split drives the retry loop in the SQL backend:
/// SQLite's busy/locked class plays the role of a connection exception and
/// is retried, constraint violations and everything else are terminal.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An underlying SQLite error.
    #[error("storage: sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot (de)serialization failure.
    #[error("storage: json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot file I/O failure.
    #[error("storage: io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured snapshot path is empty.
    #[error("storage: no snapshot path configured")]
    NoSnapshotPath,
}

impl StoreError {
    /// Whether the operation is worth retrying on the shared backoff ladder.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => {
                matches!(
                    sqlite_code(e),
                    Some(rusqlite::ErrorCode::DatabaseBusy)
                        | Some(rusqlite::ErrorCode::DatabaseLocked)
                )
            }
            _ => false,
        }
    }

    /// Whether the error is a unique/constraint violation (never retried).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => matches!(
                sqlite_code(e),
                Some(rusqlite::ErrorCode::ConstraintViolation)
            ),
            _ => false,
        }
    }
}

fn sqlite_code(e: &rusqlite::Error) -> Option<rusqlite::ErrorCode> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => Some(err.code),
        _ => None,
    }
}
