// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed session store.

use iris_core::{IrisError, Session, SessionStatus};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OpenFlags, Row};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_team TEXT NOT NULL,
    to_team TEXT NOT NULL,
    session_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_used_at INTEGER NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active'
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_session_id ON sessions(session_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_team_pair ON sessions(from_team, to_team)
    WHERE status != 'archived';
CREATE INDEX IF NOT EXISTS idx_sessions_last_used ON sessions(last_used_at);
";

const COLUMNS: &str = "id, from_team, to_team, session_id, created_at, last_used_at, \
                       message_count, status";

/// Filters for [`SessionStore::list`]. All optional; results are always
/// ordered by `last_used_at` descending.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub from_team: Option<String>,
    pub to_team: Option<String>,
    pub status: Option<SessionStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub active: u64,
    pub archived: u64,
    pub total_messages: u64,
}

/// Durable table of sessions keyed by team pair and by session id.
///
/// Every public operation is a single statement (or transaction) against
/// the embedded engine; the connection mutex makes the store safe for
/// concurrent callers.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, IrisError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IrisError::Storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(storage_err)?;
        // WAL keeps concurrent readers cheap; meaningless for :memory:.
        conn.pragma_update(None, "journal_mode", "WAL").map_err(storage_err)?;
        Self::with_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, IrisError> {
        Self::with_connection(Connection::open_in_memory().map_err(storage_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, IrisError> {
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert a new session row. Fails if the session id or the live team
    /// pair already exists.
    pub fn create(
        &self,
        from_team: &str,
        to_team: &str,
        session_id: &str,
        now_ms: u64,
    ) -> Result<Session, IrisError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (from_team, to_team, session_id, created_at, last_used_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![from_team, to_team, session_id, now_ms as i64],
        )
        .map_err(|e| match constraint_violation(&e) {
            true => IrisError::Storage(format!(
                "session already exists for ({from_team}, {to_team}) or id {session_id}"
            )),
            false => storage_err(e),
        })?;
        let id = conn.last_insert_rowid();
        Ok(Session {
            id,
            from_team: from_team.to_string(),
            to_team: to_team.to_string(),
            session_id: session_id.to_string(),
            created_at_ms: now_ms,
            last_used_at_ms: now_ms,
            message_count: 0,
            status: SessionStatus::Active,
        })
    }

    /// The live (non-archived) session for an ordered team pair.
    pub fn get_by_team_pair(
        &self,
        from_team: &str,
        to_team: &str,
    ) -> Result<Option<Session>, IrisError> {
        self.query_one(
            &format!(
                "SELECT {COLUMNS} FROM sessions \
                 WHERE from_team = ?1 AND to_team = ?2 AND status != 'archived'"
            ),
            rusqlite::params![from_team, to_team],
        )
    }

    pub fn get_by_session_id(&self, session_id: &str) -> Result<Option<Session>, IrisError> {
        self.query_one(
            &format!("SELECT {COLUMNS} FROM sessions WHERE session_id = ?1"),
            rusqlite::params![session_id],
        )
    }

    pub fn list(&self, filter: &SessionFilter) -> Result<Vec<Session>, IrisError> {
        let mut sql = format!("SELECT {COLUMNS} FROM sessions");
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(from_team) = &filter.from_team {
            params.push(from_team.clone());
            clauses.push("from_team = ?");
        }
        if let Some(to_team) = &filter.to_team {
            params.push(to_team.clone());
            clauses.push("to_team = ?");
        }
        if let Some(status) = filter.status {
            params.push(status.as_str().to_string());
            clauses.push("status = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY last_used_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), row_to_session)
            .map_err(storage_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
    }

    /// Stamp `last_used_at`. Returns whether a row matched.
    pub fn update_last_used(&self, session_id: &str, now_ms: u64) -> Result<bool, IrisError> {
        self.execute(
            "UPDATE sessions SET last_used_at = ?2 WHERE session_id = ?1",
            rusqlite::params![session_id, now_ms as i64],
        )
    }

    pub fn increment_message_count(&self, session_id: &str, by: u64) -> Result<bool, IrisError> {
        self.execute(
            "UPDATE sessions SET message_count = message_count + ?2 WHERE session_id = ?1",
            rusqlite::params![session_id, by as i64],
        )
    }

    pub fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<bool, IrisError> {
        self.execute(
            "UPDATE sessions SET status = ?2 WHERE session_id = ?1",
            rusqlite::params![session_id, status.as_str()],
        )
    }

    pub fn delete(&self, session_id: &str) -> Result<bool, IrisError> {
        self.execute("DELETE FROM sessions WHERE session_id = ?1", rusqlite::params![session_id])
    }

    pub fn delete_by_team_pair(&self, from_team: &str, to_team: &str) -> Result<bool, IrisError> {
        self.execute(
            "DELETE FROM sessions WHERE from_team = ?1 AND to_team = ?2",
            rusqlite::params![from_team, to_team],
        )
    }

    pub fn stats(&self) -> Result<StoreStats, IrisError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(status != 'archived'), 0), \
                    COALESCE(SUM(status = 'archived'), 0), \
                    COALESCE(SUM(message_count), 0) \
             FROM sessions",
            [],
            |row| {
                Ok(StoreStats {
                    total: row.get::<_, i64>(0)? as u64,
                    active: row.get::<_, i64>(1)? as u64,
                    archived: row.get::<_, i64>(2)? as u64,
                    total_messages: row.get::<_, i64>(3)? as u64,
                })
            },
        )
        .map_err(storage_err)
    }

    fn query_one(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<Session>, IrisError> {
        let conn = self.conn.lock();
        match conn.query_row(sql, params, row_to_session) {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    fn execute(&self, sql: &str, params: impl rusqlite::Params) -> Result<bool, IrisError> {
        let conn = self.conn.lock();
        let changed = conn.execute(sql, params).map_err(storage_err)?;
        Ok(changed > 0)
    }
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(7)?;
    Ok(Session {
        id: row.get(0)?,
        from_team: row.get(1)?,
        to_team: row.get(2)?,
        session_id: row.get(3)?,
        created_at_ms: row.get::<_, i64>(4)? as u64,
        last_used_at_ms: row.get::<_, i64>(5)? as u64,
        message_count: row.get::<_, i64>(6)? as u64,
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Active),
    })
}

fn storage_err(e: rusqlite::Error) -> IrisError {
    IrisError::Storage(e.to_string())
}

fn constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
