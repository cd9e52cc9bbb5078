//! SQLite-backed history store.
//!
//! One row per completed check-in. The database lives in the agent's state
//! directory and survives restarts. The connection is blocking, so every
//! operation moves onto the blocking thread pool.
//!
//! The store contains candidate names and photo URLs, so the database and
//! its WAL sidecars are kept readable by the desk user only.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::task;
use tracing::warn;

use super::{CheckInHistory, CheckInRecord, HistoryError};

const CURRENT_SCHEMA_VERSION: i64 = 1;

pub struct SqliteHistory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistory {
    /// Open the history database at `db_path`, creating it if needed.
    pub fn new(db_path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HistoryError::storage("create state directory", e))?;
            restrict_permissions(parent, 0o700);
        }

        let conn =
            Connection::open(db_path).map_err(|e| HistoryError::storage("open database", e))?;
        restrict_permissions(db_path, 0o600);

        configure_connection(&conn)?;
        run_migrations(&conn)?;

        // The migration commit is what brings the WAL sidecars into being
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = db_path.as_os_str().to_owned();
            sidecar.push(suffix);
            restrict_permissions(Path::new(&sidecar), 0o600);
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests.
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HistoryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| HistoryError::storage("open database", e))?;
        configure_connection(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Put the connection into WAL mode with full synchronous writes.
fn configure_connection(conn: &Connection) -> Result<(), HistoryError> {
    let mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(|e| HistoryError::storage("enable WAL", e))?;
    // In-memory databases report "memory"; both modes are safe here
    if mode != "wal" && mode != "memory" {
        return Err(HistoryError::storage(
            "enable WAL",
            format!("unexpected journal mode {}", mode),
        ));
    }

    conn.execute_batch("PRAGMA synchronous = FULL; PRAGMA busy_timeout = 5000;")
        .map_err(|e| HistoryError::storage("configure connection", e))?;

    Ok(())
}

/// Apply any pending schema migrations.
fn run_migrations(conn: &Connection) -> Result<(), HistoryError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        )",
    )
    .map_err(|e| HistoryError::storage("create schema_version", e))?;

    let from_version: i64 = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| HistoryError::storage("read schema version", e))?
        .unwrap_or(0);

    if from_version > CURRENT_SCHEMA_VERSION {
        return Err(HistoryError::storage(
            "migrate",
            format!(
                "database schema version {} is newer than supported version {}",
                from_version, CURRENT_SCHEMA_VERSION
            ),
        ));
    }

    if from_version < 1 {
        conn.execute_batch(
            "CREATE TABLE check_ins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exam_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                email TEXT NOT NULL,
                seat TEXT,
                tag_serial TEXT NOT NULL,
                image_url TEXT,
                completed_at TEXT NOT NULL
            );
            CREATE INDEX idx_check_ins_exam_id ON check_ins (exam_id);",
        )
        .map_err(|e| HistoryError::storage("migrate to v1", e))?;
    }

    conn.execute(
        "INSERT INTO schema_version (id, version) VALUES (1, ?1)
         ON CONFLICT (id) DO UPDATE SET version = excluded.version",
        [CURRENT_SCHEMA_VERSION],
    )
    .map_err(|e| HistoryError::storage("update schema version", e))?;

    Ok(())
}

fn restrict_permissions(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
                warn!("Could not restrict permissions on {}: {}", path.display(), e);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}

struct RawRecord {
    exam_id: String,
    user_id: String,
    email: String,
    seat: Option<String>,
    tag_serial: String,
    image_url: Option<String>,
    completed_at: String,
}

fn fetch_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<CheckInRecord>, HistoryError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| HistoryError::storage("prepare query", e))?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(RawRecord {
                exam_id: row.get(0)?,
                user_id: row.get(1)?,
                email: row.get(2)?,
                seat: row.get(3)?,
                tag_serial: row.get(4)?,
                image_url: row.get(5)?,
                completed_at: row.get(6)?,
            })
        })
        .map_err(|e| HistoryError::storage("query check-ins", e))?;

    let mut records = Vec::new();
    for row in rows {
        let raw = row.map_err(|e| HistoryError::storage("read row", e))?;
        match DateTime::parse_from_rfc3339(&raw.completed_at) {
            Ok(completed_at) => records.push(CheckInRecord {
                exam_id: raw.exam_id,
                user_id: raw.user_id,
                email: raw.email,
                seat: raw.seat,
                tag_serial: raw.tag_serial,
                image_url: raw.image_url,
                completed_at: completed_at.with_timezone(&Utc),
            }),
            Err(e) => {
                warn!(
                    "Skipping check-in row with unparseable timestamp {:?}: {}",
                    raw.completed_at, e
                );
            }
        }
    }
    Ok(records)
}

#[async_trait]
impl CheckInHistory for SqliteHistory {
    async fn record(&self, record: CheckInRecord) -> Result<(), HistoryError> {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO check_ins
                     (exam_id, user_id, email, seat, tag_serial, image_url, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    record.exam_id,
                    record.user_id,
                    record.email,
                    record.seat,
                    record.tag_serial,
                    record.image_url,
                    record.completed_at.to_rfc3339(),
                ],
            )
            .map_err(|e| HistoryError::storage("insert check-in", e))?;
            Ok(())
        })
        .await
        .map_err(|e| HistoryError::storage("insert check-in", e))?
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CheckInRecord>, HistoryError> {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            fetch_records(
                &conn,
                "SELECT exam_id, user_id, email, seat, tag_serial, image_url, completed_at
                 FROM check_ins ORDER BY completed_at DESC, id DESC LIMIT ?1",
                [limit as i64],
            )
        })
        .await
        .map_err(|e| HistoryError::storage("list check-ins", e))?
    }

    async fn for_exam(&self, exam_id: &str) -> Result<Vec<CheckInRecord>, HistoryError> {
        let exam_id = exam_id.to_string();
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            fetch_records(
                &conn,
                "SELECT exam_id, user_id, email, seat, tag_serial, image_url, completed_at
                 FROM check_ins WHERE exam_id = ?1 ORDER BY completed_at DESC, id DESC",
                [exam_id],
            )
        })
        .await
        .map_err(|e| HistoryError::storage("list check-ins", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn record_at(exam_id: &str, user_id: &str, secs: u32) -> CheckInRecord {
        CheckInRecord {
            exam_id: exam_id.to_string(),
            user_id: user_id.to_string(),
            email: format!("{}@example.com", user_id),
            seat: Some("A-1".to_string()),
            tag_serial: "04AA".to_string(),
            image_url: Some("https://cdn.example.com/selfie.jpg".to_string()),
            completed_at: Utc.with_ymd_and_hms(2026, 8, 22, 9, 0, secs).unwrap(),
        }
    }

    #[tokio::test]
    async fn record_then_recent_roundtrips() {
        let history = SqliteHistory::new_in_memory().unwrap();
        let record = record_at("7", "1", 0);

        history.record(record.clone()).await.unwrap();

        let records = history.recent(10).await.unwrap();
        assert_eq!(records, vec![record]);
    }

    #[tokio::test]
    async fn recent_returns_newest_first_up_to_limit() {
        let history = SqliteHistory::new_in_memory().unwrap();
        for i in 0..3 {
            history
                .record(record_at("7", &i.to_string(), i))
                .await
                .unwrap();
        }

        let records = history.recent(2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, "2");
        assert_eq!(records[1].user_id, "1");
    }

    #[tokio::test]
    async fn for_exam_filters_by_exam() {
        let history = SqliteHistory::new_in_memory().unwrap();
        history.record(record_at("7", "1", 0)).await.unwrap();
        history.record(record_at("8", "2", 1)).await.unwrap();
        history.record(record_at("7", "3", 2)).await.unwrap();

        let records = history.for_exam("7").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, "3");
        assert_eq!(records[1].user_id, "1");
    }

    #[tokio::test]
    async fn history_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("checkins.db");

        {
            let history = SqliteHistory::new(&db_path).unwrap();
            history.record(record_at("7", "1", 0)).await.unwrap();
        }

        let reopened = SqliteHistory::new(&db_path).unwrap();
        let records = reopened.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].exam_id, "7");
    }

    #[test]
    fn database_uses_wal_journaling() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("checkins.db");
        drop(SqliteHistory::new(&db_path).unwrap());

        let conn = Connection::open(&db_path).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn schema_version_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("checkins.db");
        drop(SqliteHistory::new(&db_path).unwrap());

        let conn = Connection::open(&db_path).unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("checkins.db");
        drop(SqliteHistory::new(&db_path).unwrap());

        let conn = Connection::open(&db_path).unwrap();
        conn.execute("UPDATE schema_version SET version = 99 WHERE id = 1", [])
            .unwrap();
        drop(conn);

        assert!(SqliteHistory::new(&db_path).is_err());
    }

    #[tokio::test]
    async fn unparseable_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("checkins.db");
        drop(SqliteHistory::new(&db_path).unwrap());

        let conn = Connection::open(&db_path).unwrap();
        conn.execute(
            "INSERT INTO check_ins
                 (exam_id, user_id, email, seat, tag_serial, image_url, completed_at)
             VALUES ('7', '1', '1@example.com', NULL, '04AA', NULL, 'not-a-timestamp')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO check_ins
                 (exam_id, user_id, email, seat, tag_serial, image_url, completed_at)
             VALUES ('7', '2', '2@example.com', NULL, '04BB', NULL, '2026-08-22T09:00:00+00:00')",
            [],
        )
        .unwrap();
        drop(conn);

        let history = SqliteHistory::new(&db_path).unwrap();
        let records = history.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, "2");
    }

    #[cfg(unix)]
    #[test]
    fn state_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let db_path = state_dir.join("checkins.db");
        let _history = SqliteHistory::new(&db_path).unwrap();

        let dir_mode = std::fs::metadata(&state_dir).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        let file_mode = std::fs::metadata(&db_path).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }

    fn arb_record() -> impl Strategy<Value = CheckInRecord> {
        (
            "[0-9]{1,4}",
            "[0-9]{1,4}",
            "[a-z]{1,8}",
            proptest::option::of("[A-C]-[0-9]{2}"),
            "[0-9A-F]{8,14}",
            proptest::option::of("[a-z]{4,12}"),
            0i64..4_102_444_800,
        )
            .prop_map(
                |(exam_id, user_id, local, seat, tag_serial, image, secs)| CheckInRecord {
                    exam_id,
                    user_id,
                    email: format!("{}@example.com", local),
                    seat,
                    tag_serial,
                    image_url: image.map(|i| format!("https://cdn.example.com/{}.jpg", i)),
                    completed_at: Utc.timestamp_opt(secs, 0).unwrap(),
                },
            )
    }

    proptest! {
        #[test]
        fn any_record_survives_storage(record in arb_record()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let listed = rt.block_on(async {
                let history = SqliteHistory::new_in_memory().unwrap();
                history.record(record.clone()).await.unwrap();
                history.recent(1).await.unwrap()
            });

            prop_assert_eq!(listed, vec![record]);
        }
    }
}
