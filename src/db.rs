use crate::error::Result;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "attendance.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            roll INTEGER NOT NULL,
            class TEXT NOT NULL,
            division TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(class, division, roll)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_scope ON students(class, division)",
        [],
    )?;

    // One row per (class, division, month); re-submission replaces `days`.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS working_calendars(
            class TEXT NOT NULL,
            division TEXT NOT NULL,
            month TEXT NOT NULL,
            days TEXT NOT NULL,
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(class, division, month)
        )",
        [],
    )?;

    // The roster is an external directory, so no foreign key to students.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_entries(
            student_id TEXT NOT NULL,
            month TEXT NOT NULL,
            seq INTEGER NOT NULL,
            present_dates TEXT NOT NULL,
            absent_dates TEXT NOT NULL,
            present_percent REAL NOT NULL,
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(student_id, month)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_entries_student ON attendance_entries(student_id, seq)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marksheets(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            subjects TEXT NOT NULL,
            total_marks REAL NOT NULL,
            obtained_marks REAL NOT NULL,
            percentage REAL NOT NULL,
            overall_remarks TEXT,
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(student_id, exam_type)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marksheets_student ON marksheets(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Start a transaction that takes the write lock up front, so concurrent
/// read-modify-write cycles on the same database are serialized.
pub fn begin_write(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
}

/// True when a write tripped a UNIQUE / PRIMARY KEY constraint.
pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(tables, 5);
    }

    #[test]
    fn settings_round_trip_and_overwrite() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("init");
        assert_eq!(settings_get_json(&conn, "k").expect("get"), None);
        settings_set_json(&conn, "k", &json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "k", &json!({ "a": 2 })).expect("set again");
        assert_eq!(
            settings_get_json(&conn, "k").expect("get"),
            Some(json!({ "a": 2 }))
        );
    }

    #[test]
    fn open_db_creates_workspace_file() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let ws = tmp.path().join("nested").join("ws");
        let _conn = open_db(&ws, Duration::from_millis(100)).expect("open");
        assert!(ws.join(DB_FILE).is_file());
    }
}
