use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";
const BUSY_TIMEOUT_MS: u64 = 5_000;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Applies pragmas, tables and column migrations. Safe to run on every open.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_records(
            id TEXT PRIMARY KEY,
            student_id TEXT,
            subject_id TEXT,
            exam_id TEXT,
            curriculum_type TEXT NOT NULL,
            input_json TEXT NOT NULL,
            score REAL,
            max_score REAL NOT NULL,
            percentage REAL,
            letter_grade TEXT,
            cbc_performance_level TEXT,
            is_valid INTEGER NOT NULL,
            error TEXT,
            status TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            submitted_by TEXT,
            submitted_at TEXT,
            approved_by TEXT,
            approved_at TEXT,
            principal_notes TEXT,
            rejected_by TEXT,
            rejected_at TEXT,
            rejection_reason TEXT,
            released_by TEXT,
            released_at TEXT,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_status ON grade_records(status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_exam ON grade_records(exam_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_records_subject ON grade_records(subject_id)",
        [],
    )?;

    // Override metadata arrived after the first schema; add it to older workspaces.
    ensure_grade_records_override_columns(conn)?;

    Ok(())
}

fn ensure_grade_records_override_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "grade_records", "overridden_by")? {
        conn.execute("ALTER TABLE grade_records ADD COLUMN overridden_by TEXT", [])?;
    }
    if !table_has_column(conn, "grade_records", "overridden_at")? {
        conn.execute("ALTER TABLE grade_records ADD COLUMN overridden_at TEXT", [])?;
    }
    if !table_has_column(conn, "grade_records", "override_note")? {
        conn.execute("ALTER TABLE grade_records ADD COLUMN override_note TEXT", [])?;
    }
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
