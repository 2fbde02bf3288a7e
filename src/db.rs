use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("coursehub.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS people(
            username TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            position TEXT NOT NULL
        )",
        [],
    )?;

    // One mark per (student, assignment). The UNIQUE constraint plus upsert
    // in the grades handler is what keeps concurrent inputs from doubling up.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            mark_id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_username TEXT NOT NULL,
            assignment TEXT NOT NULL,
            grade INTEGER NOT NULL,
            date_posted TEXT NOT NULL,
            regrade_requested INTEGER NOT NULL DEFAULT 0,
            regrade_reason TEXT,
            FOREIGN KEY(student_username) REFERENCES people(username),
            UNIQUE(student_username, assignment)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_username)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_regrade ON marks(regrade_requested)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS feedback(
            feedback_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instructor_username TEXT NOT NULL,
            feedback1 TEXT NOT NULL,
            feedback2 TEXT NOT NULL,
            feedback3 TEXT NOT NULL,
            feedback4 TEXT NOT NULL,
            FOREIGN KEY(instructor_username) REFERENCES people(username)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_feedback_instructor ON feedback(instructor_username)",
        [],
    )?;

    Ok(conn)
}
