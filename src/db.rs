use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "pollup.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            teacher_id TEXT NOT NULL,
            active INTEGER NOT NULL,
            session_code TEXT NOT NULL,
            results_public INTEGER,
            results_pin_code TEXT,
            completion_title TEXT,
            completion_subtitle TEXT,
            completion_description TEXT,
            completion_image_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    // Customization columns arrived after the first schema.
    ensure_sessions_colors(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_teacher ON sessions(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_code ON sessions(session_code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS elements(
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            subtitle TEXT,
            description TEXT,
            image_id TEXT,
            sort_order INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            choices_json TEXT,
            min_value REAL,
            max_value REAL,
            step REAL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        )",
        [],
    )?;
    ensure_elements_conditional_logic(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_elements_session_sort ON elements(session_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            element_id TEXT NOT NULL,
            participant_id TEXT NOT NULL,
            text_value TEXT,
            number_value REAL,
            choice_ids_json TEXT,
            file_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id),
            FOREIGN KEY(element_id) REFERENCES elements(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_session ON responses(session_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_element ON responses(element_id)",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_responses_participant_element
         ON responses(participant_id, element_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS blobs(
            id TEXT PRIMARY KEY,
            content_type TEXT NOT NULL,
            size INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS uploads(
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_sessions_colors(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "sessions", "bg_color")? {
        conn.execute("ALTER TABLE sessions ADD COLUMN bg_color TEXT", [])?;
    }
    if !table_has_column(conn, "sessions", "accent_color")? {
        conn.execute("ALTER TABLE sessions ADD COLUMN accent_color TEXT", [])?;
    }
    Ok(())
}

fn ensure_elements_conditional_logic(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "elements", "conditional_logic_json")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE elements ADD COLUMN conditional_logic_json TEXT",
        [],
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
