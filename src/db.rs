use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const DB_FILE: &str = "salonbook.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY,
    customer_id TEXT NOT NULL,
    customer_name TEXT,
    visit_start TEXT NOT NULL,
    visit_end TEXT,
    declared_item_count INTEGER NOT NULL DEFAULT 0,
    declared_total_amount REAL,
    satisfaction TEXT,
    operator TEXT,
    payment_method TEXT,
    remark TEXT,
    source_row_ref TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    UNIQUE (customer_id, visit_start)
);

CREATE TABLE IF NOT EXISTS line_items (
    id INTEGER PRIMARY KEY,
    visit_id INTEGER NOT NULL,
    ordinal INTEGER NOT NULL,
    project_name TEXT,
    beautician_name TEXT,
    unit_price REAL,
    is_specified INTEGER DEFAULT 0,
    is_inferred INTEGER DEFAULT 0,
    FOREIGN KEY (visit_id) REFERENCES visits(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_line_items_visit ON line_items(visit_id);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    checksum TEXT NOT NULL,
    sheet_name TEXT NOT NULL,
    mode TEXT NOT NULL,
    rows_total INTEGER,
    rows_valid INTEGER,
    visits_created INTEGER,
    visits_updated INTEGER,
    visits_skipped INTEGER,
    items_created INTEGER,
    imported_at TEXT DEFAULT (datetime('now'))
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Open the database under `data_dir`, creating the schema if needed.
pub fn open_data_dir(data_dir: &Path) -> Result<Connection> {
    std::fs::create_dir_all(data_dir)?;
    let conn = get_connection(&data_dir.join(DB_FILE))?;
    init_db(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}
