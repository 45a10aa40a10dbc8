use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};

use crate::error::{Result, SalonError};
use crate::models::{ImportRecord, LineItem, Visit, VisitRecord, TIMESTAMP_FORMAT};

/// Visit and item writes, all inside whatever transaction the caller holds.
pub trait PersistenceGateway {
    fn find_visit(&self, customer_id: &str, visit_start: NaiveDateTime) -> Result<Option<Visit>>;

    /// Insert when `visit.id` is `None`, otherwise update the mutable fields of
    /// that row. `items` are inserted under the returned id. A unique-key clash
    /// on insert is reported as [`SalonError::ConstraintViolation`].
    fn upsert_visit(&self, visit: &Visit, items: &[LineItem]) -> Result<i64>;

    fn delete_items(&self, visit_id: i64) -> Result<usize>;

    /// Every visit of one customer; items cascade.
    fn delete_customer_visits(&self, customer_id: &str) -> Result<usize>;

    /// Every stored visit; items cascade.
    fn delete_all_visits(&self) -> Result<usize>;
}

pub struct SqliteGateway<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteGateway<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn insert_items(&self, visit_id: i64, items: &[LineItem]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO line_items (visit_id, ordinal, project_name, beautician_name, unit_price, is_specified, is_inferred)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for item in items {
            stmt.execute(params![
                visit_id,
                item.ordinal,
                item.project_name,
                item.beautician_name,
                item.unit_price,
                item.is_specified,
                item.is_inferred,
            ])?;
        }
        Ok(())
    }
}

fn fmt_ts(dt: NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

/// Only the unique key; NOT NULL, CHECK, foreign-key and trigger aborts stay database errors.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
}

const VISIT_COLUMNS: &str = "id, customer_id, customer_name, visit_start, visit_end, declared_item_count, \
     declared_total_amount, satisfaction, operator, payment_method, remark, source_row_ref";

fn visit_from_row(row: &Row) -> rusqlite::Result<Visit> {
    let start: String = row.get(3)?;
    let end: Option<String> = row.get(4)?;
    Ok(Visit {
        id: Some(row.get(0)?),
        customer_id: row.get(1)?,
        customer_name: row.get(2)?,
        visit_start: parse_ts(3, &start)?,
        visit_end: end.as_deref().map(|s| parse_ts(4, s)).transpose()?,
        declared_item_count: row.get(5)?,
        declared_total_amount: row.get(6)?,
        satisfaction: row.get(7)?,
        operator: row.get(8)?,
        payment_method: row.get(9)?,
        remark: row.get(10)?,
        source_row_ref: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
    })
}

impl PersistenceGateway for SqliteGateway<'_> {
    fn find_visit(&self, customer_id: &str, visit_start: NaiveDateTime) -> Result<Option<Visit>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE customer_id = ?1 AND visit_start = ?2"
        ))?;
        Ok(stmt
            .query_row(params![customer_id, fmt_ts(visit_start)], visit_from_row)
            .optional()?)
    }

    fn upsert_visit(&self, visit: &Visit, items: &[LineItem]) -> Result<i64> {
        let visit_id = match visit.id {
            Some(id) => {
                self.conn.execute(
                    "UPDATE visits SET customer_name = ?2, visit_end = ?3, declared_item_count = ?4,
                        declared_total_amount = ?5, satisfaction = ?6, operator = ?7, payment_method = ?8,
                        remark = ?9, source_row_ref = ?10, updated_at = datetime('now')
                     WHERE id = ?1",
                    params![
                        id,
                        visit.customer_name,
                        visit.visit_end.map(fmt_ts),
                        visit.declared_item_count,
                        visit.declared_total_amount,
                        visit.satisfaction,
                        visit.operator,
                        visit.payment_method,
                        visit.remark,
                        visit.source_row_ref,
                    ],
                )?;
                id
            }
            None => {
                let inserted = self.conn.execute(
                    "INSERT INTO visits (customer_id, customer_name, visit_start, visit_end, declared_item_count,
                        declared_total_amount, satisfaction, operator, payment_method, remark, source_row_ref)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        visit.customer_id,
                        visit.customer_name,
                        fmt_ts(visit.visit_start),
                        visit.visit_end.map(fmt_ts),
                        visit.declared_item_count,
                        visit.declared_total_amount,
                        visit.satisfaction,
                        visit.operator,
                        visit.payment_method,
                        visit.remark,
                        visit.source_row_ref,
                    ],
                );
                match inserted {
                    Ok(_) => self.conn.last_insert_rowid(),
                    Err(e) if is_unique_violation(&e) => {
                        return Err(SalonError::ConstraintViolation {
                            customer_id: visit.customer_id.clone(),
                            visit_start: fmt_ts(visit.visit_start),
                        })
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        self.insert_items(visit_id, items)?;
        Ok(visit_id)
    }

    fn delete_items(&self, visit_id: i64) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM line_items WHERE visit_id = ?1", [visit_id])?)
    }

    fn delete_customer_visits(&self, customer_id: &str) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM visits WHERE customer_id = ?1", [customer_id])?)
    }

    fn delete_all_visits(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM visits", [])?)
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn item_from_row(row: &Row) -> rusqlite::Result<LineItem> {
    Ok(LineItem {
        id: Some(row.get(0)?),
        ordinal: row.get(1)?,
        project_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        beautician_name: row.get(3)?,
        unit_price: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
        is_specified: row.get(5)?,
        is_inferred: row.get(6)?,
    })
}

pub fn load_items(conn: &Connection, visit_id: i64) -> Result<Vec<LineItem>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, ordinal, project_name, beautician_name, unit_price, is_specified, is_inferred
         FROM line_items WHERE visit_id = ?1 ORDER BY ordinal, id",
    )?;
    let items = stmt
        .query_map([visit_id], item_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Stored visits with their items, oldest first.
pub fn load_visits(conn: &Connection, customer_id: Option<&str>) -> Result<Vec<VisitRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VISIT_COLUMNS} FROM visits
         WHERE ?1 IS NULL OR customer_id = ?1
         ORDER BY visit_start, customer_id"
    ))?;
    let visits = stmt
        .query_map([customer_id], visit_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(visits.len());
    for visit in visits {
        let items = match visit.id {
            Some(id) => load_items(conn, id)?,
            None => Vec::new(),
        };
        records.push(VisitRecord { visit, items });
    }
    Ok(records)
}

/// Delete a customer's visits whose start date falls within `from..=to`
/// (either bound optional). Items cascade.
pub fn delete_visits(
    conn: &Connection,
    customer_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<usize> {
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(SalonError::Other(format!("--from {f} is after --to {t}")));
        }
    }
    let day = |d: NaiveDate| d.format("%Y-%m-%d").to_string();
    let deleted = conn.execute(
        "DELETE FROM visits WHERE customer_id = ?1
           AND (?2 IS NULL OR date(visit_start) >= ?2)
           AND (?3 IS NULL OR date(visit_start) <= ?3)",
        params![customer_id, from.map(day), to.map(day)],
    )?;
    Ok(deleted)
}

// ---------------------------------------------------------------------------
// Import ledger
// ---------------------------------------------------------------------------

pub fn record_import(conn: &Connection, record: &ImportRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO imports (filename, checksum, sheet_name, mode, rows_total, rows_valid,
            visits_created, visits_updated, visits_skipped, items_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.filename,
            record.checksum,
            record.sheet_name,
            record.mode,
            record.rows_total,
            record.rows_valid,
            record.visits_created,
            record.visits_updated,
            record.visits_skipped,
            record.items_created,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const IMPORT_COLUMNS: &str = "id, filename, checksum, sheet_name, mode, rows_total, rows_valid, \
     visits_created, visits_updated, visits_skipped, items_created, imported_at";

fn import_from_row(row: &Row) -> rusqlite::Result<ImportRecord> {
    Ok(ImportRecord {
        id: Some(row.get(0)?),
        filename: row.get(1)?,
        checksum: row.get(2)?,
        sheet_name: row.get(3)?,
        mode: row.get(4)?,
        rows_total: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        rows_valid: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        visits_created: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        visits_updated: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        visits_skipped: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
        items_created: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        imported_at: row.get(11)?,
    })
}

pub fn find_import_by_checksum(conn: &Connection, checksum: &str) -> Result<Option<ImportRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IMPORT_COLUMNS} FROM imports WHERE checksum = ?1 ORDER BY id LIMIT 1"
    ))?;
    Ok(stmt.query_row([checksum], import_from_row).optional()?)
}

pub fn recent_imports(conn: &Connection, limit: usize) -> Result<Vec<ImportRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IMPORT_COLUMNS} FROM imports ORDER BY id DESC LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map([limit as i64], import_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoreCounts {
    pub customers: i64,
    pub visits: i64,
    pub items: i64,
    pub inferred_items: i64,
    pub imports: i64,
    /// Sum of declared visit totals.
    pub total_amount: f64,
}

pub fn counts(conn: &Connection) -> Result<StoreCounts> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(StoreCounts {
        customers: count("SELECT count(DISTINCT customer_id) FROM visits")?,
        visits: count("SELECT count(*) FROM visits")?,
        items: count("SELECT count(*) FROM line_items")?,
        inferred_items: count("SELECT count(*) FROM line_items WHERE is_inferred = 1")?,
        imports: count("SELECT count(*) FROM imports")?,
        total_amount: conn.query_row("SELECT coalesce(sum(declared_total_amount), 0.0) FROM visits", [], |r| r.get(0))?,
    })
}
