use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::render::{column_names, render_visit};
use crate::store::load_visits;

use super::open_store;

/// Write rendered visits as CSV; returns the number of data rows.
pub fn write_csv(conn: &Connection, output: &Path, customer: Option<&str>, currency: &str) -> Result<usize> {
    let records = load_visits(conn, customer)?;
    let mut wtr = csv::Writer::from_path(output)?;
    let mut header = vec!["customer_id".to_string()];
    header.extend(column_names());
    wtr.write_record(&header)?;
    for record in &records {
        let mut row = vec![record.visit.customer_id.clone()];
        row.extend(render_visit(&record.visit, &record.items, currency));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(records.len())
}

pub fn run(output: &Path, customer: Option<&str>) -> Result<()> {
    let (settings, conn) = open_store()?;
    let rows = write_csv(&conn, output, customer, &settings.currency)?;
    println!("Exported {rows} visit(s) to {}", output.display());
    Ok(())
}
