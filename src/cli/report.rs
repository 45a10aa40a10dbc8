use comfy_table::Table;

use crate::error::Result;
use crate::render::{column_names, render_visit};
use crate::store::load_visits;

use super::open_store;

pub fn run(customer: Option<&str>) -> Result<()> {
    let (settings, conn) = open_store()?;
    let records = load_visits(&conn, customer)?;
    if records.is_empty() {
        println!("No visits stored.");
        return Ok(());
    }

    let mut header = vec!["Customer".to_string()];
    header.extend(column_names());
    let mut table = Table::new();
    table.set_header(header);
    for record in &records {
        let mut row = vec![record.visit.customer_id.clone()];
        row.extend(render_visit(&record.visit, &record.items, &settings.currency));
        table.add_row(row);
    }
    println!("{table}");
    println!("{} visit(s)", records.len());
    Ok(())
}
