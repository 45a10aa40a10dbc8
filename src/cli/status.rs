use std::path::PathBuf;

use comfy_table::Table;

use crate::db::{get_connection, DB_FILE};
use crate::error::Result;
use crate::fmt::money;
use crate::settings::{load_settings, settings_file_exists, settings_path};
use crate::store::{counts, recent_imports};

pub fn run() -> Result<()> {
    let settings = load_settings()?;
    let data_dir = PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join(DB_FILE);

    let settings_note = if settings_file_exists() { "" } else { " (not written yet)" };
    println!("Settings:   {}{}", settings_path().display(), settings_note);
    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `salonbook init` to set up.");
        return Ok(());
    }

    let conn = get_connection(&db_path)?;
    let c = counts(&conn)?;
    println!();
    println!("Customers:  {}", c.customers);
    println!("Visits:     {}", c.visits);
    println!("Items:      {} ({} inferred)", c.items, c.inferred_items);
    println!("Imports:    {}", c.imports);
    println!("Total:      {}", money(c.total_amount, &settings.currency));

    let imports = recent_imports(&conn, 5)?;
    if !imports.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["#", "When", "File", "Sheet", "Mode", "Created", "Updated", "Skipped"]);
        for imp in &imports {
            table.add_row(vec![
                imp.id.map(|id| id.to_string()).unwrap_or_default(),
                imp.imported_at.clone().unwrap_or_default(),
                imp.filename.clone(),
                imp.sheet_name.clone(),
                imp.mode.clone(),
                imp.visits_created.to_string(),
                imp.visits_updated.to_string(),
                imp.visits_skipped.to_string(),
            ]);
        }
        println!();
        println!("{table}");
    }
    Ok(())
}
