use colored::Colorize;

use crate::error::Result;
use crate::gapfill::fill_gaps;

use super::open_store;

pub fn run() -> Result<()> {
    let (settings, conn) = open_store()?;
    if settings.gap_fill.roster.is_empty() {
        println!("{}", "No roster in settings; missing beauticians are left empty.".yellow());
    }
    let result = fill_gaps(&conn, &settings.gap_fill)?;
    println!(
        "{} project name(s), {} beautician(s) filled ({} price(s) derived from visit totals)",
        result.projects_filled, result.beauticians_filled, result.prices_derived
    );
    if result.projects_filled + result.beauticians_filled > 0 {
        println!("Filled values are best-effort and marked as inferred.");
    }
    Ok(())
}
