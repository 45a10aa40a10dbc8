pub mod cleanup;
pub mod export;
pub mod fill;
pub mod import;
pub mod init;
pub mod report;
pub mod status;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db;
use crate::dedup::ImportMode;
use crate::error::Result;
use crate::settings::{load_settings, Settings};

#[derive(Parser)]
#[command(name = "salonbook", about = "Import and reconcile beauty-salon visit logs.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write settings and create the database.
    Init {
        /// Path for salonbook data (default: ~/Documents/salonbook)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import a visit-log spreadsheet (xlsx, xls, xlsb, ods).
    Import(ImportArgs),
    /// Fill missing project and beautician names on stored items.
    FillGaps,
    /// Show stored visits as report rows.
    Report {
        /// Only this customer
        #[arg(long)]
        customer: Option<String>,
    },
    /// Write report rows to a CSV file.
    Export {
        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
        /// Only this customer
        #[arg(long)]
        customer: Option<String>,
    },
    /// Delete a customer's visits (and their items).
    Cleanup {
        #[arg(long)]
        customer: String,
        /// First day to delete (YYYY-MM-DD)
        #[arg(long = "from")]
        from_date: Option<NaiveDate>,
        /// Last day to delete (YYYY-MM-DD)
        #[arg(long = "to")]
        to_date: Option<NaiveDate>,
    },
    /// Show data directory, database and counts.
    Status,
}

#[derive(clap::Args)]
pub struct ImportArgs {
    /// Spreadsheet to import
    pub file: PathBuf,
    /// Sheet name (exact or partial); default is keyword matching
    #[arg(long)]
    pub sheet: Option<String>,
    /// Overrides the mode from settings
    #[arg(long, value_enum)]
    pub mode: Option<ImportMode>,
    /// Item groups to read per row
    #[arg(long = "max-groups")]
    pub max_groups: Option<usize>,
    /// Leading rows searched for the header
    #[arg(long = "header-rows")]
    pub header_rows: Option<usize>,
    /// Commit every N visits instead of once at the end
    #[arg(long = "commit-every")]
    pub commit_every: Option<usize>,
    /// Also match on operator and declared total
    #[arg(long = "strict-key")]
    pub strict_key: bool,
    /// Merge rows with the same customer and arrival time into one visit
    #[arg(long = "group-by-key")]
    pub group_by_key: bool,
    /// With --mode replace-all, delete only the visits of customers in this file
    #[arg(long = "replace-batch-customers")]
    pub replace_batch_customers: bool,
    /// Run the import, then roll it back
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

/// Settings plus an open database under the configured data dir.
pub(crate) fn open_store() -> Result<(Settings, Connection)> {
    let settings = load_settings()?;
    let conn = db::open_data_dir(&PathBuf::from(&settings.data_dir))?;
    Ok((settings, conn))
}
