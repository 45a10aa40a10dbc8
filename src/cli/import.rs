use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::dictionary::FieldDictionary;
use crate::error::{Result, SalonError};
use crate::extractor::ExtractOptions;
use crate::importer::{import_file, summarize, ImportOptions, ERROR_PREVIEW_LIMIT};
use crate::render::{column_names, render_visit};
use crate::settings::Settings;

use super::{open_store, ImportArgs};

fn options(args: &ImportArgs, settings: &Settings) -> ImportOptions {
    let defaults = &settings.import;
    ImportOptions {
        sheet_hint: args.sheet.clone(),
        sheet_keywords: defaults.sheet_keywords.clone(),
        dictionary: FieldDictionary::with_extra(&defaults.synonyms),
        mode: args.mode.unwrap_or(defaults.mode),
        extract: ExtractOptions {
            header_rows: args.header_rows.unwrap_or(defaults.header_rows),
            max_groups: args.max_groups.unwrap_or(defaults.max_groups),
        },
        commit_every: args.commit_every.or(defaults.commit_every),
        strict_key: args.strict_key,
        group_by_key: args.group_by_key,
        replace_batch_customers: args.replace_batch_customers,
        dry_run: args.dry_run,
    }
}

pub fn run(args: &ImportArgs) -> Result<()> {
    let (settings, conn) = open_store()?;
    let opts = options(args, &settings);
    let summary = summarize(import_file(&conn, &args.file, &opts));
    let Some(report) = summary.report.as_ref().filter(|_| summary.success) else {
        return Err(SalonError::Other(summary.message));
    };
    let s = &report.stats;

    println!("{}", summary.message.green());
    let mut table = Table::new();
    table.set_header(vec!["", "Count"]);
    for (label, value) in [
        ("Rows", s.rows_total),
        ("Valid rows", s.rows_valid),
        ("Skipped rows", s.rows_skipped),
        ("Visits created", s.visits_created),
        ("Visits updated", s.visits_updated),
        ("Duplicates skipped", s.visits_skipped),
        ("Visits replaced", s.visits_deleted),
        ("Items created", s.items_created),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    println!("{table}");

    if summary.error_count > 0 {
        println!("{}", format!("{} row error(s):", summary.error_count).red().bold());
        for err in &summary.error_preview {
            println!("  {err}");
        }
        if summary.error_count > ERROR_PREVIEW_LIMIT {
            println!("  ... and {} more", summary.error_count - ERROR_PREVIEW_LIMIT);
        }
    }
    if !s.warnings.is_empty() {
        println!("{}", format!("{} warning(s):", s.warnings.len()).yellow());
        for w in s.warnings.iter().take(ERROR_PREVIEW_LIMIT) {
            println!("  {w}");
        }
        if s.warnings.len() > ERROR_PREVIEW_LIMIT {
            println!("  ... and {} more", s.warnings.len() - ERROR_PREVIEW_LIMIT);
        }
    }
    if report.dry_run {
        let mut header = vec!["Customer".to_string()];
        header.extend(column_names());
        let mut visits = Table::new();
        visits.set_header(header);
        for record in &report.visits {
            let mut row = vec![record.visit.customer_id.clone()];
            row.extend(render_visit(&record.visit, &record.items, &settings.currency));
            visits.add_row(row);
        }
        println!("{visits}");
        println!("{}", "Dry run: nothing was written.".yellow());
    }
    Ok(())
}
