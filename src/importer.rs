use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::cell::Workbook;
use crate::dedup::{self, ImportMode, MatchKey, Outcome};
use crate::dictionary::FieldDictionary;
use crate::error::{Result, RowError, SalonError};
use crate::extractor::{self, ExtractOptions};
use crate::models::{ImportRecord, VisitRecord};
use crate::sheet;
use crate::store::{self, PersistenceGateway, SqliteGateway};

/// Most errors shown to the user after a run; the rest are only counted.
pub const ERROR_PREVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub sheet_hint: Option<String>,
    pub sheet_keywords: Vec<String>,
    pub dictionary: FieldDictionary,
    pub mode: ImportMode,
    pub extract: ExtractOptions,
    /// Commit after every N applied visits instead of once at the end.
    pub commit_every: Option<usize>,
    pub strict_key: bool,
    pub group_by_key: bool,
    /// Narrow `replace_all` to the customers present in the batch.
    pub replace_batch_customers: bool,
    /// Run everything, then roll back.
    pub dry_run: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            sheet_hint: None,
            sheet_keywords: sheet::default_keywords(),
            dictionary: FieldDictionary::default(),
            mode: ImportMode::default(),
            extract: ExtractOptions::default(),
            commit_every: None,
            strict_key: false,
            group_by_key: false,
            replace_batch_customers: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportStats {
    pub rows_total: usize,
    pub rows_valid: usize,
    pub rows_skipped: usize,
    pub visits_created: usize,
    pub visits_updated: usize,
    pub visits_skipped: usize,
    /// Visits removed up front by `replace_all`.
    pub visits_deleted: usize,
    pub items_created: usize,
    pub errors: Vec<RowError>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub filename: String,
    pub sheet_name: String,
    pub checksum: String,
    pub mode: ImportMode,
    pub dry_run: bool,
    /// Normalized visits in sheet order (after grouping, if enabled).
    pub visits: Vec<VisitRecord>,
    pub stats: ImportStats,
}

/// What a caller shows the user: never more than [`ERROR_PREVIEW_LIMIT`] errors.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub success: bool,
    pub message: String,
    pub error_count: usize,
    pub error_preview: Vec<String>,
    pub report: Option<ImportReport>,
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Read `file_path` fully, then import it. The file is closed before parsing.
pub fn import_file(conn: &Connection, file_path: &Path, opts: &ImportOptions) -> Result<ImportReport> {
    let bytes = std::fs::read(file_path)?;
    let checksum = compute_checksum(&bytes);
    let workbook = Workbook::from_bytes(bytes)?;
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();
    import_workbook(conn, &workbook, &filename, &checksum, opts)
}

pub fn import_workbook(
    conn: &Connection,
    workbook: &Workbook,
    filename: &str,
    checksum: &str,
    opts: &ImportOptions,
) -> Result<ImportReport> {
    let sheet = sheet::locate(workbook, opts.sheet_hint.as_deref(), &opts.sheet_keywords)?;
    let extraction = extractor::extract_sheet(sheet, &opts.dictionary, &opts.extract)?;

    let mut stats = ImportStats {
        rows_total: extraction.rows_total,
        rows_valid: extraction.rows_valid(),
        rows_skipped: extraction.rows_skipped,
        errors: extraction.errors,
        warnings: extraction.warnings,
        ..Default::default()
    };
    let visits = if opts.group_by_key {
        extractor::group_by_key(extraction.records)
    } else {
        extraction.records
    };

    if let Some(previous) = store::find_import_by_checksum(conn, checksum)? {
        let msg = format!(
            "{} was already imported{}; stored visits are matched by customer and arrival time",
            filename,
            previous.imported_at.map(|at| format!(" on {at}")).unwrap_or_default()
        );
        tracing::warn!("{}", msg);
        stats.warnings.push(msg);
    }

    let key = if opts.strict_key { MatchKey::Strict } else { MatchKey::Basic };
    let commit_every = opts.commit_every.filter(|n| *n > 0 && !opts.dry_run);
    let gw = SqliteGateway::new(conn);
    let mut tx = conn.unchecked_transaction()?;

    if opts.mode == ImportMode::ReplaceAll {
        if opts.replace_batch_customers {
            let customers: BTreeSet<&str> = visits.iter().map(|r| r.visit.customer_id.as_str()).collect();
            for customer in customers {
                stats.visits_deleted += gw.delete_customer_visits(customer)?;
            }
        } else {
            stats.visits_deleted = gw.delete_all_visits()?;
        }
        tracing::info!("replace_all: removed {} stored visit(s)", stats.visits_deleted);
    }

    let mut applied = 0usize;
    for record in &visits {
        match in_savepoint(conn, || dedup::apply(&gw, record, opts.mode, key)) {
            Ok(Outcome::Created { items, .. }) => {
                stats.visits_created += 1;
                stats.items_created += items;
            }
            Ok(Outcome::Updated { items, key_changed, .. }) => {
                if key_changed {
                    let msg = format!(
                        "{}: operator or total differs from the stored visit of {} at {}; stored visit updated",
                        record.visit.source_row_ref, record.visit.customer_id, record.visit.visit_start
                    );
                    tracing::warn!("{}", msg);
                    stats.warnings.push(msg);
                }
                stats.visits_updated += 1;
                stats.items_created += items;
            }
            Ok(Outcome::SkippedDuplicate) => stats.visits_skipped += 1,
            Err(SalonError::ConstraintViolation { customer_id, visit_start }) => {
                let msg = format!(
                    "{}: a visit of {customer_id} at {visit_start} is already stored with a different operator or total; row skipped",
                    record.visit.source_row_ref
                );
                tracing::warn!("{}", msg);
                stats.warnings.push(msg);
                stats.visits_skipped += 1;
            }
            Err(e) => return Err(e),
        }
        applied += 1;
        if commit_every.is_some_and(|n| applied % n == 0) {
            tx.commit()?;
            tracing::info!("Committed after {} visit(s)", applied);
            tx = conn.unchecked_transaction()?;
        }
    }

    let report = ImportReport {
        filename: filename.to_string(),
        sheet_name: sheet.name.clone(),
        checksum: checksum.to_string(),
        mode: opts.mode,
        dry_run: opts.dry_run,
        visits,
        stats,
    };

    if opts.dry_run {
        tx.rollback()?;
        tracing::info!("Dry run: rolled back");
    } else {
        store::record_import(conn, &ledger_entry(&report))?;
        tx.commit()?;
    }
    Ok(report)
}

/// Run `f` inside a savepoint, rolling back only its writes on error.
fn in_savepoint<T>(conn: &Connection, f: impl FnOnce() -> Result<T>) -> Result<T> {
    conn.execute_batch("SAVEPOINT visit")?;
    match f() {
        Ok(value) => {
            conn.execute_batch("RELEASE visit")?;
            Ok(value)
        }
        Err(e) => {
            conn.execute_batch("ROLLBACK TO visit; RELEASE visit")?;
            Err(e)
        }
    }
}

fn ledger_entry(report: &ImportReport) -> ImportRecord {
    let s = &report.stats;
    ImportRecord {
        id: None,
        filename: report.filename.clone(),
        checksum: report.checksum.clone(),
        sheet_name: report.sheet_name.clone(),
        mode: report.mode.as_str().to_string(),
        rows_total: s.rows_total as i64,
        rows_valid: s.rows_valid as i64,
        visits_created: s.visits_created as i64,
        visits_updated: s.visits_updated as i64,
        visits_skipped: s.visits_skipped as i64,
        items_created: s.items_created as i64,
        imported_at: None,
    }
}

/// Fold an import result into the user-facing outcome. Structural and
/// persistence failures become `success = false` with the error as message.
pub fn summarize(result: Result<ImportReport>) -> ImportSummary {
    match result {
        Ok(report) => {
            let s = &report.stats;
            let error_preview = s
                .errors
                .iter()
                .take(ERROR_PREVIEW_LIMIT)
                .map(ToString::to_string)
                .collect();
            let verb = if report.dry_run { "Would import" } else { "Imported" };
            ImportSummary {
                success: true,
                message: format!(
                    "{verb} {} new and {} updated visit(s) from sheet '{}' ({} duplicate(s) skipped)",
                    s.visits_created, s.visits_updated, report.sheet_name, s.visits_skipped
                ),
                error_count: s.errors.len(),
                error_preview,
                report: Some(report),
            }
        }
        Err(e) => {
            if e.is_structural() {
                tracing::warn!("Import failed: {}", e);
            } else {
                tracing::error!("Import failed and was rolled back: {}", e);
            }
            ImportSummary {
                success: false,
                message: e.to_string(),
                error_count: 1,
                error_preview: vec![e.to_string()],
                report: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellValue, Sheet};
    use crate::db::test_db;
    use crate::store::{counts, load_visits};

    const HEADER: &[&str] = &[
        "客户ID", "到店时间", "离店时间", "总耗卡次数", "总耗卡金额", "服务满意度", "操作人员",
        "项目内容", "操作美容师", "耗卡金额", "是否指定",
        "项目内容", "操作美容师", "耗卡金额", "是否指定",
    ];

    fn t(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn row(customer: &str, start: &str, operator: &str, first_amount: f64) -> Vec<CellValue> {
        vec![
            t(customer), t(start), t("2023-12-01 21:30"), t("2次"), CellValue::Number(1840.0), t("4.9/5"), t(operator),
            t("Gold RF Tightening"), t("Zhou Jie"), CellValue::Number(first_amount), t("✓"),
            t("Ice Renewal Facial"), t("Wang Fang"), t("480元"), t(""),
        ]
    }

    fn book(rows: Vec<Vec<CellValue>>) -> Workbook {
        let mut all = vec![vec![t("顾客消耗记录表")], HEADER.iter().map(|h| t(h)).collect()];
        all.extend(rows);
        Workbook {
            sheets: vec![Sheet::new("客户信息", Vec::new()), Sheet::new("消耗", all)],
        }
    }

    fn scenario_a() -> Workbook {
        book(vec![row("C003", "2023-12-01 19:00", "Li", 1360.0)])
    }

    fn import(conn: &Connection, wb: &Workbook, opts: &ImportOptions) -> Result<ImportReport> {
        import_workbook(conn, wb, "december.xlsx", "abc123", opts)
    }

    #[test]
    fn test_scenario_a_import() {
        let (_dir, conn) = test_db();
        let report = import(&conn, &scenario_a(), &ImportOptions::default()).unwrap();
        assert_eq!(report.sheet_name, "消耗");
        let s = &report.stats;
        assert_eq!((s.rows_total, s.rows_valid, s.rows_skipped), (1, 1, 0));
        assert_eq!((s.visits_created, s.items_created), (1, 2));
        assert_eq!(report.visits[0].items[1].unit_price, 480.0);

        let stored = load_visits(&conn, Some("C003")).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].visit.operator.as_deref(), Some("Li"));
        let specified: Vec<bool> = stored[0].items.iter().map(|i| i.is_specified).collect();
        assert_eq!(specified, vec![true, false]);
        assert_eq!(counts(&conn).unwrap().imports, 1);
    }

    #[test]
    fn test_reimport_add_only_is_idempotent() {
        let (_dir, conn) = test_db();
        let first = import(&conn, &scenario_a(), &ImportOptions::default()).unwrap();
        let second = import(&conn, &scenario_a(), &ImportOptions::default()).unwrap();
        assert_eq!(second.stats.visits_created, 0);
        assert_eq!(second.stats.visits_skipped, first.stats.visits_created);
        assert_eq!(second.stats.visits_skipped, 1);
        assert!(second.stats.warnings.iter().any(|w| w.contains("already imported")));

        let c = counts(&conn).unwrap();
        assert_eq!((c.visits, c.items, c.imports), (1, 2, 2));
    }

    #[test]
    fn test_update_existing_rewrites_items() {
        let (_dir, conn) = test_db();
        import(&conn, &scenario_a(), &ImportOptions::default()).unwrap();
        let opts = ImportOptions {
            mode: ImportMode::UpdateExisting,
            ..Default::default()
        };
        let wb = book(vec![row("C003", "2023-12-01 19:00", "Li", 999.0)]);
        let report = import(&conn, &wb, &opts).unwrap();
        assert_eq!((report.stats.visits_created, report.stats.visits_updated), (0, 1));

        let stored = load_visits(&conn, None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].items.len(), 2);
        assert_eq!(stored[0].items[0].unit_price, 999.0);
    }

    fn seed_two_customers(conn: &Connection) {
        let wb = book(vec![
            row("C003", "2023-11-20 10:00", "Li", 100.0),
            row("C009", "2023-11-21 10:00", "Li", 100.0),
        ]);
        import(conn, &wb, &ImportOptions::default()).unwrap();
    }

    #[test]
    fn test_replace_all_truncates_stored_visits() {
        let (_dir, conn) = test_db();
        seed_two_customers(&conn);

        let opts = ImportOptions {
            mode: ImportMode::ReplaceAll,
            ..Default::default()
        };
        let report = import(&conn, &scenario_a(), &opts).unwrap();
        assert_eq!(report.stats.visits_deleted, 2);
        assert_eq!(report.stats.visits_created, 1);

        // C009 is absent from the new export, so none of its visits survive
        let stored: Vec<(String, String)> = load_visits(&conn, None)
            .unwrap()
            .iter()
            .map(|r| (r.visit.customer_id.clone(), r.visit.visit_start.format("%Y-%m-%d").to_string()))
            .collect();
        assert_eq!(stored, vec![("C003".to_string(), "2023-12-01".to_string())]);
        assert_eq!(counts(&conn).unwrap().items, 2);
    }

    #[test]
    fn test_replace_all_limited_to_batch_customers() {
        let (_dir, conn) = test_db();
        seed_two_customers(&conn);

        let opts = ImportOptions {
            mode: ImportMode::ReplaceAll,
            replace_batch_customers: true,
            ..Default::default()
        };
        let report = import(&conn, &scenario_a(), &opts).unwrap();
        assert_eq!(report.stats.visits_deleted, 1);
        assert_eq!(load_visits(&conn, Some("C003")).unwrap().len(), 1);
        assert_eq!(load_visits(&conn, Some("C009")).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_all_dry_run_keeps_stored_visits() {
        let (_dir, conn) = test_db();
        seed_two_customers(&conn);
        let opts = ImportOptions {
            mode: ImportMode::ReplaceAll,
            dry_run: true,
            ..Default::default()
        };
        import(&conn, &scenario_a(), &opts).unwrap();
        assert_eq!(counts(&conn).unwrap().visits, 2);
    }

    #[test]
    fn test_strict_key_constraint_clash_counts_as_skip() {
        let (_dir, conn) = test_db();
        import(&conn, &scenario_a(), &ImportOptions::default()).unwrap();
        let opts = ImportOptions {
            strict_key: true,
            ..Default::default()
        };
        let wb = book(vec![row("C003", "2023-12-01 19:00", "Zhang", 1360.0)]);
        let report = import(&conn, &wb, &opts).unwrap();
        assert_eq!(report.stats.visits_skipped, 1);
        assert!(report.stats.errors.is_empty());
        assert!(
            report.stats.warnings.iter().any(|w| w.starts_with("消耗!R3:") && w.contains("different operator")),
            "{:?}",
            report.stats.warnings
        );
        assert_eq!(counts(&conn).unwrap().visits, 1);
    }

    #[test]
    fn test_strict_key_update_applies_corrected_total() {
        let (_dir, conn) = test_db();
        import(&conn, &scenario_a(), &ImportOptions::default()).unwrap();

        let mut corrected = row("C003", "2023-12-01 19:00", "Li", 1360.0);
        corrected[4] = CellValue::Number(1900.0);
        let opts = ImportOptions {
            mode: ImportMode::UpdateExisting,
            strict_key: true,
            ..Default::default()
        };
        let report = import(&conn, &book(vec![corrected]), &opts).unwrap();
        assert_eq!((report.stats.visits_updated, report.stats.visits_skipped), (1, 0));
        assert!(report.stats.warnings.iter().any(|w| w.contains("stored visit updated")));

        let stored = load_visits(&conn, Some("C003")).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].visit.declared_total_amount, Some(1900.0));
    }

    #[test]
    fn test_structural_failure_leaves_store_unchanged() {
        let (_dir, conn) = test_db();
        let wb = Workbook {
            sheets: vec![Sheet::new("客户信息", vec![vec![t("客户ID")]])],
        };
        let summary = summarize(import(&conn, &wb, &ImportOptions::default()));
        assert!(!summary.success);
        assert!(summary.message.contains("客户信息"), "{}", summary.message);
        assert_eq!(counts(&conn).unwrap(), store::StoreCounts::default());

        // Sheet found but no header within the search window.
        let mut rows = vec![vec![t("banner")]; 3];
        rows.push(HEADER.iter().map(|h| t(h)).collect());
        let wb = Workbook { sheets: vec![Sheet::new("消耗", rows)] };
        let err = import(&conn, &wb, &ImportOptions::default()).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_persistence_failure_rolls_back_whole_import() {
        let (_dir, conn) = test_db();
        let mut no_items = row("C001", "2023-12-01 09:00", "Li", 0.0);
        for cell in &mut no_items[7..] {
            *cell = CellValue::Blank;
        }
        let wb = book(vec![no_items, row("C003", "2023-12-01 19:00", "Li", 1360.0)]);
        conn.execute_batch("DROP TABLE line_items").unwrap();

        let summary = summarize(import(&conn, &wb, &ImportOptions::default()));
        assert!(!summary.success);
        let visits: i64 = conn.query_row("SELECT count(*) FROM visits", [], |r| r.get(0)).unwrap();
        assert_eq!(visits, 0);
    }

    #[test]
    fn test_row_errors_are_counted_and_previewed() {
        let (_dir, conn) = test_db();
        let mut rows: Vec<_> = (0..7).map(|i| row(&format!("C{i}"), "not a date", "Li", 1.0)).collect();
        rows.push(row("C003", "2023-12-01 19:00", "Li", 1360.0));
        let summary = summarize(import(&conn, &book(rows), &ImportOptions::default()));
        assert!(summary.success);
        assert_eq!(summary.error_count, 7);
        assert_eq!(summary.error_preview.len(), ERROR_PREVIEW_LIMIT);
        assert_eq!(summary.error_preview[0], "消耗!R3: cannot parse visit_start 'not a date'");
        let stats = &summary.report.unwrap().stats;
        assert_eq!((stats.rows_total, stats.rows_valid, stats.rows_skipped), (8, 1, 7));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (_dir, conn) = test_db();
        let opts = ImportOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = summarize(import(&conn, &scenario_a(), &opts));
        assert!(summary.message.starts_with("Would import 1 new"), "{}", summary.message);
        assert_eq!(counts(&conn).unwrap(), store::StoreCounts::default());
    }

    #[test]
    fn test_periodic_commit() {
        let (_dir, conn) = test_db();
        let rows = (1..=5)
            .map(|d| row("C003", &format!("2023-12-0{d} 19:00"), "Li", 100.0))
            .collect();
        let opts = ImportOptions {
            commit_every: Some(2),
            ..Default::default()
        };
        let report = import(&conn, &book(rows), &opts).unwrap();
        assert_eq!(report.stats.visits_created, 5);
        assert_eq!(counts(&conn).unwrap().visits, 5);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_group_by_key_merges_before_persisting() {
        let (_dir, conn) = test_db();
        let wb = book(vec![
            row("C003", "2023-12-01 19:00", "Li", 100.0),
            row("C003", "2023-12-01 19:00", "Li", 200.0),
        ]);
        let opts = ImportOptions {
            group_by_key: true,
            ..Default::default()
        };
        let report = import(&conn, &wb, &opts).unwrap();
        assert_eq!(report.stats.visits_created, 1);
        assert_eq!(report.stats.items_created, 4);
    }

    #[test]
    fn test_import_xlsx_file() {
        let (dir, conn) = test_db();
        let path = dir.path().join("december.xlsx");
        let mut wb = rust_xlsxwriter::Workbook::new();
        let ws = wb.add_worksheet();
        ws.set_name("消耗记录").unwrap();
        for (col, name) in HEADER.iter().enumerate() {
            ws.write_string(0, col as u16, *name).unwrap();
        }
        ws.write_string(1, 0, "C003").unwrap();
        ws.write_string(1, 1, "2023-12-01 19:00").unwrap();
        ws.write_number(1, 3, 1.0).unwrap();
        ws.write_number(1, 4, 1360.0).unwrap();
        ws.write_string(1, 7, "Gold RF Tightening").unwrap();
        ws.write_string(1, 8, "Zhou Jie").unwrap();
        ws.write_number(1, 9, 1360.0).unwrap();
        ws.write_string(1, 10, "√").unwrap();
        wb.save(&path).unwrap();

        let report = import_file(&conn, &path, &ImportOptions::default()).unwrap();
        assert_eq!(report.filename, "december.xlsx");
        assert_eq!(report.checksum.len(), 64);
        assert_eq!(report.visits[0].visit.source_row_ref, "消耗记录!R2");
        assert_eq!(report.stats.visits_created, 1);
        assert!(report.visits[0].items[0].is_specified);
    }
}
