use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::cell::Sheet;
use crate::dictionary::{FieldDictionary, FieldKey};
use crate::error::{Result, RowError, RowErrorKind, SalonError};
use crate::header::{self, ResolvedHeader, DEFAULT_HEADER_ROWS};
use crate::layout::{self, ItemColumns, DEFAULT_MAX_GROUPS};
use crate::models::{LineItem, Visit, VisitRecord};
use crate::normalize::{self, Amount};

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub header_rows: usize,
    pub max_groups: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            header_rows: DEFAULT_HEADER_ROWS,
            max_groups: DEFAULT_MAX_GROUPS,
        }
    }
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<VisitRecord>,
    /// Data rows below the header.
    pub rows_total: usize,
    /// Padding rows plus rejected rows.
    pub rows_skipped: usize,
    pub errors: Vec<RowError>,
    pub warnings: Vec<String>,
}

impl Extraction {
    pub fn rows_valid(&self) -> usize {
        self.records.len()
    }
}

/// Columns of the per-visit fields, looked up once per sheet.
#[derive(Debug, Clone, Copy, Default)]
struct BaseColumns {
    customer_id: Option<usize>,
    customer_name: Option<usize>,
    visit_start: Option<usize>,
    visit_end: Option<usize>,
    item_count: Option<usize>,
    total_amount: Option<usize>,
    satisfaction: Option<usize>,
    operator: Option<usize>,
    payment_method: Option<usize>,
    remark: Option<usize>,
}

impl BaseColumns {
    fn from_header(header: &ResolvedHeader) -> Self {
        Self {
            customer_id: header.column_of(FieldKey::CustomerId),
            customer_name: header.column_of(FieldKey::CustomerName),
            visit_start: header.column_of(FieldKey::VisitStart),
            visit_end: header.column_of(FieldKey::VisitEnd),
            item_count: header.column_of(FieldKey::ItemCount),
            total_amount: header.column_of(FieldKey::TotalAmount),
            satisfaction: header.column_of(FieldKey::Satisfaction),
            operator: header.column_of(FieldKey::Operator),
            payment_method: header.column_of(FieldKey::PaymentMethod),
            remark: header.column_of(FieldKey::Remark),
        }
    }
}

enum RowOutcome {
    Record(VisitRecord),
    Padding,
    Rejected(RowError),
}

/// Resolve the header and item-group layout of `sheet`, then extract every data row.
/// A header without an arrival column is a structural error.
pub fn extract_sheet(sheet: &Sheet, dict: &FieldDictionary, options: &ExtractOptions) -> Result<Extraction> {
    let header = header::resolve(sheet, dict, options.header_rows)?;
    if header.column_of(FieldKey::VisitStart).is_none() {
        return Err(SalonError::MissingColumn {
            sheet: sheet.name.clone(),
            field: FieldKey::VisitStart.key(),
        });
    }
    let groups = layout::detect(&header, options.max_groups).columns(header.columns.len());
    Ok(extract(sheet, &header, &groups, options.max_groups))
}

pub fn extract(sheet: &Sheet, header: &ResolvedHeader, groups: &[ItemColumns], max_groups: usize) -> Extraction {
    let base = BaseColumns::from_header(header);
    let groups = &groups[..groups.len().min(max_groups)];

    let mut out = Extraction::default();
    for row in header.data_start()..sheet.rows.len() {
        out.rows_total += 1;
        match extract_row(sheet, row, &base, groups, &mut out.warnings) {
            RowOutcome::Record(record) => out.records.push(record),
            RowOutcome::Padding => out.rows_skipped += 1,
            RowOutcome::Rejected(err) => {
                tracing::warn!("Rejected row: {}", err);
                out.rows_skipped += 1;
                out.errors.push(err);
            }
        }
    }
    tracing::info!(
        "Extracted {} visit(s) from {} row(s) of '{}' ({} skipped, {} error(s))",
        out.records.len(),
        out.rows_total,
        sheet.name,
        out.rows_skipped,
        out.errors.len()
    );
    out
}

fn extract_row(
    sheet: &Sheet,
    row: usize,
    base: &BaseColumns,
    groups: &[ItemColumns],
    warnings: &mut Vec<String>,
) -> RowOutcome {
    let cell = |col: Option<usize>| col.map(|c| sheet.cell(row, c));
    let text = |col: Option<usize>| cell(col).and_then(normalize::parse_text);
    let row_ref = sheet.row_ref(row);
    let mut warn = |msg: String| {
        tracing::warn!("{}", msg);
        warnings.push(msg);
    };

    let Some(customer_id) = text(base.customer_id) else {
        return RowOutcome::Padding;
    };
    let Some(start_cell) = cell(base.visit_start).filter(|c| !c.is_blank()) else {
        return RowOutcome::Padding;
    };
    let Some(visit_start) = normalize::parse_datetime(start_cell) else {
        return RowOutcome::Rejected(RowError {
            source_row_ref: row_ref,
            kind: RowErrorKind::DateParse {
                field: FieldKey::VisitStart.key(),
                raw: start_cell.display(),
            },
        });
    };

    let visit_end = match cell(base.visit_end).filter(|c| !c.is_blank()) {
        None => None,
        Some(end_cell) => {
            let parsed = normalize::parse_datetime(end_cell);
            if parsed.is_none() {
                warn(format!("{row_ref}: cannot parse visit_end '{}', leaving it empty", end_cell.display()));
            }
            parsed
        }
    };

    let declared_total_amount = match cell(base.total_amount).map(normalize::parse_amount) {
        None | Some(Amount::Blank) => None,
        Some(Amount::Value(v)) => Some(v),
        Some(Amount::Invalid) => {
            warn(format!(
                "{row_ref}: total amount '{}' is not a number, using 0",
                cell(base.total_amount).map(|c| c.display()).unwrap_or_default()
            ));
            Some(0.0)
        }
    };

    let mut items = Vec::new();
    for (ordinal, group) in groups.iter().enumerate() {
        let Some(project_name) = normalize::parse_text(sheet.cell(row, group.project)) else {
            continue;
        };
        let unit_price = match cell(group.amount).map(normalize::parse_amount) {
            Some(Amount::Invalid) => {
                warn(format!(
                    "{row_ref}: amount '{}' for '{project_name}' is not a number, using 0",
                    cell(group.amount).map(|c| c.display()).unwrap_or_default()
                ));
                0.0
            }
            other => other.map_or(0.0, Amount::or_zero),
        };
        items.push(LineItem {
            id: None,
            ordinal: ordinal as u32,
            project_name,
            beautician_name: text(group.beautician),
            unit_price,
            is_specified: cell(group.specified).is_some_and(normalize::parse_specified),
            is_inferred: false,
        });
    }

    let declared_item_count = match cell(base.item_count).and_then(normalize::parse_count) {
        None | Some(0) => items.len() as u32,
        Some(n) => {
            if n as usize != items.len() {
                warn(format!("{row_ref}: declared item count {n} differs from {} item(s) found", items.len()));
            }
            n
        }
    };

    RowOutcome::Record(VisitRecord {
        visit: Visit {
            id: None,
            customer_id,
            customer_name: text(base.customer_name),
            visit_start,
            visit_end,
            declared_item_count,
            declared_total_amount,
            satisfaction: text(base.satisfaction),
            operator: text(base.operator),
            payment_method: text(base.payment_method),
            remark: text(base.remark),
            source_row_ref: row_ref,
        },
        items,
    })
}

/// Merge records sharing (customer_id, visit_start) into one visit, keeping
/// first-seen order. Items are concatenated and renumbered; declared counts
/// and totals are summed.
pub fn group_by_key(records: Vec<VisitRecord>) -> Vec<VisitRecord> {
    let mut index: HashMap<(String, NaiveDateTime), usize> = HashMap::new();
    let mut merged: Vec<VisitRecord> = Vec::new();

    for record in records {
        let key = (record.visit.customer_id.clone(), record.visit.visit_start);
        match index.get(&key) {
            Some(&i) => {
                let target = &mut merged[i];
                target.visit.declared_item_count += record.visit.declared_item_count;
                target.visit.declared_total_amount = match (target.visit.declared_total_amount, record.visit.declared_total_amount) {
                    (None, None) => None,
                    (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
                };
                if target.visit.visit_end.is_none() {
                    target.visit.visit_end = record.visit.visit_end;
                }
                target.items.extend(record.items);
            }
            None => {
                index.insert(key, merged.len());
                merged.push(record);
            }
        }
    }
    for record in &mut merged {
        for (ordinal, item) in record.items.iter_mut().enumerate() {
            item.ordinal = ordinal as u32;
        }
    }
    merged
}
