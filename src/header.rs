use std::collections::HashMap;

use crate::cell::Sheet;
use crate::dictionary::{FieldDictionary, FieldKey};
use crate::error::{Result, SalonError};

pub const DEFAULT_HEADER_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderColumn {
    pub index: usize,
    /// Unique column name; synthesized for blank header cells.
    pub name: String,
    pub key: Option<FieldKey>,
    /// Blank header cell named by position.
    pub synthesized: bool,
    /// For a synthesized column, the labeled column it was named after.
    pub derived_from: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHeader {
    /// Row index (within the sheet) of the header; data starts on the next row.
    pub row: usize,
    pub columns: Vec<HeaderColumn>,
}

impl ResolvedHeader {
    /// First column carrying `key`.
    pub fn column_of(&self, key: FieldKey) -> Option<usize> {
        self.columns.iter().find(|c| c.key == Some(key)).map(|c| c.index)
    }

    pub fn data_start(&self) -> usize {
        self.row + 1
    }
}

/// Find the header row among the first `max_rows` rows: the first row with a
/// cell that canonicalizes to the customer id.
pub fn resolve(sheet: &Sheet, dict: &FieldDictionary, max_rows: usize) -> Result<ResolvedHeader> {
    let row = sheet
        .rows
        .iter()
        .take(max_rows)
        .position(|cells| {
            cells
                .iter()
                .any(|c| !c.is_blank() && dict.canonicalize(&c.display()) == Some(FieldKey::CustomerId))
        })
        .ok_or_else(|| SalonError::HeaderNotFound {
            sheet: sheet.name.clone(),
            searched: max_rows,
        })?;

    let columns = build_columns(sheet, row, dict);
    tracing::info!(
        "Header at {} with {} column(s): {:?}",
        sheet.row_ref(row),
        columns.len(),
        columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
    );
    Ok(ResolvedHeader { row, columns })
}

fn build_columns(sheet: &Sheet, row: usize, dict: &FieldDictionary) -> Vec<HeaderColumn> {
    let width = sheet.width();
    let mut columns = Vec::with_capacity(width);
    let mut last_labeled: Option<(usize, String)> = None;
    let mut seen: HashMap<String, usize> = HashMap::new();

    for index in 0..width {
        let cell = sheet.cell(row, index);
        let column = if cell.is_blank() {
            match &last_labeled {
                Some((from, label)) => HeaderColumn {
                    index,
                    name: format!("{label}+{}", index - from),
                    key: None,
                    synthesized: true,
                    derived_from: Some(*from),
                },
                None => HeaderColumn {
                    index,
                    name: format!("column_{}", index + 1),
                    key: None,
                    synthesized: true,
                    derived_from: None,
                },
            }
        } else {
            let label = cell.display();
            let occurrence = seen.entry(label.clone()).or_insert(0);
            *occurrence += 1;
            let name = if *occurrence == 1 {
                label.clone()
            } else {
                format!("{label}#{occurrence}")
            };
            last_labeled = Some((index, name.clone()));
            HeaderColumn {
                index,
                name,
                key: dict.canonicalize(&label),
                synthesized: false,
                derived_from: None,
            }
        };
        columns.push(column);
    }
    columns
}
