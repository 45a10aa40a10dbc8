//! Ingestion boundary: spreadsheet bytes in, named sheets of typed cells out.

use std::io::Cursor;

use calamine::{Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::Result;

/// The only cell shapes downstream code has to handle.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn text(s: &str) -> Self {
        if s.trim().is_empty() {
            Self::Blank
        } else {
            Self::Text(s.to_string())
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Blank => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed display form; whole numbers lose their trailing `.0`.
    pub fn display(&self) -> String {
        match self {
            Self::Blank => String::new(),
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Self::DateTime(dt) => dt.format(crate::models::TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => Self::Blank,
            Data::String(s) => Self::text(s),
            Data::Int(i) => Self::Number(*i as f64),
            Data::Float(f) => Self::Number(*f),
            Data::Bool(b) => Self::Text(b.to_string()),
            Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
                Some(parsed) => Self::DateTime(parsed),
                None => Self::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(Self::DateTime)
                .unwrap_or_else(|_| Self::text(s)),
            Data::DurationIso(s) => Self::text(s),
        }
    }
}

/// Excel serial day number to a timestamp, rounded to the second.
/// Epoch is 1899-12-30 (absorbs the 1900 leap-year bug for modern dates).
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let secs = (serial.fract() * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::days(days) + Duration::seconds(secs))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    /// 0-based spreadsheet row of `rows[0]`.
    pub first_row: u32,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.to_string(),
            first_row: 0,
            rows,
        }
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&CellValue::Blank)
    }

    /// `<sheet>!R<n>` with the 1-based spreadsheet row number.
    pub fn row_ref(&self, row: usize) -> String {
        format!("{}!R{}", self.name, self.first_row as usize + row + 1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = match workbook.worksheet_range(&name) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Skipping sheet '{}': {}", name, e);
                    continue;
                }
            };
            let first_row = range.start().map(|(row, _)| row).unwrap_or(0);
            let rows = range
                .rows()
                .map(|row| row.iter().map(CellValue::from).collect())
                .collect();
            sheets.push(Sheet {
                first_row,
                ..Sheet::new(&name, rows)
            });
        }
        tracing::debug!("Loaded {} sheet(s)", sheets.len());
        Ok(Self { sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }
}
