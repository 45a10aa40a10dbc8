use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalonError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("No visit sheet found (sheets: {})", .available.join(", "))]
    SheetNotFound { available: Vec<String> },

    #[error("No header row with a customer id column in the first {searched} rows of '{sheet}'")]
    HeaderNotFound { sheet: String, searched: usize },

    #[error("Sheet '{sheet}' has no {field} column")]
    MissingColumn { sheet: String, field: &'static str },

    #[error("Visit already stored for customer {customer_id} at {visit_start}")]
    ConstraintViolation {
        customer_id: String,
        visit_start: String,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl SalonError {
    /// Sheet/header failures: the workbook cannot be read as a visit log at all.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::SheetNotFound { .. } | Self::HeaderNotFound { .. } | Self::MissingColumn { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SalonError>;

/// A problem confined to one data row. The row is skipped and the import goes on.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub source_row_ref: String,
    pub kind: RowErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowErrorKind {
    DateParse { field: &'static str, raw: String },
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RowErrorKind::DateParse { field, raw } => {
                write!(f, "{}: cannot parse {field} '{raw}'", self.source_row_ref)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        let sheet = SalonError::SheetNotFound { available: vec!["Sheet1".into()] };
        let header = SalonError::HeaderNotFound { sheet: "消耗".into(), searched: 3 };
        let column = SalonError::MissingColumn { sheet: "消耗".into(), field: "visit_start" };
        let other = SalonError::Other("boom".into());
        assert!(sheet.is_structural());
        assert!(header.is_structural());
        assert!(column.is_structural());
        assert!(!other.is_structural());
    }

    #[test]
    fn test_messages() {
        let e = SalonError::SheetNotFound { available: vec!["客户".into(), "Sheet2".into()] };
        assert_eq!(e.to_string(), "No visit sheet found (sheets: 客户, Sheet2)");

        let e = SalonError::MissingColumn { sheet: "消耗".into(), field: "visit_start" };
        assert_eq!(e.to_string(), "Sheet '消耗' has no visit_start column");

        let row = RowError {
            source_row_ref: "消耗!R4".into(),
            kind: RowErrorKind::DateParse { field: "visit_start", raw: "yesterday".into() },
        };
        assert_eq!(row.to_string(), "消耗!R4: cannot parse visit_start 'yesterday'");
    }
}
