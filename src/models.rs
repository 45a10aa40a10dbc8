use chrono::NaiveDateTime;

/// Storage format for every timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub id: Option<i64>,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub visit_start: NaiveDateTime,
    pub visit_end: Option<NaiveDateTime>,
    pub declared_item_count: u32,
    pub declared_total_amount: Option<f64>,
    pub satisfaction: Option<String>,
    pub operator: Option<String>,
    pub payment_method: Option<String>,
    pub remark: Option<String>,
    pub source_row_ref: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub id: Option<i64>,
    pub ordinal: u32,
    pub project_name: String,
    pub beautician_name: Option<String>,
    pub unit_price: f64,
    pub is_specified: bool,
    pub is_inferred: bool,
}

/// One extracted row: a visit with its items in column-group order.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRecord {
    pub visit: Visit,
    pub items: Vec<LineItem>,
}

impl VisitRecord {
    pub fn key(&self) -> (&str, NaiveDateTime) {
        (self.visit.customer_id.as_str(), self.visit.visit_start)
    }
}

/// One row of the import ledger.
#[derive(Debug, Clone, Default)]
pub struct ImportRecord {
    pub id: Option<i64>,
    pub filename: String,
    pub checksum: String,
    pub sheet_name: String,
    pub mode: String,
    pub rows_total: i64,
    pub rows_valid: i64,
    pub visits_created: i64,
    pub visits_updated: i64,
    pub visits_skipped: i64,
    pub items_created: i64,
    pub imported_at: Option<String>,
}
