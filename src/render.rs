//! One stored visit as a fixed-column report row.

use crate::fmt;
use crate::models::{LineItem, Visit};

/// Item-detail cells per row; extra items are dropped, missing ones blank.
pub const ITEM_CELLS: usize = 5;

pub const BASE_COLUMNS: [&str; 5] = ["Arrival", "Departure", "Items", "Total", "Satisfaction"];

const ROW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn column_names() -> Vec<String> {
    BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain((1..=ITEM_CELLS).map(|i| format!("Item {i}")))
        .collect()
}

/// `project - beautician - <price><currency> - specified|unspecified`.
/// A missing beautician drops its segment: `project - <price><currency> - ...`.
pub fn item_cell(item: &LineItem, currency: &str) -> String {
    let mut parts = vec![item.project_name.clone()];
    if let Some(who) = item.beautician_name.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
        parts.push(who.to_string());
    }
    parts.push(format!("{}{}", fmt::amount(item.unit_price), currency));
    parts.push(if item.is_specified { "specified" } else { "unspecified" }.to_string());
    parts.join(" - ")
}

/// Always `BASE_COLUMNS.len() + ITEM_CELLS` cells. Items are taken in ordinal
/// order, so the first five column groups survive.
pub fn render_visit(visit: &Visit, items: &[LineItem], currency: &str) -> Vec<String> {
    let mut ordered: Vec<&LineItem> = items.iter().collect();
    ordered.sort_by_key(|i| i.ordinal);

    let count = if visit.declared_item_count > 0 {
        visit.declared_item_count as usize
    } else {
        items.len()
    };
    let mut row = vec![
        visit.visit_start.format(ROW_TIME_FORMAT).to_string(),
        visit
            .visit_end
            .map(|t| t.format(ROW_TIME_FORMAT).to_string())
            .unwrap_or_default(),
        count.to_string(),
        visit.declared_total_amount.map(fmt::amount).unwrap_or_default(),
        visit.satisfaction.clone().unwrap_or_default(),
    ];
    row.extend(
        ordered
            .iter()
            .map(|item| item_cell(item, currency))
            .chain(std::iter::repeat(String::new()))
            .take(ITEM_CELLS),
    );
    row
}
