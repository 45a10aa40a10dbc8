//! Best-effort repair of stored line items with a missing project or
//! beautician. Every repaired item is flagged `is_inferred`; the filled
//! values are approximations, not source data.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapFillConfig {
    /// Price bucket (one decimal, e.g. `"480.0"`) to project name.
    pub price_names: BTreeMap<String, String>,
    /// Assigned to unnamed items by ordinal, round robin.
    pub roster: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapFillResult {
    pub projects_filled: usize,
    pub beauticians_filled: usize,
    pub prices_derived: usize,
}

struct Gap {
    id: i64,
    ordinal: u32,
    project_missing: bool,
    beautician_missing: bool,
    unit_price: Option<f64>,
    declared_total: Option<f64>,
    declared_count: u32,
    item_count: u32,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn price_bucket(price: f64) -> String {
    format!("{:.1}", round1(price))
}

pub fn placeholder_name(price: f64) -> String {
    format!("Unnamed project ({})", price_bucket(price))
}

/// Visit total spread evenly over its items.
fn derived_price(gap: &Gap) -> Option<f64> {
    let count = if gap.declared_count > 0 { gap.declared_count } else { gap.item_count };
    match gap.declared_total {
        Some(total) if count > 0 => Some(round1(total / count as f64)),
        _ => None,
    }
}

pub fn fill_gaps(conn: &Connection, config: &GapFillConfig) -> Result<GapFillResult> {
    let use_roster = !config.roster.is_empty();
    let gaps = {
        let mut stmt = conn.prepare(
            "SELECT li.id, li.ordinal,
                    li.project_name IS NULL OR trim(li.project_name) = '',
                    li.beautician_name IS NULL OR trim(li.beautician_name) = '',
                    li.unit_price, v.declared_total_amount, v.declared_item_count,
                    (SELECT count(*) FROM line_items x WHERE x.visit_id = li.visit_id)
             FROM line_items li JOIN visits v ON v.id = li.visit_id
             WHERE li.project_name IS NULL OR trim(li.project_name) = ''
                OR (?1 AND (li.beautician_name IS NULL OR trim(li.beautician_name) = ''))
             ORDER BY li.visit_id, li.ordinal",
        )?;
        let rows = stmt.query_map([use_roster], |row| {
            Ok(Gap {
                id: row.get(0)?,
                ordinal: row.get(1)?,
                project_missing: row.get(2)?,
                beautician_missing: row.get(3)?,
                unit_price: row.get(4)?,
                declared_total: row.get(5)?,
                declared_count: row.get(6)?,
                item_count: row.get(7)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let tx = conn.unchecked_transaction()?;
    let mut result = GapFillResult::default();
    for gap in &gaps {
        if gap.project_missing {
            let stored = gap.unit_price.filter(|p| *p > 0.0);
            let price = match stored {
                Some(p) => p,
                None => match derived_price(gap) {
                    Some(p) => {
                        tx.execute("UPDATE line_items SET unit_price = ?1 WHERE id = ?2", params![p, gap.id])?;
                        result.prices_derived += 1;
                        p
                    }
                    None => 0.0,
                },
            };
            let name = config
                .price_names
                .get(&price_bucket(price))
                .cloned()
                .unwrap_or_else(|| placeholder_name(price));
            tx.execute(
                "UPDATE line_items SET project_name = ?1, is_inferred = 1 WHERE id = ?2",
                params![name, gap.id],
            )?;
            result.projects_filled += 1;
        }
        if gap.beautician_missing && use_roster {
            let who = &config.roster[gap.ordinal as usize % config.roster.len()];
            tx.execute(
                "UPDATE line_items SET beautician_name = ?1, is_inferred = 1 WHERE id = ?2",
                params![who, gap.id],
            )?;
            result.beauticians_filled += 1;
        }
    }
    tx.commit()?;
    tracing::info!(
        "Gap fill: {} project(s), {} beautician(s), {} price(s) derived",
        result.projects_filled,
        result.beauticians_filled,
        result.prices_derived
    );
    Ok(result)
}
