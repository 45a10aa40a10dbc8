//! Add, update or skip one extracted visit against the store.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Visit, VisitRecord};
use crate::store::PersistenceGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Skip visits already stored.
    #[default]
    AddOnly,
    /// Replace the items and mutable fields of visits already stored.
    UpdateExisting,
    /// Delete every stored visit first (or only the batch's customers, when asked).
    ReplaceAll,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddOnly => "add_only",
            Self::UpdateExisting => "update_existing",
            Self::ReplaceAll => "replace_all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchKey {
    /// (customer_id, visit_start)
    #[default]
    Basic,
    /// Basic key plus operator and declared total, where both sides have them.
    Strict,
}

impl MatchKey {
    fn matches(&self, stored: &Visit, incoming: &Visit) -> bool {
        match self {
            Self::Basic => true,
            Self::Strict => {
                let same_operator = match (&stored.operator, &incoming.operator) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                };
                let same_total = match (stored.declared_total_amount, incoming.declared_total_amount) {
                    (Some(a), Some(b)) => (a - b).abs() < 0.005,
                    _ => true,
                };
                same_operator && same_total
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created { visit_id: i64, items: usize },
    /// `key_changed`: the stored visit failed the strict key (operator or
    /// total differed) and was overwritten through its basic key.
    Updated { visit_id: i64, items: usize, key_changed: bool },
    SkippedDuplicate,
}

/// Decide and apply one visit. `ReplaceAll` behaves like `AddOnly` here:
/// the importer clears the store before the first call.
///
/// A strict-key miss under `AddOnly` still attempts the insert, which the
/// store's unique key rejects with [`SalonError::ConstraintViolation`].
/// Under `UpdateExisting` the basic-key match is updated instead, since the
/// store cannot hold a second visit with the same customer and arrival time.
///
/// [`SalonError::ConstraintViolation`]: crate::error::SalonError::ConstraintViolation
pub fn apply<G: PersistenceGateway>(gw: &G, record: &VisitRecord, mode: ImportMode, key: MatchKey) -> Result<Outcome> {
    let (customer_id, visit_start) = record.key();
    let stored = gw.find_visit(customer_id, visit_start)?;
    let key_changed = stored.as_ref().is_some_and(|s| !key.matches(s, &record.visit));

    match (stored, mode) {
        (Some(stored), ImportMode::UpdateExisting) => {
            let visit_id = stored.id.unwrap_or_default();
            gw.delete_items(visit_id)?;
            let visit = Visit {
                id: Some(visit_id),
                ..record.visit.clone()
            };
            gw.upsert_visit(&visit, &record.items)?;
            tracing::debug!("Updated visit {} ({} at {})", visit_id, customer_id, visit_start);
            Ok(Outcome::Updated {
                visit_id,
                items: record.items.len(),
                key_changed,
            })
        }
        (Some(_), _) if !key_changed => Ok(Outcome::SkippedDuplicate),
        _ => {
            let visit_id = gw.upsert_visit(&record.visit, &record.items)?;
            Ok(Outcome::Created {
                visit_id,
                items: record.items.len(),
            })
        }
    }
}
