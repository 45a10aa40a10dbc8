//! Where the repeating item groups live in a resolved header.
//!
//! Known layouts are described by a [`ColumnGroupTemplate`] and matched
//! exactly. Only when none matches do we fall back to a sequential scan of
//! the labeled columns.

use crate::dictionary::FieldKey;
use crate::header::{HeaderColumn, ResolvedHeader};

pub const DEFAULT_MAX_GROUPS: usize = 5;

/// Column indexes of one item group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemColumns {
    pub project: usize,
    pub beautician: Option<usize>,
    pub amount: Option<usize>,
    pub specified: Option<usize>,
}

/// Field order inside one fixed-width group, as exported by the salon
/// system's consumption sheet.
const KNOWN_ORDERS: &[(&str, [FieldKey; 4])] = &[(
    "project/beautician/amount/specified",
    [FieldKey::Project, FieldKey::Beautician, FieldKey::Amount, FieldKey::Specified],
)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnGroupTemplate {
    pub name: &'static str,
    /// Column of the first group's project cell.
    pub start: usize,
    pub stride: usize,
    pub beautician_offset: usize,
    pub amount_offset: usize,
    pub specified_offset: usize,
    pub groups: usize,
}

impl ColumnGroupTemplate {
    pub fn columns(&self, width: usize) -> Vec<ItemColumns> {
        let at = |col: usize| (col < width).then_some(col);
        (0..self.groups)
            .map(|g| self.start + g * self.stride)
            .filter(|&project| project < width)
            .map(|project| ItemColumns {
                project,
                beautician: at(project + self.beautician_offset),
                amount: at(project + self.amount_offset),
                specified: at(project + self.specified_offset),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupLayout {
    Template(ColumnGroupTemplate),
    Scanned(Vec<ItemColumns>),
}

impl GroupLayout {
    pub fn columns(&self, width: usize) -> Vec<ItemColumns> {
        match self {
            Self::Template(t) => t.columns(width),
            Self::Scanned(cols) => cols.clone(),
        }
    }
}

pub fn detect(header: &ResolvedHeader, max_groups: usize) -> GroupLayout {
    for (name, order) in KNOWN_ORDERS {
        if let Some(template) = match_template(header, name, order, max_groups) {
            tracing::info!(
                "Item groups: layout '{}' at column {} ({} group(s))",
                template.name,
                template.start + 1,
                template.groups
            );
            return GroupLayout::Template(template);
        }
    }
    let scanned = scan_groups(header, max_groups);
    if scanned.is_empty() {
        tracing::warn!("No item group columns found; visits will have no line items");
    } else {
        tracing::info!("Item groups: no known layout, scanned {} group(s)", scanned.len());
    }
    GroupLayout::Scanned(scanned)
}

/// The first project column starts a stride-4 run whose member columns are
/// either labeled with the expected field or left blank in the header.
fn match_template(
    header: &ResolvedHeader,
    name: &'static str,
    order: &[FieldKey; 4],
    max_groups: usize,
) -> Option<ColumnGroupTemplate> {
    let stride = order.len();
    let start = header.column_of(order[0])?;
    let cols = &header.columns;

    let fits = |col: &HeaderColumn, expected: FieldKey| col.key == Some(expected) || col.synthesized;
    let is_group_head = |col: &HeaderColumn| {
        col.key == Some(order[0])
            || (col.synthesized
                && col
                    .derived_from
                    .and_then(|from| cols.get(from))
                    .is_some_and(|src| src.key == Some(order[0])))
    };

    let mut groups = 0;
    while groups < max_groups {
        let head = start + groups * stride;
        let Some(head_col) = cols.get(head) else { break };
        if !is_group_head(head_col) {
            break;
        }
        let members_fit = order[1..]
            .iter()
            .enumerate()
            .all(|(i, key)| cols.get(head + i + 1).map_or(true, |c| fits(c, *key)));
        if !members_fit {
            break;
        }
        groups += 1;
    }
    // A lone project column with nothing labeled or blank after it is not this layout.
    if groups == 0 || cols.get(start + 1).is_none() {
        return None;
    }
    // Every labeled project column inside the scanned range must be a group head.
    let stray_project = cols.iter().filter(|c| c.key == Some(order[0])).any(|c| {
        let offset = c.index - start;
        offset % stride != 0 || (offset / stride >= groups && offset / stride < max_groups)
    });
    if stray_project {
        return None;
    }

    Some(ColumnGroupTemplate {
        name,
        start,
        stride,
        beautician_offset: 1,
        amount_offset: 2,
        specified_offset: 3,
        groups,
    })
}

/// Walk labeled columns left to right: a project column opens a group, and
/// the next beautician, amount and specified columns attach to it in order.
/// A specified column (or the next project column) closes the group.
pub fn scan_groups(header: &ResolvedHeader, max_groups: usize) -> Vec<ItemColumns> {
    let mut groups = Vec::new();
    let mut current: Option<ItemColumns> = None;

    for col in &header.columns {
        let Some(key) = col.key.filter(FieldKey::is_item_field) else { continue };
        match key {
            FieldKey::Project => {
                if let Some(done) = current.take() {
                    groups.push(done);
                }
                current = Some(ItemColumns {
                    project: col.index,
                    beautician: None,
                    amount: None,
                    specified: None,
                });
            }
            FieldKey::Beautician => {
                if let Some(group) = current.as_mut().filter(|g| g.beautician.is_none()) {
                    group.beautician = Some(col.index);
                }
            }
            FieldKey::Amount => {
                if let Some(group) = current.as_mut().filter(|g| g.amount.is_none()) {
                    group.amount = Some(col.index);
                }
            }
            FieldKey::Specified => {
                if let Some(mut group) = current.take() {
                    group.specified = Some(col.index);
                    groups.push(group);
                }
            }
            _ => {}
        }
    }
    if let Some(done) = current {
        groups.push(done);
    }
    groups.truncate(max_groups);
    groups
}
