use crate::cell::{Sheet, Workbook};
use crate::error::{Result, SalonError};

pub const DEFAULT_SHEET_KEYWORDS: &[&str] = &[
    "消耗",
    "消耗记录",
    "服务记录",
    "服务明细",
    "consumption",
    "service records",
    "visits",
];

/// Pick the worksheet holding visit rows.
///
/// A hint is authoritative: exact name, then case-insensitive containment,
/// otherwise `SheetNotFound`. Without a hint, keywords are tried in rank
/// order; within one keyword an exact name beats a containment match.
pub fn locate<'w>(workbook: &'w Workbook, hint: Option<&str>, keywords: &[String]) -> Result<&'w Sheet> {
    let not_found = || SalonError::SheetNotFound {
        available: workbook.sheet_names(),
    };

    if let Some(hint) = hint {
        let hint = hint.trim();
        if let Some(sheet) = workbook.sheets.iter().find(|s| s.name == hint) {
            return Ok(sheet);
        }
        let lowered = hint.to_lowercase();
        return workbook
            .sheets
            .iter()
            .find(|s| s.name.to_lowercase().contains(&lowered))
            .ok_or_else(not_found);
    }

    for keyword in keywords {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        let exact = workbook
            .sheets
            .iter()
            .find(|s| s.name.trim().to_lowercase() == keyword);
        let found = exact.or_else(|| {
            workbook
                .sheets
                .iter()
                .find(|s| s.name.to_lowercase().contains(&keyword))
        });
        if let Some(sheet) = found {
            tracing::info!("Using sheet '{}' (keyword '{}')", sheet.name, keyword);
            return Ok(sheet);
        }
    }
    Err(not_found())
}

pub fn default_keywords() -> Vec<String> {
    DEFAULT_SHEET_KEYWORDS.iter().map(|s| s.to_string()).collect()
}
