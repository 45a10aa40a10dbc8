use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::cell::{excel_serial_to_datetime, CellValue};

// Tried in order; the first that parses wins.
const DATETIME_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y年%m月%d日 %H:%M:%S",
    "%Y年%m月%d日 %H:%M",
    "%Y年%m月%d日%H:%M",
    "%Y年%m月%d日 %H时%M分",
];

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Accepted spellings of "yes" for the specified flag, compared after
/// trimming and ASCII lowercasing.
const TRUE_TOKENS: &[&str] = &["✓", "√", "是", "yes", "true", "1", "y"];

fn amount_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[¥￥$,，元\s]").unwrap())
}

fn count_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(?:\.0+)?\s*(?:次|项|个|times?)?$").unwrap())
}

pub fn parse_datetime(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::Blank => None,
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Number(n) => excel_serial_to_datetime(*n),
        CellValue::Text(s) => parse_datetime_str(s),
    }
}

pub fn parse_datetime_str(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Outcome of reading a money cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    Blank,
    Value(f64),
    /// Present but not numeric; callers substitute 0 and warn.
    Invalid,
}

impl Amount {
    pub fn or_zero(self) -> f64 {
        match self {
            Self::Value(v) => v,
            Self::Blank | Self::Invalid => 0.0,
        }
    }
}

pub fn parse_amount(cell: &CellValue) -> Amount {
    match cell {
        CellValue::Blank => Amount::Blank,
        CellValue::Number(n) if n.is_finite() => Amount::Value(*n),
        CellValue::Number(_) | CellValue::DateTime(_) => Amount::Invalid,
        CellValue::Text(s) => parse_amount_str(s),
    }
}

pub fn parse_amount_str(raw: &str) -> Amount {
    let cleaned = amount_noise().replace_all(raw.trim(), "");
    if cleaned.is_empty() {
        return Amount::Blank;
    }
    if let Some(inner) = cleaned.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner
            .parse::<f64>()
            .map(|v| Amount::Value(-v))
            .unwrap_or(Amount::Invalid);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Amount::Value)
        .unwrap_or(Amount::Invalid)
}

/// Whole non-negative count, with an optional unit suffix such as `次`.
pub fn parse_count(cell: &CellValue) -> Option<u32> {
    match cell {
        CellValue::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => u32::try_from(*n as u64).ok(),
        CellValue::Text(s) => count_pattern()
            .captures(&s.trim().to_lowercase())
            .and_then(|caps| caps[1].parse().ok()),
        _ => None,
    }
}

/// Closed-world flag: only the accepted tokens are true; blank is false.
pub fn parse_specified(cell: &CellValue) -> bool {
    match cell {
        CellValue::Number(n) => *n == 1.0,
        CellValue::Text(s) => {
            let token = s.trim().to_ascii_lowercase();
            TRUE_TOKENS.contains(&token.as_str())
        }
        CellValue::Blank | CellValue::DateTime(_) => false,
    }
}

pub fn parse_text(cell: &CellValue) -> Option<String> {
    let s = cell.display();
    (!s.is_empty()).then_some(s)
}
