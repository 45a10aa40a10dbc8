//! Header synonym table: many spellings, one canonical key.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    CustomerId,
    CustomerName,
    VisitStart,
    VisitEnd,
    ItemCount,
    TotalAmount,
    Satisfaction,
    Operator,
    PaymentMethod,
    Remark,
    Project,
    Beautician,
    Amount,
    Specified,
}

impl FieldKey {
    pub const ALL: &'static [FieldKey] = &[
        Self::CustomerId,
        Self::CustomerName,
        Self::VisitStart,
        Self::VisitEnd,
        Self::ItemCount,
        Self::TotalAmount,
        Self::Satisfaction,
        Self::Operator,
        Self::PaymentMethod,
        Self::Remark,
        Self::Project,
        Self::Beautician,
        Self::Amount,
        Self::Specified,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::CustomerId => "customer_id",
            Self::CustomerName => "customer_name",
            Self::VisitStart => "visit_start",
            Self::VisitEnd => "visit_end",
            Self::ItemCount => "declared_item_count",
            Self::TotalAmount => "declared_total_amount",
            Self::Satisfaction => "satisfaction",
            Self::Operator => "operator",
            Self::PaymentMethod => "payment_method",
            Self::Remark => "remark",
            Self::Project => "project",
            Self::Beautician => "beautician",
            Self::Amount => "amount",
            Self::Specified => "specified",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().find(|k| k.key() == key).copied()
    }

    /// Columns that repeat once per item group.
    pub fn is_item_field(&self) -> bool {
        matches!(self, Self::Project | Self::Beautician | Self::Amount | Self::Specified)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// Declaration order breaks ties between equally long matches.
const SYNONYMS: &[(FieldKey, &[&str])] = &[
    (FieldKey::CustomerId, &["客户ID", "客户编号", "顾客ID", "顾客编号", "会员ID", "会员编号", "customer id", "client id"]),
    (FieldKey::CustomerName, &["客户姓名", "顾客姓名", "会员姓名", "姓名", "customer name"]),
    (FieldKey::VisitStart, &["到店时间", "到店日期", "进店时间", "进店日期", "服务时间", "服务日期", "消耗日期", "消费日期", "arrival", "visit start", "service date", "check in"]),
    (FieldKey::VisitEnd, &["离店时间", "离店日期", "departure", "visit end", "check out"]),
    (FieldKey::ItemCount, &["总消耗项目数", "消耗项目数", "项目总数", "总耗卡次数", "耗卡次数", "消耗数", "总次数", "item count", "sessions"]),
    (FieldKey::TotalAmount, &["总耗卡金额", "总金额", "total amount"]),
    (FieldKey::Satisfaction, &["服务满意度", "项目满意度", "满意度", "satisfaction"]),
    (FieldKey::Operator, &["操作人员", "操作人", "经手人", "录入人", "前台", "operator"]),
    (FieldKey::PaymentMethod, &["支付方式", "付款方式", "payment method"]),
    (FieldKey::Remark, &["备注", "说明", "remark", "notes"]),
    (FieldKey::Project, &["项目内容", "项目名称", "服务项目", "消耗项目", "项目", "project", "treatment"]),
    (FieldKey::Beautician, &["操作美容师", "服务美容师", "美容师", "技师", "beautician", "staff"]),
    (FieldKey::Amount, &["耗卡金额", "项目金额", "单价", "金额", "amount", "price"]),
    (FieldKey::Specified, &["是否指定", "指定", "specified"]),
];

/// Lowercase and drop all whitespace (including full-width spaces).
pub fn normalize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Immutable synonym table. Build once per run and pass by reference.
#[derive(Debug, Clone)]
pub struct FieldDictionary {
    entries: Vec<(FieldKey, Vec<String>)>,
}

impl Default for FieldDictionary {
    fn default() -> Self {
        Self {
            entries: SYNONYMS
                .iter()
                .map(|(key, words)| (*key, words.iter().map(|w| normalize_token(w)).collect()))
                .collect(),
        }
    }
}

impl FieldDictionary {
    /// Built-in table plus extra spellings from settings. Extras are appended
    /// after the built-ins of the same key; unknown keys are ignored with a warning.
    pub fn with_extra(extra: &BTreeMap<String, Vec<String>>) -> Self {
        let mut dict = Self::default();
        for (key, words) in extra {
            let Some(field) = FieldKey::from_key(key) else {
                tracing::warn!("Ignoring synonyms for unknown field '{}'", key);
                continue;
            };
            if let Some((_, list)) = dict.entries.iter_mut().find(|(k, _)| *k == field) {
                list.extend(words.iter().map(|w| normalize_token(w)).filter(|w| !w.is_empty()));
            }
        }
        dict
    }

    /// Longest synonym contained in the header wins; on equal length the key
    /// declared first wins.
    pub fn canonicalize(&self, raw: &str) -> Option<FieldKey> {
        let token = normalize_token(raw);
        if token.is_empty() {
            return None;
        }
        let mut best: Option<(FieldKey, usize)> = None;
        for (key, words) in &self.entries {
            for word in words {
                if !token.contains(word.as_str()) {
                    continue;
                }
                let len = word.chars().count();
                if best.map_or(true, |(_, best_len)| len > best_len) {
                    best = Some((*key, len));
                }
            }
        }
        best.map(|(key, _)| key)
    }
}
