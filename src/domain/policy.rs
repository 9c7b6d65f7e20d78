// ==========================================
// 需求计划协商系统 - 策略上下文领域模型
// ==========================================
// 职责: 一次运行内只读共享的策略上下文
// 来源: 外部配置协作方 (PolicySource), 缺失时退化为内置默认值
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

/// 默认促销提升上限
pub const DEFAULT_MAX_PROMO_UPLIFT: f64 = 0.5;

/// 默认每周总产能上限
pub const DEFAULT_CAPACITY_LIMIT_TOTAL: f64 = 10_000.0;

/// 默认战略 SKU
pub const DEFAULT_STRATEGIC_SKUS: [&str; 2] = ["SKU_001", "SKU_005"];

// ==========================================
// PolicyConstraints - 硬约束
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConstraints {
    #[serde(default = "default_max_promo_uplift")]
    pub max_promo_uplift: f64,

    #[serde(default = "default_capacity_limit_total")]
    pub capacity_limit_total: f64,

    /// 其他未建模的约束项（原样保留, 供下游展示）
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

fn default_max_promo_uplift() -> f64 {
    DEFAULT_MAX_PROMO_UPLIFT
}

fn default_capacity_limit_total() -> f64 {
    DEFAULT_CAPACITY_LIMIT_TOTAL
}

impl Default for PolicyConstraints {
    fn default() -> Self {
        Self {
            max_promo_uplift: DEFAULT_MAX_PROMO_UPLIFT,
            capacity_limit_total: DEFAULT_CAPACITY_LIMIT_TOTAL,
            extra: BTreeMap::new(),
        }
    }
}

// ==========================================
// EventAnchor / PolicyEvent - 策略事件日历
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventAnchor {
    /// 该 SKU 预测期内第 N 周（按日期排序, 从 0 开始）
    WeekOffset(usize),
    /// 具体日期, 换算为距该 SKU 首个预测日期的整周数
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicyEvent")]
pub struct PolicyEvent {
    pub sku: String,
    pub anchor: EventAnchor,
    pub uplift_pct: f64,
}

impl PolicyEvent {
    pub fn at_offset(sku: &str, week_offset: usize, uplift_pct: f64) -> Self {
        Self {
            sku: sku.to_string(),
            anchor: EventAnchor::WeekOffset(week_offset),
            uplift_pct,
        }
    }

    pub fn on_date(sku: &str, date: NaiveDate, uplift_pct: f64) -> Self {
        Self {
            sku: sku.to_string(),
            anchor: EventAnchor::Date(date),
            uplift_pct,
        }
    }
}

/// 配置中事件的宽松写法: {"SKU": "...", "Uplift": 0.3, "week_offset": 4} 或 {"SKU", "Uplift", "Date"}
#[derive(Debug, Deserialize)]
struct RawPolicyEvent {
    #[serde(alias = "SKU")]
    sku: String,
    #[serde(alias = "Uplift", alias = "uplift")]
    uplift_pct: f64,
    #[serde(default)]
    week_offset: Option<usize>,
    #[serde(default, alias = "Date")]
    date: Option<String>,
}

impl TryFrom<RawPolicyEvent> for PolicyEvent {
    type Error = String;

    fn try_from(raw: RawPolicyEvent) -> Result<Self, Self::Error> {
        let anchor = match (raw.week_offset, raw.date) {
            (Some(offset), _) => EventAnchor::WeekOffset(offset),
            (None, Some(date)) => {
                let trimmed = date.trim();
                let day = trimmed.get(..10).unwrap_or(trimmed);
                let parsed = NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map_err(|e| format!("事件日期格式错误 ({}): {}", date, e))?;
                EventAnchor::Date(parsed)
            }
            (None, None) => return Err(format!("事件缺少 week_offset/Date: sku={}", raw.sku)),
        };

        Ok(PolicyEvent {
            sku: raw.sku,
            anchor,
            uplift_pct: raw.uplift_pct,
        })
    }
}

/// 内置演示事件: SKU_001 第 4 周 +30%, SKU_005 第 1 周 +50%
pub fn default_events() -> Vec<PolicyEvent> {
    vec![
        PolicyEvent::at_offset("SKU_001", 4, 0.3),
        PolicyEvent::at_offset("SKU_005", 1, 0.5),
    ]
}

// ==========================================
// PolicyContext - 策略上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyContext {
    pub priorities: JsonValue,
    pub constraints: PolicyConstraints,
    pub strategic_skus: BTreeSet<String>,
    pub events: Vec<PolicyEvent>,
}

impl Default for PolicyContext {
    fn default() -> Self {
        Self {
            priorities: JsonValue::Object(Default::default()),
            constraints: PolicyConstraints::default(),
            strategic_skus: DEFAULT_STRATEGIC_SKUS.iter().map(|s| s.to_string()).collect(),
            events: default_events(),
        }
    }
}

impl PolicyContext {
    pub fn is_strategic(&self, sku: &str) -> bool {
        self.strategic_skus.contains(sku)
    }

    /// 便于测试/嵌入的构造: 指定战略 SKU 与产能上限, 无事件
    pub fn with_capacity(capacity_limit_total: f64, strategic: &[&str]) -> Self {
        Self {
            priorities: JsonValue::Object(Default::default()),
            constraints: PolicyConstraints {
                capacity_limit_total,
                ..PolicyConstraints::default()
            },
            strategic_skus: strategic.iter().map(|s| s.to_string()).collect(),
            events: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraints_partial_json_uses_defaults() {
        let c: PolicyConstraints = serde_json::from_str(r#"{"capacity_limit_total": 5000}"#).unwrap();
        assert_eq!(c.capacity_limit_total, 5000.0);
        assert_eq!(c.max_promo_uplift, DEFAULT_MAX_PROMO_UPLIFT);

        let c: PolicyConstraints =
            serde_json::from_str(r#"{"max_promo_uplift": 0.2, "min_service_level": 0.95}"#).unwrap();
        assert_eq!(c.max_promo_uplift, 0.2);
        assert_eq!(c.capacity_limit_total, DEFAULT_CAPACITY_LIMIT_TOTAL);
        assert!(c.extra.contains_key("min_service_level"));
    }

    #[test]
    fn test_event_parsing_variants() {
        let events: Vec<PolicyEvent> = serde_json::from_str(
            r#"[
                {"SKU": "SKU_001", "Uplift": 0.3, "week_offset": 4},
                {"SKU": "SKU_002", "Uplift": 0.2, "Date": "2025-03-10"},
                {"sku": "SKU_003", "uplift_pct": 0.1, "Date": "2025-03-10 00:00:00"}
            ]"#,
        )
        .unwrap();

        assert_eq!(events[0].anchor, EventAnchor::WeekOffset(4));
        assert_eq!(
            events[1].anchor,
            EventAnchor::Date(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
        );
        assert_eq!(events[2].sku, "SKU_003");
    }

    #[test]
    fn test_event_without_anchor_is_rejected() {
        let parsed: Result<PolicyEvent, _> = serde_json::from_str(r#"{"SKU": "SKU_001", "Uplift": 0.3}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_default_context() {
        let ctx = PolicyContext::default();
        assert!(ctx.is_strategic("SKU_001"));
        assert!(ctx.is_strategic("SKU_005"));
        assert!(!ctx.is_strategic("SKU_002"));
        assert_eq!(ctx.events.len(), 2);
    }
}
