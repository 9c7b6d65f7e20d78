// ==========================================
// 需求计划协商系统 - 分群引擎
// ==========================================
// 职责: 计算每 SKU 的 cv / zero_proportion, 按固定优先级分群并生成 Playbook
// 红线: 判定顺序固定 (先命中先生效), 每个 SKU 恰好一份 Playbook
//       分群是 (cv, zero_proportion) 的纯函数, 无跨 SKU 状态
// ==========================================

use crate::advisory::{AdvisedStage, AdvisoryError, AdvisoryResult, ToolCall, ToolSpec};
use crate::domain::playbook::{Playbook, SkuMetrics};
use crate::domain::policy::PolicyContext;
use crate::domain::sales::CleanedRecord;
use crate::domain::types::Segment;
use crate::engine::stats::{mean, sample_std};
use std::collections::BTreeMap;
use tracing::info;

/// zero_proportion 超过该值判为间歇型
pub const INTERMITTENT_ZERO_SHARE: f64 = 0.5;

/// cv 低于该值判为稳定季节型
pub const STABLE_CV_CEILING: f64 = 0.3;

/// 分群规则
///
/// 1) zero_proportion > 0.5 -> intermittent
/// 2) cv < 0.3 -> stable_seasonal（cv 无定义时不命中）
/// 3) 其余 -> promo_sensitive
pub fn classify(zero_proportion: f64, cv: Option<f64>) -> Segment {
    if zero_proportion > INTERMITTENT_ZERO_SHARE {
        return Segment::Intermittent;
    }
    match cv {
        Some(cv) if cv < STABLE_CV_CEILING => Segment::StableSeasonal,
        _ => Segment::PromoSensitive,
    }
}

/// 计算全部 SKU 的分群指标（基于 Sales_Cleaned, 样本标准差）
pub fn compute_metrics(records: &[CleanedRecord]) -> BTreeMap<String, SkuMetrics> {
    let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        series.entry(record.sku()).or_default().push(record.sales_cleaned);
    }

    series
        .into_iter()
        .map(|(sku, values)| (sku.to_string(), sku_metrics(sku, &values)))
        .collect()
}

fn sku_metrics(sku: &str, values: &[f64]) -> SkuMetrics {
    let n = values.len();
    let mean_sales = mean(values);
    let std_sales = sample_std(values);
    let zero_proportion = if n == 0 {
        0.0
    } else {
        values.iter().filter(|v| **v == 0.0).count() as f64 / n as f64
    };
    let cv = match std_sales {
        Some(std) if mean_sales != 0.0 => Some(std / mean_sales).filter(|cv| cv.is_finite()),
        _ => None,
    };

    SkuMetrics {
        sku: sku.to_string(),
        observations: n,
        mean_sales,
        std_sales,
        zero_proportion,
        cv,
    }
}

// ==========================================
// 输出 / 动作
// ==========================================

#[derive(Debug, Clone, Default)]
pub struct SegmentationOutput {
    pub playbooks: BTreeMap<String, Playbook>,
    pub metrics: BTreeMap<String, SkuMetrics>,
    pub notes: Vec<String>,
}

impl SegmentationOutput {
    /// SKU -> Segment 映射
    pub fn segments(&self) -> BTreeMap<String, Segment> {
        self.playbooks
            .iter()
            .map(|(sku, p)| (sku.clone(), p.segment))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SegmenterAction {
    AssignSegment { sku: String, segment: Segment },
}

// ==========================================
// Segmenter
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Segmenter;

impl Segmenter {
    pub fn new() -> Self {
        Self
    }

    /// 确定性决策
    pub fn decide(&self, records: &[CleanedRecord], policy: &PolicyContext) -> SegmentationOutput {
        self.apply(records, policy, &[])
    }

    /// 执行分群; 建议的分配只有与规则结果一致时才被接受
    pub fn apply(
        &self,
        records: &[CleanedRecord],
        policy: &PolicyContext,
        actions: &[SegmenterAction],
    ) -> SegmentationOutput {
        let metrics = compute_metrics(records);
        let mut notes = Vec::new();
        let mut playbooks = BTreeMap::new();

        // 1. 建议分配（受检）
        for action in actions {
            let SegmenterAction::AssignSegment { sku, segment } = action;
            let Some(m) = metrics.get(sku) else {
                notes.push(format!("[Segmenter] 拒绝建议: 未知 SKU {}", sku));
                continue;
            };
            let expected = classify(m.zero_proportion, m.cv);
            if *segment == expected {
                playbooks.insert(
                    sku.clone(),
                    Playbook::for_segment(sku, expected, policy.is_strategic(sku)),
                );
            } else {
                notes.push(format!(
                    "[Segmenter] 拒绝建议: {} -> {} 与规则结果 {} 不一致",
                    sku, segment, expected
                ));
            }
        }

        let advised = playbooks.len();

        // 2. 未覆盖的 SKU 走规则
        for (sku, m) in &metrics {
            playbooks.entry(sku.clone()).or_insert_with(|| {
                Playbook::for_segment(
                    sku,
                    classify(m.zero_proportion, m.cv),
                    policy.is_strategic(sku),
                )
            });
        }

        if !actions.is_empty() && advised < playbooks.len() {
            notes.push(format!(
                "[Segmenter] FALLBACK: {} SKU(s) assigned by rule",
                playbooks.len() - advised
            ));
        }

        let mut counts: BTreeMap<Segment, usize> = BTreeMap::new();
        for p in playbooks.values() {
            *counts.entry(p.segment).or_default() += 1;
        }
        let summary: Vec<String> = counts
            .iter()
            .map(|(segment, n)| format!("{}={}", segment, n))
            .collect();
        notes.push(format!(
            "[Segmenter] {} SKU(s) segmented ({})",
            playbooks.len(),
            summary.join(", ")
        ));

        info!(
            sku_count = playbooks.len(),
            advised_count = advised,
            "分群完成"
        );

        SegmentationOutput {
            playbooks,
            metrics,
            notes,
        }
    }

    pub fn prompt(metrics: &BTreeMap<String, SkuMetrics>) -> String {
        let mut lines = vec![
            "Here are the metrics for the SKUs (sku, mean_sales, std_sales, zero_proportion, cv):"
                .to_string(),
        ];
        for m in metrics.values() {
            lines.push(format!(
                "{}, {:.3}, {}, {:.3}, {}",
                m.sku,
                m.mean_sales,
                m.std_sales.map(|s| format!("{:.3}", s)).unwrap_or_else(|| "NaN".to_string()),
                m.zero_proportion,
                m.cv.map(|c| format!("{:.3}", c)).unwrap_or_else(|| "NaN".to_string()),
            ));
        }
        lines.push(
            "Assign a segment to each SKU using 'assign_segment'. Rules: \
             zero_proportion > 0.5 -> intermittent; cv < 0.3 -> stable_seasonal; \
             otherwise -> promo_sensitive."
                .to_string(),
        );
        lines.join("\n")
    }
}

// ==========================================
// 建议契约
// ==========================================
impl AdvisedStage for Segmenter {
    type Action = SegmenterAction;
    const STAGE: &'static str = "segmenter";
    const ROLE: &'static str = "You are the Segmentation Agent. \
        Classify SKUs into stable_seasonal, intermittent or promo_sensitive \
        based on volatility (cv) and zero-sales proportion.";

    fn tools() -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            "assign_segment",
            "Assigns a segment to a SKU and creates a playbook.",
            &[("sku", "string", true), ("segment", "string", true)],
        )]
    }

    fn parse_action(call: &ToolCall) -> AdvisoryResult<SegmenterAction> {
        let sku = call.str_arg("sku")?;
        let segment = call
            .str_arg("segment")?
            .parse::<Segment>()
            .map_err(|message| AdvisoryError::MalformedCall {
                tool: call.tool_name.clone(),
                message,
            })?;
        Ok(SegmenterAction::AssignSegment { sku, segment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sales::SalesRecord;
    use crate::domain::types::{ModelFamily, Season};
    use chrono::NaiveDate;

    fn cleaned(sku: &str, values: &[f64]) -> Vec<CleanedRecord> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| CleanedRecord {
                raw: SalesRecord::new(start + chrono::Duration::weeks(i as i64), sku, *v),
                sales_cleaned: *v,
                month: 1,
                season: Season::Winter,
            })
            .collect()
    }

    #[test]
    fn test_rule_priority() {
        // zero_proportion 优先于 cv
        assert_eq!(classify(0.6, Some(0.1)), Segment::Intermittent);
        assert_eq!(classify(0.5, Some(0.1)), Segment::StableSeasonal);
        assert_eq!(classify(0.0, Some(0.3)), Segment::PromoSensitive);
        assert_eq!(classify(0.0, None), Segment::PromoSensitive);
    }

    #[test]
    fn test_metrics_edge_cases() {
        let mut records = cleaned("ZERO", &[0.0, 0.0, 0.0]);
        records.extend(cleaned("ONE", &[5.0]));
        let metrics = compute_metrics(&records);

        assert_eq!(metrics["ZERO"].zero_proportion, 1.0);
        assert_eq!(metrics["ZERO"].cv, None); // mean = 0
        assert_eq!(metrics["ONE"].std_sales, None);
        assert_eq!(metrics["ONE"].cv, None);
    }

    #[test]
    fn test_one_playbook_per_sku() {
        let mut records = cleaned("STABLE", &[100.0, 102.0, 98.0, 101.0]);
        records.extend(cleaned("SPARSE", &[0.0, 0.0, 0.0, 10.0]));
        records.extend(cleaned("SPIKY", &[10.0, 100.0, 5.0, 80.0]));

        let policy = PolicyContext::with_capacity(1000.0, &["SPIKY"]);
        let output = Segmenter::new().decide(&records, &policy);

        assert_eq!(output.playbooks.len(), 3);
        assert_eq!(output.playbooks["STABLE"].segment, Segment::StableSeasonal);
        assert_eq!(output.playbooks["STABLE"].model_family, ModelFamily::Ets);
        assert_eq!(output.playbooks["SPARSE"].segment, Segment::Intermittent);
        assert_eq!(output.playbooks["SPIKY"].segment, Segment::PromoSensitive);
        assert!(output.playbooks["SPIKY"].is_strategic);
        assert!(!output.playbooks["STABLE"].is_strategic);
    }

    #[test]
    fn test_advice_is_checked_against_rule() {
        let mut records = cleaned("STABLE", &[100.0, 102.0, 98.0, 101.0]);
        records.extend(cleaned("SPARSE", &[0.0, 0.0, 0.0, 10.0]));
        let policy = PolicyContext::default();

        let actions = vec![
            SegmenterAction::AssignSegment {
                sku: "STABLE".to_string(),
                segment: Segment::PromoSensitive,
            },
            SegmenterAction::AssignSegment {
                sku: "GHOST".to_string(),
                segment: Segment::Intermittent,
            },
        ];
        let advised = Segmenter::new().apply(&records, &policy, &actions);
        let decided = Segmenter::new().decide(&records, &policy);

        assert_eq!(advised.playbooks, decided.playbooks);
        assert!(advised.notes.iter().any(|n| n.contains("STABLE")));
        assert!(advised.notes.iter().any(|n| n.contains("GHOST")));
    }
}
