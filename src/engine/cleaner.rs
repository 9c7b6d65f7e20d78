// ==========================================
// 需求计划协商系统 - 清洗引擎
// ==========================================
// 职责: 按 SKU 计算 z-score 标记异常 + 缩尾到 [mean-kσ, mean+kσ] + 月份/季节特征
// 红线: 缩尾不删行, 每条原始观测恰好对应一条清洗后记录
//       零方差或观测不足 2 条的 SKU 视为无异常, 不得报错
// ==========================================
// 说明: σ 为样本标准差 (n-1)

use crate::advisory::{AdvisedStage, AdvisoryError, AdvisoryResult, ToolCall, ToolSpec};
use crate::domain::sales::{AnomalyFlag, CleanedRecord, SalesRecord};
use crate::domain::types::Season;
use crate::engine::stats::{mean, sample_std};
use chrono::Datelike;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;
pub const DEFAULT_CLIP_SIGMA: f64 = 3.0;

// ==========================================
// 输出 / 动作
// ==========================================

#[derive(Debug, Clone, Default)]
pub struct CleaningOutput {
    /// 按 (SKU, Date) 排序
    pub records: Vec<CleanedRecord>,
    pub anomalies: Vec<AnomalyFlag>,
    /// 本次实际使用的异常阈值
    pub threshold: f64,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CleanerAction {
    DetectAnomalies { threshold: Option<f64> },
    CleanData,
}

/// 单个 SKU 的分组统计
#[derive(Debug, Clone, Copy)]
struct GroupStats {
    mean: f64,
    std: Option<f64>,
}

impl GroupStats {
    fn of(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std: sample_std(values),
        }
    }

    /// z-score; 方差为零或无定义时返回 None
    fn z_score(&self, value: f64) -> Option<f64> {
        match self.std {
            Some(std) if std > 0.0 && std.is_finite() => Some((value - self.mean) / std),
            _ => None,
        }
    }
}

// ==========================================
// Cleaner
// ==========================================
#[derive(Debug, Clone)]
pub struct Cleaner {
    z_threshold: f64,
    clip_sigma: f64,
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new(DEFAULT_Z_THRESHOLD, DEFAULT_CLIP_SIGMA)
    }
}

impl Cleaner {
    pub fn new(z_threshold: f64, clip_sigma: f64) -> Self {
        Self {
            z_threshold,
            clip_sigma,
        }
    }

    pub fn z_threshold(&self) -> f64 {
        self.z_threshold
    }

    /// 按 SKU 分组（组内按日期排序）
    fn group_by_sku(records: &[SalesRecord]) -> BTreeMap<&str, Vec<&SalesRecord>> {
        let mut groups: BTreeMap<&str, Vec<&SalesRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.sku.as_str()).or_default().push(record);
        }
        for rows in groups.values_mut() {
            rows.sort_by_key(|r| r.date);
        }
        groups
    }

    /// 异常检测: |z| > threshold
    pub fn detect_anomalies(&self, records: &[SalesRecord], threshold: f64) -> Vec<AnomalyFlag> {
        let mut anomalies = Vec::new();

        for (sku, rows) in Self::group_by_sku(records) {
            let values: Vec<f64> = rows.iter().map(|r| r.sales).collect();
            let stats = GroupStats::of(&values);

            for row in rows {
                if let Some(z) = stats.z_score(row.sales) {
                    if z.abs() > threshold {
                        anomalies.push(AnomalyFlag {
                            sku: sku.to_string(),
                            date: row.date,
                            sales: row.sales,
                            z_score: z,
                        });
                    }
                }
            }
        }

        anomalies
    }

    /// 缩尾 + 日历特征
    pub fn clean(&self, records: &[SalesRecord]) -> Vec<CleanedRecord> {
        let mut cleaned = Vec::with_capacity(records.len());

        for (_, rows) in Self::group_by_sku(records) {
            let values: Vec<f64> = rows.iter().map(|r| r.sales).collect();
            let stats = GroupStats::of(&values);
            let band = stats.std.map(|s| self.clip_sigma * s).unwrap_or(0.0);
            let lower = stats.mean - band;
            let upper = stats.mean + band;

            for row in rows {
                // 不用 clamp: 参数异常时 lower > upper 会 panic
                let sales_cleaned = row.sales.max(lower).min(upper);
                let month = row.date.month();
                cleaned.push(CleanedRecord {
                    raw: row.clone(),
                    sales_cleaned,
                    month,
                    season: Season::from_month(month),
                });
            }
        }

        cleaned
    }

    /// 确定性决策: 默认阈值检测 + 清洗
    pub fn decide(&self, records: &[SalesRecord]) -> CleaningOutput {
        self.apply(records, &[])
    }

    /// 执行清洗; 建议动作只能调整异常阈值
    pub fn apply(&self, records: &[SalesRecord], actions: &[CleanerAction]) -> CleaningOutput {
        let mut notes = Vec::new();
        let mut threshold = self.z_threshold;

        for action in actions {
            if let CleanerAction::DetectAnomalies {
                threshold: Some(advised),
            } = action
            {
                if advised.is_finite() && *advised > 0.0 {
                    threshold = *advised;
                    notes.push(format!("[Cleaner] 采用建议异常阈值 {}", advised));
                } else {
                    notes.push(format!("[Cleaner] 拒绝无效的建议异常阈值 {}", advised));
                }
            }
        }

        let anomalies = self.detect_anomalies(records, threshold);
        let cleaned = self.clean(records);

        debug!(threshold, anomalies = anomalies.len(), "异常检测完成");
        info!(
            rows = cleaned.len(),
            anomalies = anomalies.len(),
            "数据清洗完成"
        );

        notes.push(format!(
            "[Cleaner] Detected {} anomalies (|z| > {}); {} rows cleaned",
            anomalies.len(),
            threshold,
            cleaned.len()
        ));

        CleaningOutput {
            records: cleaned,
            anomalies,
            threshold,
            notes,
        }
    }

    pub fn prompt(records: &[SalesRecord]) -> String {
        let sku_count = Self::group_by_sku(records).len();
        format!(
            "Load data, detect anomalies, and clean if necessary. \
             The dataset has {} weekly rows across {} SKUs. \
             Use 'detect_anomalies' (optionally with a z-score threshold) and then 'clean_data'.",
            records.len(),
            sku_count
        )
    }
}

// ==========================================
// 建议契约
// ==========================================
impl AdvisedStage for Cleaner {
    type Action = CleanerAction;
    const STAGE: &'static str = "cleaner";
    const ROLE: &'static str = "You are the Data and Signal Agent. \
        Your job is to detect anomalies in weekly sales and clean the dataset.";

    fn tools() -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                "detect_anomalies",
                "Detects anomalies using a per-SKU z-score.",
                &[("threshold", "number", false)],
            ),
            ToolSpec::new("clean_data", "Clips each SKU's sales to mean ± 3 sigma.", &[]),
        ]
    }

    fn parse_action(call: &ToolCall) -> AdvisoryResult<CleanerAction> {
        match call.tool_name.as_str() {
            "detect_anomalies" => Ok(CleanerAction::DetectAnomalies {
                threshold: call.opt_f64_arg("threshold")?,
            }),
            "clean_data" => Ok(CleanerAction::CleanData),
            other => Err(AdvisoryError::UnknownTool(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn weekly(sku: &str, values: &[f64]) -> Vec<SalesRecord> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SalesRecord::new(start + chrono::Duration::weeks(i as i64), sku, *v))
            .collect()
    }

    #[test]
    fn test_spike_is_flagged_and_clipped_within_band() {
        let mut values = vec![100.0; 20];
        values[10] = 1000.0;
        let records = weekly("SKU_001", &values);

        let output = Cleaner::default().decide(&records);
        assert_eq!(output.anomalies.len(), 1);
        assert_eq!(output.anomalies[0].sales, 1000.0);
        assert_eq!(output.records.len(), 20);

        let stats = GroupStats::of(&values);
        let std = stats.std.unwrap();
        for r in &output.records {
            assert!(r.sales_cleaned >= stats.mean - 3.0 * std - 1e-9);
            assert!(r.sales_cleaned <= stats.mean + 3.0 * std + 1e-9);
        }
    }

    #[test]
    fn test_zero_variance_and_single_row_are_not_anomalies() {
        let mut records = weekly("FLAT", &[50.0, 50.0, 50.0]);
        records.extend(weekly("ONE", &[7.0]));

        let output = Cleaner::default().decide(&records);
        assert!(output.anomalies.is_empty());
        assert_eq!(output.records.len(), 4);
        assert!(output.records.iter().all(|r| r.sales_cleaned == r.raw.sales));
    }

    #[test]
    fn test_calendar_features() {
        let records = vec![
            SalesRecord::new(NaiveDate::from_ymd_opt(2024, 12, 2).unwrap(), "A", 1.0),
            SalesRecord::new(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), "A", 1.0),
            SalesRecord::new(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(), "A", 1.0),
            SalesRecord::new(NaiveDate::from_ymd_opt(2024, 10, 7).unwrap(), "A", 1.0),
        ];
        let cleaned = Cleaner::default().clean(&records);

        // 输出按日期排序
        let seasons: Vec<Season> = cleaned.iter().map(|r| r.season).collect();
        assert_eq!(
            seasons,
            vec![Season::Spring, Season::Summer, Season::Fall, Season::Winter]
        );
        assert_eq!(cleaned[3].month, 12);
    }

    #[test]
    fn test_advised_threshold() {
        let mut values = vec![100.0, 110.0, 90.0, 105.0, 95.0, 100.0, 102.0, 98.0];
        values.push(140.0);
        let records = weekly("A", &values);
        let cleaner = Cleaner::default();

        assert!(cleaner.decide(&records).anomalies.is_empty());

        let advised = cleaner.apply(
            &records,
            &[CleanerAction::DetectAnomalies { threshold: Some(2.0) }, CleanerAction::CleanData],
        );
        assert_eq!(advised.threshold, 2.0);
        assert_eq!(advised.anomalies.len(), 1);

        let rejected = cleaner.apply(
            &records,
            &[CleanerAction::DetectAnomalies { threshold: Some(-1.0) }],
        );
        assert_eq!(rejected.threshold, DEFAULT_Z_THRESHOLD);
        assert!(rejected.notes[0].contains("拒绝"));
    }
}
