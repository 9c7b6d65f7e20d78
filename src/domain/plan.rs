// ==========================================
// 需求计划协商系统 - 预测/情景/最终计划领域模型
// ==========================================
// 职责: BaselineForecast -> ScenarioRow -> FinalPlanRow 三级行模型
// 红线: Baseline_* 与 Constrained_Plan 非负, Constrained_Plan <= Plan
// ==========================================
// 说明: 三种行均为扁平结构, 字段名与落盘表头一致（CSV 不支持 flatten）

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// BaselineForecast - 基线预测行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineForecast {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Baseline_P10")]
    pub baseline_p10: f64,
    #[serde(rename = "Baseline_P50")]
    pub baseline_p50: f64,
    #[serde(rename = "Baseline_P90")]
    pub baseline_p90: f64,
}

// ==========================================
// ScenarioRow - 情景计划行
// ==========================================
// (SKU, Date) 为修改键; Plan/Upside/Downside 会被事件原地修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Baseline_P10")]
    pub baseline_p10: f64,
    #[serde(rename = "Baseline_P50")]
    pub baseline_p50: f64,
    #[serde(rename = "Baseline_P90")]
    pub baseline_p90: f64,
    #[serde(rename = "Plan")]
    pub plan: f64,
    #[serde(rename = "Upside")]
    pub upside: f64,
    #[serde(rename = "Downside")]
    pub downside: f64,
}

impl From<BaselineForecast> for ScenarioRow {
    /// 初始化: Plan = P50, Upside = P90, Downside = P10
    fn from(b: BaselineForecast) -> Self {
        Self {
            plan: b.baseline_p50,
            upside: b.baseline_p90,
            downside: b.baseline_p10,
            date: b.date,
            sku: b.sku,
            baseline_p10: b.baseline_p10,
            baseline_p50: b.baseline_p50,
            baseline_p90: b.baseline_p90,
        }
    }
}

// ==========================================
// FinalPlanRow - 最终计划行（唯一跨运行落盘的产物）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPlanRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Baseline_P10")]
    pub baseline_p10: f64,
    #[serde(rename = "Baseline_P50")]
    pub baseline_p50: f64,
    #[serde(rename = "Baseline_P90")]
    pub baseline_p90: f64,
    #[serde(rename = "Plan")]
    pub plan: f64,
    #[serde(rename = "Upside")]
    pub upside: f64,
    #[serde(rename = "Downside")]
    pub downside: f64,
    #[serde(rename = "Constrained_Plan")]
    pub constrained_plan: f64,
    #[serde(rename = "Negotiation_Log")]
    pub negotiation_log: String, // 未被削减时为空串
}

impl From<ScenarioRow> for FinalPlanRow {
    /// 初始化: Constrained_Plan = Plan, 审计日志为空
    fn from(s: ScenarioRow) -> Self {
        Self {
            constrained_plan: s.plan,
            negotiation_log: String::new(),
            date: s.date,
            sku: s.sku,
            baseline_p10: s.baseline_p10,
            baseline_p50: s.baseline_p50,
            baseline_p90: s.baseline_p90,
            plan: s.plan,
            upside: s.upside,
            downside: s.downside,
        }
    }
}

impl FinalPlanRow {
    /// 本行是否被协商削减
    pub fn is_cut(&self) -> bool {
        self.constrained_plan < self.plan
    }

    /// 追加一条审计原因
    pub fn append_log(&mut self, reason: &str) {
        if !self.negotiation_log.is_empty() {
            self.negotiation_log.push_str("; ");
        }
        self.negotiation_log.push_str(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> BaselineForecast {
        BaselineForecast {
            date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            sku: "SKU_001".to_string(),
            baseline_p10: 80.0,
            baseline_p50: 100.0,
            baseline_p90: 120.0,
        }
    }

    #[test]
    fn test_scenario_row_initialization() {
        let row = ScenarioRow::from(baseline());
        assert_eq!(row.plan, 100.0);
        assert_eq!(row.upside, 120.0);
        assert_eq!(row.downside, 80.0);
    }

    #[test]
    fn test_final_plan_row_initialization_and_log() {
        let mut row = FinalPlanRow::from(ScenarioRow::from(baseline()));
        assert_eq!(row.constrained_plan, row.plan);
        assert!(row.negotiation_log.is_empty());
        assert!(!row.is_cut());

        row.append_log("first");
        row.append_log("second");
        assert_eq!(row.negotiation_log, "first; second");
    }
}
