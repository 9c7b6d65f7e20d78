// ==========================================
// 需求计划协商系统 - 周期报告引擎
// ==========================================
// 职责: 汇总本轮计划的监控指标, 生成解释与经验
// 输入: 最终计划 + 周协商结果 + 上游阶段统计
// 输出: CycleReport（只读, 不回写计划）
// ==========================================
// 红线: 无状态引擎, 相同输入得到相同报告
// ==========================================

use crate::advisory::{AdvisedStage, AdvisoryError, AdvisoryResult, ToolCall, ToolSpec};
use crate::domain::plan::FinalPlanRow;
use crate::engine::negotiator::{WeekNegotiation, WeekStatus};
use serde::Serialize;
use std::collections::BTreeSet;
use std::convert::Infallible;
use tracing::info;

/// 周期监控指标
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleMetrics {
    pub sku_count: usize,
    pub week_count: usize,
    pub row_count: usize,
    pub total_plan: f64,
    pub total_constrained_plan: f64,
    pub total_cut: f64,
    pub cut_rows: usize,
    pub weeks_checked: usize,
    pub weeks_over_capacity: usize,
    pub infeasible_weeks: usize,
    pub capped_uplifts: usize,
    pub forecast_failures: usize,
}

impl CycleMetrics {
    /// 削减量占计划总量的比例; 计划为 0 时返回 0
    pub fn cut_ratio(&self) -> f64 {
        if self.total_plan > 0.0 {
            self.total_cut / self.total_plan
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub metrics: CycleMetrics,
    pub explanations: Vec<String>,
    pub learnings: Vec<String>,
}

/// 报告生成所需的上游统计
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportInputs<'a> {
    pub final_plan: &'a [FinalPlanRow],
    pub weeks: &'a [WeekNegotiation],
    pub capped_uplifts: usize,
    pub forecast_failures: usize,
}

// ==========================================
// Reporter
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Reporter;

impl Reporter {
    pub fn new() -> Self {
        Self
    }

    /// 计算指标
    pub fn metrics(&self, inputs: &ReportInputs<'_>) -> CycleMetrics {
        let skus: BTreeSet<&str> = inputs.final_plan.iter().map(|r| r.sku.as_str()).collect();
        let dates: BTreeSet<_> = inputs.final_plan.iter().map(|r| r.date).collect();

        let total_plan: f64 = inputs.final_plan.iter().map(|r| r.plan).sum();
        let total_constrained_plan: f64 =
            inputs.final_plan.iter().map(|r| r.constrained_plan).sum();

        CycleMetrics {
            sku_count: skus.len(),
            week_count: dates.len(),
            row_count: inputs.final_plan.len(),
            total_plan,
            total_constrained_plan,
            total_cut: inputs
                .final_plan
                .iter()
                .map(|r| (r.plan - r.constrained_plan).max(0.0))
                .sum(),
            cut_rows: inputs.final_plan.iter().filter(|r| r.is_cut()).count(),
            weeks_checked: inputs.weeks.len(),
            weeks_over_capacity: inputs
                .weeks
                .iter()
                .filter(|w| w.status.is_over_capacity())
                .count(),
            infeasible_weeks: inputs
                .weeks
                .iter()
                .filter(|w| w.status == WeekStatus::Infeasible)
                .count(),
            capped_uplifts: inputs.capped_uplifts,
            forecast_failures: inputs.forecast_failures,
        }
    }

    /// 生成报告; advisory_summary 存在时置于解释首位
    pub fn report(&self, inputs: &ReportInputs<'_>, advisory_summary: Option<&str>) -> CycleReport {
        let metrics = self.metrics(inputs);

        let mut explanations = Vec::new();
        if let Some(summary) = advisory_summary.map(str::trim).filter(|s| !s.is_empty()) {
            explanations.push(summary.to_string());
        }
        explanations.extend(self.explain(&metrics, inputs.weeks));

        let learnings = self.learn(&metrics);

        info!(
            sku_count = metrics.sku_count,
            total_cut = metrics.total_cut,
            infeasible_weeks = metrics.infeasible_weeks,
            "周期报告生成完成"
        );

        CycleReport {
            metrics,
            explanations,
            learnings,
        }
    }

    fn explain(&self, metrics: &CycleMetrics, weeks: &[WeekNegotiation]) -> Vec<String> {
        if metrics.row_count == 0 {
            return vec!["本轮未生成任何计划行, 请检查销量数据与预测诊断".to_string()];
        }

        let mut lines = vec![format!(
            "本轮为 {} 个 SKU 生成 {} 周计划, 计划总量 {:.0}, 约束后 {:.0}",
            metrics.sku_count, metrics.week_count, metrics.total_plan, metrics.total_constrained_plan
        )];

        if metrics.weeks_over_capacity == 0 {
            lines.push(format!("全部 {} 周均未超出产能上限", metrics.weeks_checked));
        } else {
            lines.push(format!(
                "{} 周超出产能上限, 共削减 {:.0} ({} 行)",
                metrics.weeks_over_capacity, metrics.total_cut, metrics.cut_rows
            ));
        }

        let by_strategic = weeks
            .iter()
            .filter(|w| w.status == WeekStatus::ResolvedByStrategic)
            .count();
        if by_strategic > 0 {
            lines.push(format!("{} 周在非战略 SKU 削减完后由战略 SKU 承担剩余缺口", by_strategic));
        }
        for week in weeks.iter().filter(|w| w.status == WeekStatus::Infeasible) {
            lines.push(format!(
                "{} 周削减后仍缺口 {:.0}, 需人工处理",
                week.date, week.residual_shortage
            ));
        }
        if metrics.capped_uplifts > 0 {
            lines.push(format!("{} 个事件提升被促销上限截断", metrics.capped_uplifts));
        }
        if metrics.forecast_failures > 0 {
            lines.push(format!("{} 个 SKU 预测失败, 未进入计划", metrics.forecast_failures));
        }

        lines
    }

    fn learn(&self, metrics: &CycleMetrics) -> Vec<String> {
        let mut learnings = Vec::new();

        if metrics.cut_ratio() > 0.1 {
            learnings.push(format!(
                "削减比例 {:.1}% 偏高, 建议复核每周产能上限或需求提升事件",
                metrics.cut_ratio() * 100.0
            ));
        }
        if metrics.infeasible_weeks > 0 {
            learnings.push("存在无法消解的产能缺口, 战略 SKU 需求超过产能".to_string());
        }
        if metrics.capped_uplifts > 0 {
            learnings.push("事件提升多次触及上限, 建议复核 max_promo_uplift".to_string());
        }
        if metrics.forecast_failures > 0 {
            learnings.push("部分 SKU 历史不足或含异常值, 建议补充数据".to_string());
        }
        if learnings.is_empty() {
            learnings.push("本轮计划在约束内完成, 无需调整".to_string());
        }

        learnings
    }

    pub fn prompt(metrics: &CycleMetrics) -> String {
        format!(
            "Summarize the planning cycle. Metrics: sku_count={}, weeks={}, total_plan={:.0}, \
             total_constrained_plan={:.0}, total_cut={:.0}, weeks_over_capacity={}, infeasible_weeks={}.",
            metrics.sku_count,
            metrics.week_count,
            metrics.total_plan,
            metrics.total_constrained_plan,
            metrics.total_cut,
            metrics.weeks_over_capacity,
            metrics.infeasible_weeks
        )
    }
}

// ==========================================
// 建议契约（只取摘要, 无工具）
// ==========================================
impl AdvisedStage for Reporter {
    type Action = Infallible;
    const STAGE: &'static str = "reporter";
    const ROLE: &'static str = "You are the Monitor Agent. \
        Explain the outcome of the planning cycle to a business audience.";

    fn tools() -> Vec<ToolSpec> {
        Vec::new()
    }

    fn parse_action(call: &ToolCall) -> AdvisoryResult<Infallible> {
        Err(AdvisoryError::UnknownTool(call.tool_name.clone()))
    }
}
