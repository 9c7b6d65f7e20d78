// ==========================================
// 需求计划协商系统 - 情景引擎
// ==========================================
// 职责: Plan/Upside/Downside 初始化 + 事件提升（受策略上限约束）
// 红线: 提升比例不得超过 max_promo_uplift, 超出部分截断并报告 capped
//       越界的周偏移直接拒绝, 不修改任何行
// ==========================================
// 说明: 多次事件可叠加在同一 (SKU, 周) 上; 不约束 Plan <= Upside

use crate::advisory::{AdvisedStage, AdvisoryResult, ToolCall, ToolSpec};
use crate::domain::plan::{BaselineForecast, ScenarioRow};
use crate::domain::policy::{EventAnchor, PolicyContext, PolicyEvent, DEFAULT_MAX_PROMO_UPLIFT};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::plan_index::{dedup_plan_rows, PlanIndex};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

pub const DEFAULT_UPSIDE_SCALE: f64 = 1.2;
pub const DEFAULT_DOWNSIDE_SCALE: f64 = 0.8;

/// 允许的最小提升比例（-100%）
pub const MIN_UPLIFT_PCT: f64 = -1.0;

// ==========================================
// ScenarioSettings
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioSettings {
    /// 提升量计入 Upside 的系数
    pub upside_scale: f64,
    /// 提升量计入 Downside 的系数
    pub downside_scale: f64,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            upside_scale: DEFAULT_UPSIDE_SCALE,
            downside_scale: DEFAULT_DOWNSIDE_SCALE,
        }
    }
}

/// 一次事件提升的结果
#[derive(Debug, Clone, PartialEq)]
pub struct UpliftOutcome {
    pub sku: String,
    pub week_offset: usize,
    pub date: NaiveDate,
    pub requested_pct: f64,
    pub applied_pct: f64,
    pub capped: bool,
    /// Plan_before × applied_pct
    pub uplift_value: f64,
}

impl UpliftOutcome {
    pub fn describe(&self) -> String {
        let mut text = format!(
            "Applied {} uplift to {} at week {} ({}).",
            self.applied_pct, self.sku, self.week_offset, self.date
        );
        if self.capped {
            text.push_str(&format!(
                " Uplift capped at {} due to policy (requested {}).",
                self.applied_pct, self.requested_pct
            ));
        }
        text
    }
}

// ==========================================
// ScenarioPlan - 可按 (SKU, 周偏移) 修改的情景表
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScenarioPlan {
    rows: Vec<ScenarioRow>,
    index: PlanIndex,
    duplicates_dropped: usize,
}

impl ScenarioPlan {
    /// 由基线初始化: Plan = P50, Upside = P90, Downside = P10
    pub fn from_baseline(forecasts: &[BaselineForecast]) -> Self {
        let mut rows: Vec<ScenarioRow> = forecasts.iter().cloned().map(ScenarioRow::from).collect();
        rows.sort_by(|a, b| a.sku.cmp(&b.sku).then(a.date.cmp(&b.date)));
        let duplicates_dropped = dedup_plan_rows(&mut rows);
        let index = PlanIndex::build(&rows);
        Self {
            rows,
            index,
            duplicates_dropped,
        }
    }

    /// 去重时丢弃的基线行数
    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    pub fn rows(&self) -> &[ScenarioRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ScenarioRow> {
        self.rows
    }

    /// 日期锚点换算为周偏移: floor((date - 首个预测日期) / 7); 早于首周或 SKU 不存在返回 None
    pub fn resolve_date_offset(&self, sku: &str, date: NaiveDate) -> Option<usize> {
        let first = self.index.first_date(sku)?;
        let days = (date - first).num_days();
        if days < 0 {
            return None;
        }
        Some(days.div_euclid(7) as usize)
    }

    /// 在 (SKU, 第 week_offset 周) 上施加提升
    pub fn apply_event_uplift(
        &mut self,
        sku: &str,
        week_offset: usize,
        uplift_pct: f64,
        max_uplift: f64,
        settings: &ScenarioSettings,
    ) -> EngineResult<UpliftOutcome> {
        if !uplift_pct.is_finite() || uplift_pct < MIN_UPLIFT_PCT {
            return Err(EngineError::InvalidUplift {
                sku: sku.to_string(),
                uplift_pct,
            });
        }

        let row_idx = self.index.nth_week(sku, week_offset).ok_or_else(|| {
            EngineError::WeekOffsetOutOfRange {
                sku: sku.to_string(),
                week_offset,
                available: self.index.week_count(sku),
            }
        })?;

        let cap = if max_uplift.is_finite() {
            max_uplift.max(MIN_UPLIFT_PCT)
        } else {
            DEFAULT_MAX_PROMO_UPLIFT
        };
        let (applied_pct, capped) = if uplift_pct > cap {
            (cap, true)
        } else {
            (uplift_pct, false)
        };

        let row = &mut self.rows[row_idx];
        let uplift_value = row.plan * applied_pct;
        row.plan += uplift_value;
        row.upside += uplift_value * settings.upside_scale;
        row.downside += uplift_value * settings.downside_scale;

        debug!(sku, week_offset, applied_pct, capped, uplift_value, "事件提升已应用");

        Ok(UpliftOutcome {
            sku: sku.to_string(),
            week_offset,
            date: row.date,
            requested_pct: uplift_pct,
            applied_pct,
            capped,
            uplift_value,
        })
    }
}

// ==========================================
// 输出 / 动作
// ==========================================

#[derive(Debug, Clone, Default)]
pub struct ScenarioOutput {
    /// 按 (SKU, Date) 排序
    pub rows: Vec<ScenarioRow>,
    pub applied: Vec<UpliftOutcome>,
    pub notes: Vec<String>,
}

impl ScenarioOutput {
    pub fn capped_count(&self) -> usize {
        self.applied.iter().filter(|o| o.capped).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioAction {
    ApplyEventUplift {
        sku: String,
        week_offset: usize,
        uplift_pct: f64,
    },
}

// ==========================================
// ScenarioLayer
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScenarioLayer {
    settings: ScenarioSettings,
}

impl ScenarioLayer {
    pub fn new(settings: ScenarioSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ScenarioSettings {
        &self.settings
    }

    /// 确定性决策: 应用策略事件日历
    pub fn decide(&self, forecasts: &[BaselineForecast], policy: &PolicyContext) -> ScenarioOutput {
        self.apply(forecasts, policy, &[])
    }

    /// 执行情景; 建议事件无一成功时回退到策略事件
    pub fn apply(
        &self,
        forecasts: &[BaselineForecast],
        policy: &PolicyContext,
        actions: &[ScenarioAction],
    ) -> ScenarioOutput {
        let mut plan = ScenarioPlan::from_baseline(forecasts);
        let max_uplift = policy.constraints.max_promo_uplift;
        let mut applied = Vec::new();
        let mut notes = Vec::new();
        if plan.duplicates_dropped() > 0 {
            warn!(dropped = plan.duplicates_dropped(), "基线存在重复的 (SKU, Date)");
            notes.push(format!(
                "[Scenario] 丢弃 {} 条重复的 (SKU, Date) 基线行",
                plan.duplicates_dropped()
            ));
        }

        for action in actions {
            let ScenarioAction::ApplyEventUplift {
                sku,
                week_offset,
                uplift_pct,
            } = action;
            self.record(
                plan.apply_event_uplift(sku, *week_offset, *uplift_pct, max_uplift, &self.settings),
                &mut applied,
                &mut notes,
            );
        }

        if applied.is_empty() {
            if !actions.is_empty() {
                notes.push("[Scenario] FALLBACK: applying events from policy".to_string());
            }
            for event in &policy.events {
                let Some(offset) = self.resolve_offset(&plan, event, &mut notes) else {
                    continue;
                };
                self.record(
                    plan.apply_event_uplift(&event.sku, offset, event.uplift_pct, max_uplift, &self.settings),
                    &mut applied,
                    &mut notes,
                );
            }
        }

        let output = ScenarioOutput {
            rows: plan.into_rows(),
            applied,
            notes,
        };

        info!(
            rows = output.rows.len(),
            applied = output.applied.len(),
            capped = output.capped_count(),
            "情景生成完成"
        );
        output
    }

    fn resolve_offset(
        &self,
        plan: &ScenarioPlan,
        event: &PolicyEvent,
        notes: &mut Vec<String>,
    ) -> Option<usize> {
        match event.anchor {
            EventAnchor::WeekOffset(offset) => Some(offset),
            EventAnchor::Date(date) => {
                let resolved = plan.resolve_date_offset(&event.sku, date);
                if resolved.is_none() {
                    notes.push(format!(
                        "[Scenario] 跳过事件: {} 的日期 {} 不在预测期内",
                        event.sku, date
                    ));
                }
                resolved
            }
        }
    }

    fn record(
        &self,
        result: EngineResult<UpliftOutcome>,
        applied: &mut Vec<UpliftOutcome>,
        notes: &mut Vec<String>,
    ) {
        match result {
            Ok(outcome) => {
                notes.push(format!("[Scenario] {}", outcome.describe()));
                applied.push(outcome);
            }
            Err(err) => {
                warn!(error = %err, "事件提升被拒绝");
                notes.push(format!("[Scenario] 事件被拒绝: {}", err));
            }
        }
    }

    pub fn prompt(policy: &PolicyContext) -> String {
        let events: Vec<String> = policy
            .events
            .iter()
            .map(|e| match e.anchor {
                EventAnchor::WeekOffset(offset) => {
                    format!("- '{}' in week {} (offset {}) with a {}% uplift", e.sku, offset, offset, e.uplift_pct * 100.0)
                }
                EventAnchor::Date(date) => {
                    format!("- '{}' on {} with a {}% uplift", e.sku, date, e.uplift_pct * 100.0)
                }
            })
            .collect();
        format!(
            "Please layer the following events onto the baseline forecast:\n{}\n\
             Use the 'apply_event_uplift' tool. The maximum promo uplift is {}.",
            events.join("\n"),
            policy.constraints.max_promo_uplift
        )
    }
}

// ==========================================
// 建议契约
// ==========================================
impl AdvisedStage for ScenarioLayer {
    type Action = ScenarioAction;
    const STAGE: &'static str = "scenario";
    const ROLE: &'static str = "You are the Scenario Agent. \
        Layer events onto the baseline forecast to create Plan, Upside and Downside scenarios.";

    fn tools() -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            "apply_event_uplift",
            "Applies an uplift to a specific SKU and week.",
            &[
                ("sku", "string", true),
                ("week_offset", "integer", true),
                ("uplift_pct", "number", true),
            ],
        )]
    }

    fn parse_action(call: &ToolCall) -> AdvisoryResult<ScenarioAction> {
        Ok(ScenarioAction::ApplyEventUplift {
            sku: call.str_arg("sku")?,
            week_offset: call.usize_arg("week_offset")?,
            uplift_pct: call.f64_arg("uplift_pct")?,
        })
    }
}
