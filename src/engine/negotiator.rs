// ==========================================
// 需求计划协商系统 - 产能协商引擎
// ==========================================
// 职责: 逐周执行 Σ Constrained_Plan <= capacity_limit_total
// 红线: 产能约束优先于计划量; 战略 SKU 排在最后削减
//       Constrained_Plan 不低于 0 且不高于 Plan; 每次削减必须留下原因
// ==========================================
// 算法: 每个超产能周独立处理, 单遍完成（削减后不再复查）
//   1) shortage = total_demand - capacity_limit
//   2) 排序: 非战略在前 -> Constrained_Plan 降序 -> SKU 升序
//   3) 依次削减 min(当前分配, 剩余缺口), 直到缺口为 0 或名单耗尽
// 非全局最优, 不跨周借用产能
// ==========================================

use crate::advisory::{AdvisedStage, AdvisoryResult, ToolCall, ToolSpec};
use crate::domain::plan::{FinalPlanRow, ScenarioRow};
use crate::domain::policy::PolicyContext;
use crate::domain::types::ResidualShortagePolicy;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::plan_index::{dedup_plan_rows, PlanIndex};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// 产能比较容差（浮点累加误差）
pub const CAPACITY_EPSILON: f64 = 1e-9;

// ==========================================
// WeekStatus - 周协商终态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekStatus {
    /// 未超产能
    WithinCapacity,
    /// 仅削减非战略 SKU 即消解
    Resolved,
    /// 非战略 SKU 削减完后由战略 SKU 承担剩余缺口
    ResolvedByStrategic,
    /// 削减后仍超产能（保护战略 SKU 或已无可削减量）
    Infeasible,
}

impl WeekStatus {
    pub fn is_over_capacity(&self) -> bool {
        !matches!(self, WeekStatus::WithinCapacity)
    }
}

impl fmt::Display for WeekStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeekStatus::WithinCapacity => write!(f, "WITHIN_CAPACITY"),
            WeekStatus::Resolved => write!(f, "RESOLVED"),
            WeekStatus::ResolvedByStrategic => write!(f, "RESOLVED_BY_STRATEGIC"),
            WeekStatus::Infeasible => write!(f, "INFEASIBLE"),
        }
    }
}

/// 单次削减记录
#[derive(Debug, Clone, PartialEq)]
pub struct CutRecord {
    pub sku: String,
    pub amount: f64,
    pub strategic: bool,
}

/// 单周协商结果
#[derive(Debug, Clone, PartialEq)]
pub struct WeekNegotiation {
    pub date: NaiveDate,
    pub total_demand: f64,
    pub capacity_limit: f64,
    pub shortage: f64,
    pub residual_shortage: f64,
    pub status: WeekStatus,
    pub cuts: Vec<CutRecord>,
}

impl WeekNegotiation {
    pub fn cut_total(&self) -> f64 {
        self.cuts.iter().map(|c| c.amount).sum()
    }

    pub fn describe(&self) -> String {
        match self.status {
            WeekStatus::WithinCapacity => format!(
                "Week {}: Demand {:.0} <= Cap {:.0}",
                self.date, self.total_demand, self.capacity_limit
            ),
            WeekStatus::Resolved => format!(
                "Week {}: Demand {:.0} > Cap {:.0}. Cut {:.0} units from {} non-strategic SKU(s). RESOLVED",
                self.date,
                self.total_demand,
                self.capacity_limit,
                self.cut_total(),
                self.cuts.len()
            ),
            WeekStatus::ResolvedByStrategic => format!(
                "Week {}: Demand {:.0} > Cap {:.0}. Cut {:.0} units; strategic SKUs absorbed the residual. RESOLVED_BY_STRATEGIC",
                self.date,
                self.total_demand,
                self.capacity_limit,
                self.cut_total()
            ),
            WeekStatus::Infeasible => format!(
                "Week {}: Demand {:.0} > Cap {:.0}. Cut {:.0} units; residual shortage {:.0} left unresolved. INFEASIBLE",
                self.date,
                self.total_demand,
                self.capacity_limit,
                self.cut_total(),
                self.residual_shortage
            ),
        }
    }
}

// ==========================================
// NegotiationPlan - 按 (SKU, Date) 可削减的计划表
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct NegotiationPlan {
    rows: Vec<FinalPlanRow>,
    index: PlanIndex,
    duplicates_dropped: usize,
}

impl NegotiationPlan {
    /// 初始化: Constrained_Plan = Plan, 日志为空; 行按 (SKU, Date) 排序
    ///
    /// 重复的 (SKU, Date) 只保留输入中先出现的一行
    pub fn from_scenario(rows: &[ScenarioRow]) -> Self {
        let mut rows: Vec<FinalPlanRow> = rows.iter().cloned().map(FinalPlanRow::from).collect();
        rows.sort_by(|a, b| a.sku.cmp(&b.sku).then(a.date.cmp(&b.date)));
        let duplicates_dropped = dedup_plan_rows(&mut rows);
        let index = PlanIndex::build(&rows);
        Self {
            rows,
            index,
            duplicates_dropped,
        }
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    pub fn rows(&self) -> &[FinalPlanRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<FinalPlanRow> {
        self.rows
    }

    /// 削减指定行, 实际削减量不超过当前分配; 返回实际削减量
    pub fn cut_allocation(
        &mut self,
        sku: &str,
        date: NaiveDate,
        amount: f64,
        reason: &str,
    ) -> EngineResult<f64> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EngineError::InvalidCut {
                sku: sku.to_string(),
                date,
                message: format!("削减量必须为正数, 实际 {}", amount),
            });
        }
        let row_idx = self
            .index
            .get(sku, date)
            .ok_or_else(|| EngineError::AllocationNotFound {
                sku: sku.to_string(),
                date,
            })?;

        let row = &mut self.rows[row_idx];
        let cut = amount.min(row.constrained_plan.max(0.0));
        if cut <= 0.0 {
            return Err(EngineError::InvalidCut {
                sku: sku.to_string(),
                date,
                message: "当前分配已为 0".to_string(),
            });
        }
        row.constrained_plan -= cut;
        row.append_log(reason);
        Ok(cut)
    }
}

// ==========================================
// 输出 / 动作
// ==========================================

#[derive(Debug, Clone, Default)]
pub struct NegotiationOutput {
    /// 按 (SKU, Date) 排序
    pub rows: Vec<FinalPlanRow>,
    /// 按日期升序, 每周一条
    pub weeks: Vec<WeekNegotiation>,
    pub notes: Vec<String>,
}

impl NegotiationOutput {
    pub fn weeks_with(&self, status: WeekStatus) -> usize {
        self.weeks.iter().filter(|w| w.status == status).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NegotiatorAction {
    CutAllocation {
        sku: String,
        date: NaiveDate,
        amount: f64,
    },
}

// ==========================================
// Negotiator
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Negotiator {
    residual_policy: ResidualShortagePolicy,
}

impl Negotiator {
    pub fn new(residual_policy: ResidualShortagePolicy) -> Self {
        Self { residual_policy }
    }

    pub fn residual_policy(&self) -> ResidualShortagePolicy {
        self.residual_policy
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 对全部周执行协商（按日期升序, 每周独立）
    #[instrument(skip_all, fields(rows = plan.rows.len(), capacity_limit = policy.constraints.capacity_limit_total))]
    pub fn negotiate(&self, plan: &mut NegotiationPlan, policy: &PolicyContext) -> Vec<WeekNegotiation> {
        let capacity_limit = policy.constraints.capacity_limit_total;
        let weeks: Vec<(NaiveDate, Vec<usize>)> = plan
            .index
            .weeks()
            .map(|(date, rows)| (date, rows.to_vec()))
            .collect();

        weeks
            .into_iter()
            .map(|(date, row_ids)| {
                self.negotiate_week(&mut plan.rows, date, &row_ids, capacity_limit, policy)
            })
            .collect()
    }

    /// 单周协商
    ///
    /// # 参数
    /// - `rows`: 全部计划行（会被修改）
    /// - `row_ids`: 本周的行号
    /// - `capacity_limit`: 每周总产能上限
    pub fn negotiate_week(
        &self,
        rows: &mut [FinalPlanRow],
        date: NaiveDate,
        row_ids: &[usize],
        capacity_limit: f64,
        policy: &PolicyContext,
    ) -> WeekNegotiation {
        let total_demand: f64 = row_ids.iter().map(|&i| rows[i].constrained_plan).sum();
        let shortage = total_demand - capacity_limit;

        // 1. 检查: 未超产能直接结束
        if shortage <= CAPACITY_EPSILON {
            return WeekNegotiation {
                date,
                total_demand,
                capacity_limit,
                shortage: 0.0,
                residual_shortage: 0.0,
                status: WeekStatus::WithinCapacity,
                cuts: Vec::new(),
            };
        }

        // 2. 排序: 非战略在前, 分配量降序, SKU 升序
        let mut ranked: Vec<(usize, bool)> = row_ids
            .iter()
            .map(|&i| (i, policy.is_strategic(&rows[i].sku)))
            .collect();
        ranked.sort_by(|(a, a_strategic), (b, b_strategic)| {
            a_strategic
                .cmp(b_strategic)
                .then_with(|| {
                    rows[*b]
                        .constrained_plan
                        .partial_cmp(&rows[*a].constrained_plan)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| rows[*a].sku.cmp(&rows[*b].sku))
        });

        // 3. 依次削减
        let mut remaining = shortage;
        let mut cuts = Vec::new();
        for (row_idx, strategic) in ranked {
            if remaining <= CAPACITY_EPSILON {
                break;
            }
            if strategic && self.residual_policy == ResidualShortagePolicy::LeaveUnresolved {
                break;
            }

            let row = &mut rows[row_idx];
            let current = row.constrained_plan.max(0.0);
            let cut = current.min(remaining);
            if cut <= 0.0 {
                continue;
            }

            row.constrained_plan = current - cut;
            let reason = if strategic {
                format!(
                    "STRATEGIC_RESIDUAL_CUT: Cut {:.2} due to capacity limit {:.2} after exhausting non-strategic SKUs (week demand {:.2})",
                    cut, capacity_limit, total_demand
                )
            } else {
                format!(
                    "CAPACITY_CUT: Cut {:.2} due to capacity limit {:.2} (week demand {:.2}, shortage {:.2})",
                    cut, capacity_limit, total_demand, shortage
                )
            };
            row.append_log(&reason);
            remaining -= cut;

            debug!(date = %date, sku = %row.sku, cut, strategic, remaining, "执行削减");
            cuts.push(CutRecord {
                sku: row.sku.clone(),
                amount: cut,
                strategic,
            });
        }

        let residual_shortage = remaining.max(0.0);
        let status = if residual_shortage > CAPACITY_EPSILON {
            WeekStatus::Infeasible
        } else if cuts.iter().any(|c| c.strategic) {
            WeekStatus::ResolvedByStrategic
        } else {
            WeekStatus::Resolved
        };

        if status == WeekStatus::Infeasible {
            warn!(date = %date, residual_shortage, "削减后仍超产能");
        }

        WeekNegotiation {
            date,
            total_demand,
            capacity_limit,
            shortage,
            residual_shortage: if status == WeekStatus::Infeasible { residual_shortage } else { 0.0 },
            status,
            cuts,
        }
    }

    /// 校验建议削减, 返回允许的削减量
    ///
    /// 规则与确定性协商一致:
    /// - 只允许削减超产能周, 削减量不超过该周剩余缺口
    /// - 同周仍有非战略分配时不得削减战略 SKU
    /// - 剩余缺口保留策略下不得削减战略 SKU
    pub fn check_advised_cut(
        &self,
        plan: &NegotiationPlan,
        policy: &PolicyContext,
        sku: &str,
        date: NaiveDate,
        amount: f64,
    ) -> EngineResult<f64> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EngineError::InvalidCut {
                sku: sku.to_string(),
                date,
                message: format!("削减量必须为正数, 实际 {}", amount),
            });
        }
        let row_idx = plan
            .index
            .get(sku, date)
            .ok_or_else(|| EngineError::AllocationNotFound {
                sku: sku.to_string(),
                date,
            })?;
        let rejected = |message: String| EngineError::AdviceRejected {
            sku: sku.to_string(),
            date,
            message,
        };

        let capacity_limit = policy.constraints.capacity_limit_total;
        let week_rows = plan.index.week_rows(date);
        let total: f64 = week_rows.iter().map(|&i| plan.rows[i].constrained_plan).sum();
        let shortage = total - capacity_limit;
        if shortage <= CAPACITY_EPSILON {
            return Err(rejected(format!(
                "本周未超产能 (需求 {:.2} <= 产能 {:.2})",
                total, capacity_limit
            )));
        }

        if policy.is_strategic(sku) {
            if self.residual_policy == ResidualShortagePolicy::LeaveUnresolved {
                return Err(rejected("剩余缺口保留策略下不削减战略 SKU".to_string()));
            }
            let non_strategic_left: f64 = week_rows
                .iter()
                .map(|&i| &plan.rows[i])
                .filter(|r| !policy.is_strategic(&r.sku))
                .map(|r| r.constrained_plan.max(0.0))
                .sum();
            if non_strategic_left > CAPACITY_EPSILON {
                return Err(rejected(format!(
                    "同周非战略 SKU 仍有分配 {:.2}, 战略 SKU 须最后削减",
                    non_strategic_left
                )));
            }
        }

        let allowed = amount.min(shortage).min(plan.rows[row_idx].constrained_plan.max(0.0));
        if allowed <= 0.0 {
            return Err(EngineError::InvalidCut {
                sku: sku.to_string(),
                date,
                message: "当前分配已为 0".to_string(),
            });
        }
        Ok(allowed)
    }

    /// 确定性决策
    pub fn decide(&self, scenario: &[ScenarioRow], policy: &PolicyContext) -> NegotiationOutput {
        self.apply(scenario, policy, &[])
    }

    /// 先执行受检的建议削减, 再无条件执行确定性协商
    pub fn apply(
        &self,
        scenario: &[ScenarioRow],
        policy: &PolicyContext,
        actions: &[NegotiatorAction],
    ) -> NegotiationOutput {
        let mut plan = NegotiationPlan::from_scenario(scenario);
        let mut notes = Vec::new();
        if plan.duplicates_dropped() > 0 {
            warn!(dropped = plan.duplicates_dropped(), "情景行存在重复的 (SKU, Date)");
            notes.push(format!(
                "[Negotiator] 丢弃 {} 条重复的 (SKU, Date) 情景行",
                plan.duplicates_dropped()
            ));
        }

        for action in actions {
            let NegotiatorAction::CutAllocation { sku, date, amount } = action;
            let checked = self.check_advised_cut(&plan, policy, sku, *date, *amount);
            let outcome = checked.and_then(|cut| {
                let reason = format!("ADVISORY_CUT: Cut {:.2} by advisor", cut);
                plan.cut_allocation(sku, *date, cut, &reason)
            });
            match outcome {
                Ok(cut) => notes.push(format!(
                    "[Negotiator] Cut {} by {:.2} in week {} (advised)",
                    sku, cut, date
                )),
                Err(err) => {
                    warn!(sku = %sku, date = %date, amount, error = %err, "建议削减被拒绝");
                    notes.push(format!("[Negotiator] 建议削减被拒绝: {}", err));
                }
            }
        }

        let weeks = self.negotiate(&mut plan, policy);
        for week in weeks.iter().filter(|w| w.status.is_over_capacity()) {
            notes.push(format!("[Negotiator] {}", week.describe()));
        }

        let output = NegotiationOutput {
            rows: plan.into_rows(),
            weeks,
            notes,
        };

        info!(
            weeks_checked = output.weeks.len(),
            resolved = output.weeks_with(WeekStatus::Resolved),
            resolved_by_strategic = output.weeks_with(WeekStatus::ResolvedByStrategic),
            infeasible = output.weeks_with(WeekStatus::Infeasible),
            "产能协商完成"
        );
        output
    }

    pub fn prompt(policy: &PolicyContext, weeks_over: &[String]) -> String {
        let strategic: Vec<&str> = policy.strategic_skus.iter().map(|s| s.as_str()).collect();
        format!(
            "Weekly capacity limit is {}. Weeks over capacity:\n{}\n\
             Decide which SKUs to cut to resolve the shortage and use 'cut_allocation'. \
             Strategic SKUs: {:?} should be protected if possible.",
            policy.constraints.capacity_limit_total,
            if weeks_over.is_empty() {
                "none".to_string()
            } else {
                weeks_over.join("\n")
            },
            strategic
        )
    }
}

/// 超产能周摘要（供建议提示使用, 不修改计划）
pub fn over_capacity_weeks(scenario: &[ScenarioRow], capacity_limit: f64) -> Vec<String> {
    let plan = NegotiationPlan::from_scenario(scenario);
    plan.index
        .weeks()
        .filter_map(|(date, row_ids)| {
            let total: f64 = row_ids.iter().map(|&i| plan.rows[i].constrained_plan).sum();
            (total - capacity_limit > CAPACITY_EPSILON).then(|| {
                format!(
                    "Week {}: Demand {:.0} > Cap {:.0}. Shortage: {:.0}",
                    date,
                    total,
                    capacity_limit,
                    total - capacity_limit
                )
            })
        })
        .collect()
}

// ==========================================
// 建议契约
// ==========================================
impl AdvisedStage for Negotiator {
    type Action = NegotiatorAction;
    const STAGE: &'static str = "negotiator";
    const ROLE: &'static str = "You are the Micro-Negotiation Agent. \
        Ensure the demand plan respects weekly capacity; protect strategic SKUs if possible.";

    fn tools() -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            "cut_allocation",
            "Cuts the allocation for a SKU in a specific week.",
            &[
                ("sku", "string", true),
                ("week_date", "string", true),
                ("amount", "number", true),
            ],
        )]
    }

    fn parse_action(call: &ToolCall) -> AdvisoryResult<NegotiatorAction> {
        Ok(NegotiatorAction::CutAllocation {
            sku: call.str_arg("sku")?,
            date: call.date_arg("week_date")?,
            amount: call.f64_arg("amount")?,
        })
    }
}
