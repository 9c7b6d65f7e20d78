// ==========================================
// Negotiator 引擎集成测试
// ==========================================
// 测试目标: 验证逐周产能协商
// 覆盖范围: 产能约束、战略 SKU 保护、审计日志、剩余缺口处理
// ==========================================


use chrono::{Duration, NaiveDate};
use demand_planning::domain::{PolicyContext, ResidualShortagePolicy, ScenarioRow};
use demand_planning::engine::{Negotiator, WeekStatus};
use demand_planning::FinalPlanRow;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use std::collections::BTreeMap;
use test_helpers::{scenario_row, start_week};

// ==========================================
// 测试辅助函数
// ==========================================

const SKUS: [&str; 5] = ["SKU_001", "SKU_002", "SKU_003", "SKU_004", "SKU_005"];

/// 构造 SKU 数 × 周数 的情景表, values 按 SKU 主序排列
fn build_scenario(sku_count: usize, weeks: usize, values: &[f64]) -> Vec<ScenarioRow> {
    let mut rows = Vec::with_capacity(sku_count * weeks);
    for (s, sku) in SKUS.iter().take(sku_count).enumerate() {
        for w in 0..weeks {
            let date = start_week() + Duration::weeks(w as i64);
            rows.push(scenario_row(sku, date, values[s * weeks + w]));
        }
    }
    rows
}

/// 随机情景表: 1..=5 个 SKU, 1..=12 周, Plan ∈ [0, 1000)
fn arb_scenario() -> impl Strategy<Value = Vec<ScenarioRow>> {
    (1usize..=SKUS.len(), 1usize..=12).prop_flat_map(|(sku_count, weeks)| {
        prop::collection::vec(0.0f64..1000.0, sku_count * weeks)
            .prop_map(move |values| build_scenario(sku_count, weeks, &values))
    })
}

/// 随机战略 SKU 集合
fn arb_strategic() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(any::<bool>(), SKUS.len()).prop_map(|flags| {
        SKUS.iter()
            .zip(flags)
            .filter(|(_, strategic)| *strategic)
            .map(|(sku, _)| *sku)
            .collect()
    })
}

fn weekly_totals(rows: &[FinalPlanRow]) -> BTreeMap<NaiveDate, f64> {
    let mut totals = BTreeMap::new();
    for r in rows {
        *totals.entry(r.date).or_insert(0.0) += r.constrained_plan;
    }
    totals
}

// ==========================================
// 性质测试（随机计划量 + 随机产能）
// ==========================================

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn test_capacity_respected_every_week_when_absorbing(
        rows in arb_scenario(),
        strategic in arb_strategic(),
        capacity_limit in 0.0f64..3000.0,
    ) {
        let policy = PolicyContext::with_capacity(capacity_limit, &strategic);
        let output = Negotiator::default().decide(&rows, &policy);

        prop_assert_eq!(output.rows.len(), rows.len());
        for (date, total) in weekly_totals(&output.rows) {
            prop_assert!(total <= capacity_limit + 1e-6, "week {} total {} cap {}", date, total, capacity_limit);
        }
        prop_assert!(output.weeks.iter().all(|w| w.status != WeekStatus::Infeasible));
    }

    #[test]
    fn test_row_invariants_hold(
        rows in arb_scenario(),
        strategic in arb_strategic(),
        capacity_limit in 0.0f64..3000.0,
        leave_unresolved in any::<bool>(),
    ) {
        let policy = PolicyContext::with_capacity(capacity_limit, &strategic);
        let negotiator = if leave_unresolved {
            Negotiator::new(ResidualShortagePolicy::LeaveUnresolved)
        } else {
            Negotiator::default()
        };
        let output = negotiator.decide(&rows, &policy);

        for r in &output.rows {
            prop_assert!(r.constrained_plan >= 0.0);
            prop_assert!(r.constrained_plan <= r.plan + 1e-9);
            // 日志非空 当且仅当 被削减
            prop_assert_eq!(!r.negotiation_log.is_empty(), r.is_cut(), "row {} {}", r.sku, r.date);
        }
    }

    #[test]
    fn test_strategic_cut_only_after_non_strategic_exhausted(
        rows in arb_scenario(),
        strategic in arb_strategic(),
        capacity_limit in 0.0f64..3000.0,
    ) {
        let policy = PolicyContext::with_capacity(capacity_limit, &strategic);
        let output = Negotiator::default().decide(&rows, &policy);

        for week in &output.weeks {
            if week.cuts.iter().any(|c| c.strategic) {
                // 该周全部非战略 SKU 已削至 0
                for r in output
                    .rows
                    .iter()
                    .filter(|r| r.date == week.date && !policy.is_strategic(&r.sku))
                {
                    prop_assert_eq!(r.constrained_plan, 0.0);
                }
                prop_assert_eq!(week.status, WeekStatus::ResolvedByStrategic);
            }
        }
    }

    #[test]
    fn test_negotiation_is_deterministic_and_order_independent(
        rows in arb_scenario(),
        strategic in arb_strategic(),
        capacity_limit in 0.0f64..3000.0,
    ) {
        let policy = PolicyContext::with_capacity(capacity_limit, &strategic);
        let mut reversed = rows.clone();
        reversed.reverse();

        let first = Negotiator::default().decide(&rows, &policy);
        let second = Negotiator::default().decide(&rows, &policy);
        let from_reversed = Negotiator::default().decide(&reversed, &policy);
        prop_assert_eq!(&first.rows, &second.rows);
        prop_assert_eq!(&first.rows, &from_reversed.rows);
    }
}

// ==========================================
// 固定用例
// ==========================================

#[test]
fn test_leave_unresolved_reports_infeasible_weeks() {
    let d = start_week();
    let rows = vec![
        scenario_row("A", d, 100.0),
        scenario_row("S1", d, 800.0),
        scenario_row("S2", d, 400.0),
    ];
    let policy = PolicyContext::with_capacity(1000.0, &["S1", "S2"]);

    let absorbed = Negotiator::default().decide(&rows, &policy);
    let left = Negotiator::new(ResidualShortagePolicy::LeaveUnresolved).decide(&rows, &policy);

    assert_eq!(absorbed.weeks[0].status, WeekStatus::ResolvedByStrategic);
    // 吸收时先削分配更大的战略 SKU
    let s1 = absorbed.rows.iter().find(|r| r.sku == "S1").unwrap();
    assert_eq!(s1.constrained_plan, 600.0);

    assert_eq!(left.weeks[0].status, WeekStatus::Infeasible);
    assert_eq!(left.weeks[0].residual_shortage, 200.0);
    let total: f64 = left.rows.iter().map(|r| r.constrained_plan).sum();
    assert_eq!(total, 1200.0);
}

#[test]
fn test_empty_plan() {
    let output = Negotiator::default().decide(&[], &PolicyContext::default());
    assert!(output.rows.is_empty());
    assert!(output.weeks.is_empty());
}
