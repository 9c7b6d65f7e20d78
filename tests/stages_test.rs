// ==========================================
// 流水线阶段集成测试
// ==========================================
// 测试目标: 清洗 -> 分群 -> 基线 -> 情景 逐段衔接
// 覆盖范围: 缩尾区间、异常报告、分群规则、预测行形状、事件提升
// ==========================================


use chrono::Duration;
use demand_planning::domain::{ModelFamily, PolicyContext, PolicyEvent, Segment};
use demand_planning::engine::{BaselineForecaster, Cleaner, ScenarioLayer, Segmenter};
use std::collections::BTreeMap;
use test_helpers::{demo_records, flat_baseline, start_week, weekly_records};

// ==========================================
// 清洗
// ==========================================

#[test]
fn test_cleaned_values_stay_within_sigma_band() {
    let records = demo_records();
    let output = Cleaner::default().decide(&records);

    assert_eq!(output.records.len(), records.len());

    let mut by_sku: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in &records {
        by_sku.entry(r.sku.as_str()).or_default().push(r.sales);
    }
    for cleaned in &output.records {
        let values = &by_sku[cleaned.sku()];
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        assert!(cleaned.sales_cleaned >= mean - 3.0 * std - 1e-9);
        assert!(cleaned.sales_cleaned <= mean + 3.0 * std + 1e-9);
    }
}

#[test]
fn test_spike_is_reported_and_clipped() {
    let records = demo_records();
    let output = Cleaner::default().decide(&records);

    let spike_date = start_week() + Duration::weeks(17);
    assert!(output
        .anomalies
        .iter()
        .any(|a| a.sku == "SKU_003" && a.date == spike_date && a.z_score > 3.0));
    assert!(output.anomalies.iter().all(|a| a.sku == "SKU_003"));

    let spike = output
        .records
        .iter()
        .find(|r| r.sku() == "SKU_003" && r.date() == spike_date)
        .unwrap();
    assert!(spike.sales_cleaned < 2000.0);
    assert_eq!(spike.raw.sales, 2000.0);
}

#[test]
fn test_zero_variance_and_single_observation_pass_through() {
    let mut records = weekly_records("FLAT", &[50.0; 10]);
    records.extend(weekly_records("ONE", &[9.0]));

    let output = Cleaner::default().decide(&records);
    assert!(output.anomalies.is_empty());
    assert!(output
        .records
        .iter()
        .all(|r| r.sales_cleaned == r.raw.sales));
}

// ==========================================
// 分群
// ==========================================

#[test]
fn test_demo_segmentation() {
    let cleaned = Cleaner::default().decide(&demo_records());
    let policy = PolicyContext::default();
    let output = Segmenter::new().decide(&cleaned.records, &policy);

    let segments = output.segments();
    assert_eq!(segments["SKU_001"], Segment::StableSeasonal);
    assert_eq!(segments["SKU_002"], Segment::Intermittent);
    assert_eq!(segments["SKU_003"], Segment::PromoSensitive);
    assert_eq!(segments["SKU_004"], Segment::StableSeasonal);
    assert_eq!(segments["SKU_005"], Segment::StableSeasonal);

    assert!(output.playbooks["SKU_001"].is_strategic);
    assert!(output.playbooks["SKU_005"].is_strategic);
    assert_eq!(output.playbooks["SKU_002"].model_family, ModelFamily::Croston);
    assert_eq!(output.playbooks["SKU_003"].model_family, ModelFamily::Regression);
}

// ==========================================
// 基线
// ==========================================

#[test]
fn test_baseline_shape_and_bounds() {
    let cleaned = Cleaner::default().decide(&demo_records());
    let segmentation = Segmenter::new().decide(&cleaned.records, &PolicyContext::default());
    let output = BaselineForecaster::default().decide(&cleaned.records, &segmentation.playbooks);

    assert!(output.diagnostics.is_empty());
    assert_eq!(output.forecasts.len(), 5 * 12);

    let last_history = start_week() + Duration::weeks(39);
    for f in &output.forecasts {
        assert!(f.baseline_p10 >= 0.0);
        assert!(f.baseline_p10 <= f.baseline_p50);
        assert!(f.baseline_p50 <= f.baseline_p90);
        assert!(f.date > last_history);
        assert!(f.date <= last_history + Duration::weeks(12));
    }

    // Croston: 0.5 × 非零均值
    let sku2 = output.forecasts.iter().find(|f| f.sku == "SKU_002").unwrap();
    assert!((sku2.baseline_p50 - 30.0).abs() < 1e-9);
}

#[test]
fn test_sku_without_history_is_diagnosed() {
    let cleaned = Cleaner::default().decide(&weekly_records("A", &[10.0, 12.0, 11.0]));
    let mut playbooks = Segmenter::new()
        .decide(&cleaned.records, &PolicyContext::default())
        .playbooks;
    let ghost = demand_planning::domain::Playbook::for_segment("GHOST", Segment::StableSeasonal, false);
    playbooks.insert("GHOST".to_string(), ghost);

    let output = BaselineForecaster::new(4).decide(&cleaned.records, &playbooks);
    assert_eq!(output.forecasts.len(), 4);
    assert_eq!(output.diagnostics.len(), 1);
    assert!(output.diagnostics[0].starts_with("Error forecasting GHOST"));
}

// ==========================================
// 情景
// ==========================================

#[test]
fn test_policy_events_only_touch_their_rows() {
    let mut forecasts = flat_baseline("SKU_001", 100.0, 12);
    forecasts.extend(flat_baseline("SKU_002", 50.0, 12));
    let mut policy = PolicyContext::with_capacity(10_000.0, &[]);
    policy.events = vec![
        PolicyEvent::at_offset("SKU_001", 4, 0.3),
        PolicyEvent::on_date("SKU_002", start_week() + Duration::days(15), 0.8),
    ];

    let output = ScenarioLayer::default().decide(&forecasts, &policy);

    assert_eq!(output.applied.len(), 2);
    assert_eq!(output.capped_count(), 1);
    for row in &output.rows {
        let offset = (row.date - start_week()).num_weeks();
        match (row.sku.as_str(), offset) {
            ("SKU_001", 4) => assert!((row.plan - 130.0).abs() < 1e-9),
            // 15 天 -> 第 2 周, 0.8 截断为 0.5
            ("SKU_002", 2) => assert!((row.plan - 75.0).abs() < 1e-9),
            _ => {
                assert_eq!(row.plan, row.baseline_p50);
                assert_eq!(row.upside, row.baseline_p90);
                assert_eq!(row.downside, row.baseline_p10);
            }
        }
    }
}

#[test]
fn test_event_before_horizon_is_skipped() {
    let forecasts = flat_baseline("SKU_001", 100.0, 4);
    let mut policy = PolicyContext::with_capacity(10_000.0, &[]);
    policy.events = vec![PolicyEvent::on_date(
        "SKU_001",
        start_week() - Duration::days(1),
        0.3,
    )];

    let output = ScenarioLayer::default().decide(&forecasts, &policy);
    assert!(output.applied.is_empty());
    assert!(output.rows.iter().all(|r| r.plan == 100.0));
    assert!(output.notes.iter().any(|n| n.contains("跳过事件")));
}
