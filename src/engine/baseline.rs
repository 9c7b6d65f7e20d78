// ==========================================
// 需求计划协商系统 - 基线预测引擎
// ==========================================
// 职责: 按 Playbook 的模型族为每个 SKU 生成 horizon 周的 P10/P50/P90
// 分派: ETS -> 指数平滑; Croston -> 0.5 × 非零均值; Regression/其他 -> 历史均值
// 红线: 输出值一律 >= 0; 单个 SKU 拟合失败只产生诊断, 不中断批次
// ==========================================

use crate::advisory::{AdvisedStage, AdvisoryError, AdvisoryResult, ToolCall, ToolSpec};
use crate::domain::plan::BaselineForecast;
use crate::domain::playbook::Playbook;
use crate::domain::sales::CleanedRecord;
use crate::domain::types::ModelFamily;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ets;
use crate::engine::stats::{mean, population_std};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument, warn};

pub const DEFAULT_HORIZON_WEEKS: usize = 12;

/// 约 80% 区间的正态分位数
pub const INTERVAL_Z: f64 = 1.28;

/// Croston 点预测系数
pub const CROSTON_FACTOR: f64 = 0.5;

// ==========================================
// 输出 / 动作
// ==========================================

#[derive(Debug, Clone, Default)]
pub struct BaselineOutput {
    /// 按 (SKU, Date) 排序
    pub forecasts: Vec<BaselineForecast>,
    /// 按 SKU 的拟合失败说明
    pub diagnostics: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BaselineAction {
    RunForecastModel {
        sku: String,
        model_family: ModelFamily,
        horizon: usize,
    },
}

// ==========================================
// BaselineForecaster
// ==========================================
#[derive(Debug, Clone)]
pub struct BaselineForecaster {
    horizon: usize,
}

impl Default for BaselineForecaster {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON_WEEKS)
    }
}

impl BaselineForecaster {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// 点预测 (P50 原值, 未截断)
    pub fn point_forecast(
        sku: &str,
        family: ModelFamily,
        series: &[f64],
        horizon: usize,
    ) -> EngineResult<Vec<f64>> {
        match family {
            ModelFamily::Ets => {
                let model = ets::fit(sku, series)?;
                Ok(model.forecast(horizon))
            }
            ModelFamily::Croston => {
                let nonzero: Vec<f64> = series.iter().copied().filter(|v| *v > 0.0).collect();
                let level = if nonzero.is_empty() {
                    0.0
                } else {
                    CROSTON_FACTOR * mean(&nonzero)
                };
                Ok(vec![level; horizon])
            }
            ModelFamily::Regression => Ok(vec![mean(series); horizon]),
        }
    }

    /// 单个 SKU 的基线预测
    ///
    /// # 参数
    /// - `history`: (日期, Sales_Cleaned), 任意顺序
    pub fn forecast_sku(
        &self,
        sku: &str,
        family: ModelFamily,
        history: &[(NaiveDate, f64)],
    ) -> EngineResult<Vec<BaselineForecast>> {
        let mut history = history.to_vec();
        history.sort_by_key(|(date, _)| *date);

        let Some(&(last_date, _)) = history.last() else {
            return Err(EngineError::ForecastFit {
                sku: sku.to_string(),
                message: "无历史数据".to_string(),
            });
        };

        let series: Vec<f64> = history.iter().map(|(_, v)| *v).collect();
        if series.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::ForecastFit {
                sku: sku.to_string(),
                message: "历史序列含非有限值".to_string(),
            });
        }

        let points = Self::point_forecast(sku, family, &series, self.horizon)?;
        if points.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::ForecastFit {
                sku: sku.to_string(),
                message: format!("{} 预测结果含非有限值", family),
            });
        }

        // 残差标准差: 全历史围绕均值的总体标准差
        let sigma = population_std(&series);

        Ok(points
            .into_iter()
            .enumerate()
            .map(|(i, p50)| BaselineForecast {
                date: last_date + Duration::weeks(i as i64 + 1),
                sku: sku.to_string(),
                baseline_p10: (p50 - INTERVAL_Z * sigma).max(0.0),
                baseline_p50: p50.max(0.0),
                baseline_p90: (p50 + INTERVAL_Z * sigma).max(0.0),
            })
            .collect())
    }

    /// 确定性决策: 按 Playbook 为每个 SKU 预测
    pub fn decide(
        &self,
        records: &[CleanedRecord],
        playbooks: &BTreeMap<String, Playbook>,
    ) -> BaselineOutput {
        self.apply(records, playbooks, &[])
    }

    /// 执行预测; 建议的模型族与预测期必须与 Playbook / 配置一致
    #[instrument(skip_all, fields(sku_count = playbooks.len(), horizon = self.horizon))]
    pub fn apply(
        &self,
        records: &[CleanedRecord],
        playbooks: &BTreeMap<String, Playbook>,
        actions: &[BaselineAction],
    ) -> BaselineOutput {
        let mut notes = Vec::new();
        let mut accepted: BTreeSet<&str> = BTreeSet::new();

        for action in actions {
            let BaselineAction::RunForecastModel {
                sku,
                model_family,
                horizon,
            } = action;
            match playbooks.get(sku) {
                None => notes.push(format!("[Baseline] 拒绝建议: 未知 SKU {}", sku)),
                Some(p) if p.model_family != *model_family => notes.push(format!(
                    "[Baseline] 拒绝建议: {} 的模型族应为 {}, 建议为 {}",
                    sku, p.model_family, model_family
                )),
                Some(_) if *horizon != self.horizon => notes.push(format!(
                    "[Baseline] 拒绝建议: {} 的预测期应为 {}, 建议为 {}",
                    sku, self.horizon, horizon
                )),
                Some(p) => {
                    accepted.insert(p.sku.as_str());
                }
            }
        }

        if !actions.is_empty() && accepted.len() < playbooks.len() {
            notes.push(format!(
                "[Baseline] FALLBACK: {} SKU(s) forecast by playbook",
                playbooks.len() - accepted.len()
            ));
        }

        let mut history: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for record in records {
            history
                .entry(record.sku())
                .or_default()
                .push((record.date(), record.sales_cleaned));
        }

        let mut forecasts = Vec::new();
        let mut diagnostics = Vec::new();

        for (sku, playbook) in playbooks {
            let series = history.get(sku.as_str()).map(|h| h.as_slice()).unwrap_or(&[]);
            match self.forecast_sku(sku, playbook.model_family, series) {
                Ok(rows) => forecasts.extend(rows),
                Err(err) => {
                    warn!(sku = %sku, error = %err, "基线预测失败, 跳过该 SKU");
                    diagnostics.push(format!("Error forecasting {}: {}", sku, err));
                }
            }
        }

        info!(
            rows = forecasts.len(),
            failures = diagnostics.len(),
            "基线预测完成"
        );
        notes.push(format!(
            "[Baseline] {} forecast rows for {} SKU(s), {} failure(s)",
            forecasts.len(),
            playbooks.len() - diagnostics.len(),
            diagnostics.len()
        ));
        notes.extend(diagnostics.iter().map(|d| format!("[Baseline] {}", d)));

        BaselineOutput {
            forecasts,
            diagnostics,
            notes,
        }
    }

    pub fn prompt(&self, playbooks: &BTreeMap<String, Playbook>) -> String {
        let summary: Vec<String> = playbooks
            .iter()
            .map(|(sku, p)| format!("{}: {}", sku, p.model_family))
            .collect();
        format!(
            "Here are the playbooks for the SKUs:\n{}\n\
             Please run the forecast for each SKU using the 'run_forecast_model' tool. \
             The horizon is {}.",
            summary.join("\n"),
            self.horizon
        )
    }
}

// ==========================================
// 建议契约
// ==========================================
impl AdvisedStage for BaselineForecaster {
    type Action = BaselineAction;
    const STAGE: &'static str = "baseline";
    const ROLE: &'static str = "You are the Baseline Forecast Agent. \
        For each SKU, run the model family assigned by its playbook (ETS, Croston or Regression).";

    fn tools() -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            "run_forecast_model",
            "Runs the specified forecasting model for a SKU.",
            &[
                ("sku", "string", true),
                ("model_family", "string", true),
                ("horizon", "integer", false),
            ],
        )]
    }

    fn parse_action(call: &ToolCall) -> AdvisoryResult<BaselineAction> {
        let sku = call.str_arg("sku")?;
        let model_family = call
            .str_arg("model_family")?
            .parse::<ModelFamily>()
            .map_err(|message| AdvisoryError::MalformedCall {
                tool: call.tool_name.clone(),
                message,
            })?;
        let horizon = match call.opt_f64_arg("horizon")? {
            Some(_) => call.usize_arg("horizon")?,
            None => DEFAULT_HORIZON_WEEKS,
        };
        Ok(BaselineAction::RunForecastModel {
            sku,
            model_family,
            horizon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Segment;

    fn history(values: &[f64]) -> Vec<(NaiveDate, f64)> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::weeks(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_croston_half_of_nonzero_mean() {
        let rows = BaselineForecaster::new(4)
            .forecast_sku("A", ModelFamily::Croston, &history(&[0.0, 10.0, 0.0, 30.0]))
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.baseline_p50 == 10.0));

        let zeros = BaselineForecaster::new(2)
            .forecast_sku("Z", ModelFamily::Croston, &history(&[0.0, 0.0, 0.0]))
            .unwrap();
        assert!(zeros.iter().all(|r| r.baseline_p50 == 0.0 && r.baseline_p10 == 0.0));
    }

    #[test]
    fn test_regression_flat_mean_with_band() {
        let rows = BaselineForecaster::new(3)
            .forecast_sku("A", ModelFamily::Regression, &history(&[90.0, 110.0]))
            .unwrap();
        // σ(总体) = 10
        assert_eq!(rows[0].baseline_p50, 100.0);
        assert!((rows[0].baseline_p10 - 87.2).abs() < 1e-9);
        assert!((rows[0].baseline_p90 - 112.8).abs() < 1e-9);
    }

    #[test]
    fn test_future_dates_follow_last_observation() {
        let mut h = history(&[5.0, 6.0, 7.0]);
        h.reverse();
        let rows = BaselineForecaster::new(2)
            .forecast_sku("A", ModelFamily::Regression, &h)
            .unwrap();
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 22).unwrap());
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2024, 1, 29).unwrap());
    }

    #[test]
    fn test_bounds_never_negative() {
        // 下降趋势外推为负, 截断到 0
        let rows = BaselineForecaster::new(12)
            .forecast_sku("A", ModelFamily::Ets, &history(&[50.0, 40.0, 30.0, 20.0, 10.0]))
            .unwrap();
        for r in rows {
            assert!(r.baseline_p10 >= 0.0);
            assert!(r.baseline_p50 >= 0.0);
            assert!(r.baseline_p90 >= 0.0);
        }
    }

    #[test]
    fn test_fit_failure_is_per_sku_diagnostic() {
        use crate::domain::sales::SalesRecord;
        use crate::domain::types::Season;

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let cleaned = |sku: &str, i: i64, v: f64| CleanedRecord {
            raw: SalesRecord::new(start + Duration::weeks(i), sku, v),
            sales_cleaned: v,
            month: 1,
            season: Season::Winter,
        };
        let records = vec![cleaned("ONE", 0, 10.0), cleaned("OK", 0, 10.0), cleaned("OK", 1, 20.0)];

        let mut playbooks = BTreeMap::new();
        playbooks.insert("ONE".to_string(), Playbook::for_segment("ONE", Segment::StableSeasonal, false));
        playbooks.insert("OK".to_string(), Playbook::for_segment("OK", Segment::PromoSensitive, false));

        let output = BaselineForecaster::new(3).decide(&records, &playbooks);
        assert_eq!(output.forecasts.len(), 3);
        assert!(output.forecasts.iter().all(|f| f.sku == "OK"));
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].contains("ONE"));
    }

    #[test]
    fn test_advice_must_match_playbook() {
        let mut playbooks = BTreeMap::new();
        playbooks.insert("A".to_string(), Playbook::for_segment("A", Segment::Intermittent, false));

        let actions = vec![
            BaselineAction::RunForecastModel {
                sku: "A".to_string(),
                model_family: ModelFamily::Ets,
                horizon: 12,
            },
            BaselineAction::RunForecastModel {
                sku: "A".to_string(),
                model_family: ModelFamily::Croston,
                horizon: 4,
            },
        ];
        let output = BaselineForecaster::new(12).apply(&[], &playbooks, &actions);
        let rejected = output.notes.iter().filter(|n| n.contains("拒绝")).count();
        assert_eq!(rejected, 2);
    }
}
