// ==========================================
// 需求计划协商系统 - 指数平滑 (ETS) 拟合
// ==========================================
// 职责: 加法趋势 Holt 模型; 历史 >= 104 周时叠加周期 52 的加法季节项
// 参数: α / β / γ 在固定网格上搜索, 取一步预测 SSE 最小者（并列取先出现者）
// 红线: 观测不足 2 个或含非有限值时报拟合错误, 由调用方按 SKU 消化
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::stats::mean;

/// 季节周期（周）
pub const SEASON_LENGTH: usize = 52;

/// 启用季节项所需的最少观测数（两个完整周期）
pub const MIN_SEASONAL_OBSERVATIONS: usize = 2 * SEASON_LENGTH;

const PARAM_GRID: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtsParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: Option<f64>,
}

/// 拟合后的模型状态
#[derive(Debug, Clone, PartialEq)]
pub struct EtsModel {
    pub params: EtsParams,
    pub level: f64,
    pub trend: f64,
    /// 季节项（长度 52, 按时间下标取模）; 非季节模型为空
    pub seasonals: Vec<f64>,
    pub sse: f64,
    observations: usize,
}

impl EtsModel {
    pub fn is_seasonal(&self) -> bool {
        !self.seasonals.is_empty()
    }

    /// 向前预测 horizon 步
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        (1..=horizon)
            .map(|h| {
                let seasonal = if self.is_seasonal() {
                    self.seasonals[(self.observations + h - 1) % SEASON_LENGTH]
                } else {
                    0.0
                };
                self.level + h as f64 * self.trend + seasonal
            })
            .collect()
    }
}

/// 拟合 ETS 模型
pub fn fit(sku: &str, series: &[f64]) -> EngineResult<EtsModel> {
    if series.len() < 2 {
        return Err(EngineError::ForecastFit {
            sku: sku.to_string(),
            message: format!("ETS 至少需要 2 个观测, 实际 {}", series.len()),
        });
    }
    if series.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::ForecastFit {
            sku: sku.to_string(),
            message: "历史序列含非有限值".to_string(),
        });
    }

    let seasonal = series.len() >= MIN_SEASONAL_OBSERVATIONS;
    let gammas: Vec<Option<f64>> = if seasonal {
        PARAM_GRID.iter().map(|g| Some(*g)).collect()
    } else {
        vec![None]
    };

    let mut best: Option<EtsModel> = None;
    for alpha in PARAM_GRID {
        for beta in PARAM_GRID {
            for gamma in &gammas {
                let params = EtsParams {
                    alpha,
                    beta,
                    gamma: *gamma,
                };
                let model = run_filter(series, params);
                if !model.sse.is_finite() {
                    continue;
                }
                let better = best.as_ref().map(|b| model.sse < b.sse).unwrap_or(true);
                if better {
                    best = Some(model);
                }
            }
        }
    }

    best.ok_or_else(|| EngineError::ForecastFit {
        sku: sku.to_string(),
        message: "所有参数组合的 SSE 均非有限值".to_string(),
    })
}

/// 按给定参数跑一遍平滑递推, 累计一步预测误差平方和
fn run_filter(series: &[f64], params: EtsParams) -> EtsModel {
    let n = series.len();

    match params.gamma {
        None => {
            let mut level = series[0];
            let mut trend = series[1] - series[0];
            let mut sse = 0.0;

            for &y in &series[1..] {
                let predicted = level + trend;
                sse += (y - predicted).powi(2);
                let prev_level = level;
                level = params.alpha * y + (1.0 - params.alpha) * (level + trend);
                trend = params.beta * (level - prev_level) + (1.0 - params.beta) * trend;
            }

            EtsModel {
                params,
                level,
                trend,
                seasonals: Vec::new(),
                sse,
                observations: n,
            }
        }
        Some(gamma) => {
            let m = SEASON_LENGTH;
            let first_cycle = mean(&series[..m]);
            let second_cycle = mean(&series[m..2 * m]);

            let mut level = first_cycle;
            let mut trend = (second_cycle - first_cycle) / m as f64;
            let mut seasonals: Vec<f64> = series[..m].iter().map(|y| y - first_cycle).collect();
            let mut sse = 0.0;

            for (t, &y) in series.iter().enumerate().skip(m) {
                let s = seasonals[t % m];
                let predicted = level + trend + s;
                sse += (y - predicted).powi(2);
                let prev_level = level;
                level = params.alpha * (y - s) + (1.0 - params.alpha) * (level + trend);
                trend = params.beta * (level - prev_level) + (1.0 - params.beta) * trend;
                seasonals[t % m] = gamma * (y - level) + (1.0 - gamma) * s;
            }

            EtsModel {
                params,
                level,
                trend,
                seasonals,
                sse,
                observations: n,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_trend_is_extrapolated() {
        let series: Vec<f64> = (0..20).map(|i| 10.0 + 2.0 * i as f64).collect();
        let model = fit("A", &series).unwrap();
        assert!(!model.is_seasonal());
        assert!(model.sse < 1e-9);

        let forecast = model.forecast(3);
        assert!((forecast[0] - 50.0).abs() < 1e-6);
        assert!((forecast[2] - 54.0).abs() < 1e-6);
    }

    #[test]
    fn test_seasonal_component_only_with_two_cycles() {
        let short: Vec<f64> = (0..103).map(|i| 100.0 + (i % 52) as f64).collect();
        assert!(!fit("A", &short).unwrap().is_seasonal());

        let long: Vec<f64> = (0..104).map(|i| 100.0 + (i % 52) as f64).collect();
        let model = fit("A", &long).unwrap();
        assert!(model.is_seasonal());
        assert_eq!(model.forecast(12).len(), 12);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let series = vec![12.0, 15.0, 11.0, 18.0, 14.0, 16.0, 13.0, 17.0];
        assert_eq!(fit("A", &series).unwrap(), fit("A", &series).unwrap());
    }

    #[test]
    fn test_fit_errors() {
        assert!(matches!(
            fit("A", &[1.0]),
            Err(EngineError::ForecastFit { .. })
        ));
        assert!(fit("A", &[1.0, f64::NAN, 3.0]).is_err());
    }
}
