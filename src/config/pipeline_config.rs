// ==========================================
// 需求计划协商系统 - 运行参数
// ==========================================
// 职责: 一次计划周期的运行参数（路径 / 预测期 / 阈值 / 带宽系数 / 超时）
// 来源: 默认值 <- JSON 文件 <- 环境变量 DEMAND_PLANNING_*
// ==========================================

use crate::domain::types::ResidualShortagePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// 运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 销量历史文件 (.csv/.xlsx/.xls)
    pub sales_path: PathBuf,

    /// 产物输出目录（final_plan.csv / segmentation.csv）
    pub output_dir: PathBuf,

    /// 策略 JSON 文件（为空则只用内置默认策略）
    pub policy_path: Option<PathBuf>,

    /// 交互记录库（为空则不记录）
    pub interaction_db_path: Option<PathBuf>,

    /// 预测期（周）
    pub horizon_weeks: usize,

    /// 异常点 z-score 阈值
    pub anomaly_z_threshold: f64,

    /// 缩尾区间宽度（σ 倍数）
    pub clip_sigma: f64,

    /// 事件提升量计入 Upside 的系数
    pub upside_scale: f64,

    /// 事件提升量计入 Downside 的系数
    pub downside_scale: f64,

    /// 非战略 SKU 削减完仍超产能时的处理方式
    pub residual_shortage_policy: ResidualShortagePolicy,

    /// 建议层单次调用超时（毫秒）
    pub advisory_timeout_ms: u64,

    /// 策略源单 key 读取超时（毫秒）
    pub policy_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sales_path: PathBuf::from("data/sales_data.csv"),
            output_dir: PathBuf::from("data"),
            policy_path: None,
            interaction_db_path: None,
            horizon_weeks: 12,
            anomaly_z_threshold: 3.0,
            clip_sigma: 3.0,
            upside_scale: 1.2,
            downside_scale: 0.8,
            residual_shortage_policy: ResidualShortagePolicy::AbsorbByStrategic,
            advisory_timeout_ms: 30_000,
            policy_timeout_ms: 5_000,
        }
    }
}

impl PipelineConfig {
    /// 从 JSON 文件加载（缺省字段取默认值）
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// 应用环境变量覆写（无法解析的值忽略并告警）
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// 覆写逻辑（便于测试注入变量来源）
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEMAND_PLANNING_SALES_PATH") {
            self.sales_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DEMAND_PLANNING_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DEMAND_PLANNING_POLICY_PATH") {
            self.policy_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DEMAND_PLANNING_INTERACTION_DB") {
            self.interaction_db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DEMAND_PLANNING_HORIZON_WEEKS") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.horizon_weeks = n,
                _ => warn!(value = %v, "DEMAND_PLANNING_HORIZON_WEEKS 无效, 忽略"),
            }
        }
        if let Some(v) = lookup("DEMAND_PLANNING_RESIDUAL_POLICY") {
            match v.parse::<ResidualShortagePolicy>() {
                Ok(p) => self.residual_shortage_policy = p,
                Err(e) => warn!(error = %e, "DEMAND_PLANNING_RESIDUAL_POLICY 无效, 忽略"),
            }
        }
    }

    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_millis(self.advisory_timeout_ms)
    }

    pub fn policy_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_timeout_ms)
    }

    pub fn final_plan_path(&self) -> PathBuf {
        self.output_dir.join("final_plan.csv")
    }

    pub fn segmentation_path(&self) -> PathBuf {
        self.output_dir.join("segmentation.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"horizon_weeks": 8, "residual_shortage_policy": "leave_unresolved"}"#)
                .unwrap();
        assert_eq!(config.horizon_weeks, 8);
        assert_eq!(
            config.residual_shortage_policy,
            ResidualShortagePolicy::LeaveUnresolved
        );
        assert_eq!(config.upside_scale, 1.2);
        assert_eq!(config.downside_scale, 0.8);
        assert_eq!(config.anomaly_z_threshold, 3.0);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DEMAND_PLANNING_OUTPUT_DIR", "/tmp/out"),
            ("DEMAND_PLANNING_HORIZON_WEEKS", "abc"),
            ("DEMAND_PLANNING_RESIDUAL_POLICY", "leave"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.horizon_weeks, 12); // 无效值被忽略
        assert_eq!(
            config.residual_shortage_policy,
            ResidualShortagePolicy::LeaveUnresolved
        );
        assert_eq!(config.final_plan_path(), PathBuf::from("/tmp/out/final_plan.csv"));
    }
}
