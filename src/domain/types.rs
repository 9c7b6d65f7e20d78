// ==========================================
// 需求计划协商系统 - 领域类型定义
// ==========================================
// 职责: 季节 / 分群 / 模型族 / 特征 等枚举
// 序列化格式: 与落盘表格中的取值一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 季节 (Season)
// ==========================================
// 固定日历分桶: 12-2 冬 / 3-5 春 / 6-8 夏 / 9-11 秋
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// 按月份(1-12)推导季节
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Fall,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Season::Winter => write!(f, "Winter"),
            Season::Spring => write!(f, "Spring"),
            Season::Summer => write!(f, "Summer"),
            Season::Fall => write!(f, "Fall"),
        }
    }
}

// ==========================================
// SKU 分群 (Segment)
// ==========================================
// 红线: 判定顺序固定, 先命中先生效 (intermittent > stable_seasonal > promo_sensitive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    StableSeasonal,
    Intermittent,
    PromoSensitive,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::StableSeasonal => "stable_seasonal",
            Segment::Intermittent => "intermittent",
            Segment::PromoSensitive => "promo_sensitive",
        }
    }

    /// 分群对应的基线模型族
    pub fn model_family(&self) -> ModelFamily {
        match self {
            Segment::StableSeasonal => ModelFamily::Ets,
            Segment::Intermittent => ModelFamily::Croston,
            Segment::PromoSensitive => ModelFamily::Regression,
        }
    }

    /// 分群对应的下游特征集合（有序）
    pub fn features(&self) -> Vec<Feature> {
        match self {
            Segment::PromoSensitive => vec![Feature::PromoFlag, Feature::Season],
            Segment::StableSeasonal | Segment::Intermittent => vec![Feature::Season],
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stable_seasonal" | "stable-seasonal" => Ok(Segment::StableSeasonal),
            "intermittent" => Ok(Segment::Intermittent),
            "promo_sensitive" | "promo-sensitive" => Ok(Segment::PromoSensitive),
            other => Err(format!("未知分群: {}", other)),
        }
    }
}

// ==========================================
// 模型族 (Model Family)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "ETS")]
    Ets,
    Croston,
    Regression,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Ets => "ETS",
            ModelFamily::Croston => "Croston",
            ModelFamily::Regression => "Regression",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ETS" => Ok(ModelFamily::Ets),
            "CROSTON" => Ok(ModelFamily::Croston),
            "REGRESSION" => Ok(ModelFamily::Regression),
            other => Err(format!("未知模型族: {}", other)),
        }
    }
}

// ==========================================
// 下游特征 (Feature)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    #[serde(rename = "Promo_Flag")]
    PromoFlag,
    Season,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::PromoFlag => write!(f, "Promo_Flag"),
            Feature::Season => write!(f, "Season"),
        }
    }
}

// ==========================================
// 残余缺口处理策略 (Residual Shortage Policy)
// ==========================================
// 非战略 SKU 全部削减后仍超产能时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualShortagePolicy {
    /// 由战略 SKU 承担剩余缺口（默认）
    AbsorbByStrategic,
    /// 保护战略 SKU, 该周保留未消解缺口
    LeaveUnresolved,
}

impl Default for ResidualShortagePolicy {
    fn default() -> Self {
        ResidualShortagePolicy::AbsorbByStrategic
    }
}

impl FromStr for ResidualShortagePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "absorb_by_strategic" | "absorb" => Ok(ResidualShortagePolicy::AbsorbByStrategic),
            "leave_unresolved" | "leave" => Ok(ResidualShortagePolicy::LeaveUnresolved),
            other => Err(format!("未知残余缺口策略: {}", other)),
        }
    }
}
