// ==========================================
// 需求计划协商系统 - 分群与打法领域模型
// ==========================================
// 职责: SKU 波动指标 / 每 SKU 一份 Playbook
// ==========================================

use crate::domain::types::{Feature, ModelFamily, Segment};
use serde::{Deserialize, Serialize};

// ==========================================
// SkuMetrics - 分群指标（临时对象）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuMetrics {
    pub sku: String,
    pub observations: usize,
    pub mean_sales: f64,
    pub std_sales: Option<f64>,   // 样本标准差, 少于 2 个观测时无定义
    pub zero_proportion: f64,
    pub cv: Option<f64>,          // std / mean, mean = 0 或 std 无定义时为 None
}

// ==========================================
// Playbook - 每 SKU 决策包
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub sku: String,
    pub segment: Segment,
    pub is_strategic: bool,
    pub model_family: ModelFamily,
    pub features: Vec<Feature>,
}

impl Playbook {
    /// 按分群构造 Playbook（模型族与特征由分群决定）
    pub fn for_segment(sku: &str, segment: Segment, is_strategic: bool) -> Self {
        Self {
            sku: sku.to_string(),
            segment,
            is_strategic,
            model_family: segment.model_family(),
            features: segment.features(),
        }
    }
}
