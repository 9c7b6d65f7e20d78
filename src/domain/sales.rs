// ==========================================
// 需求计划协商系统 - 销售历史领域模型
// ==========================================
// 职责: 原始周销量记录 / 清洗后记录
// 红线: SalesRecord 导入后不可变, 每个 (SKU, Date) 仅一行
// ==========================================

use crate::domain::types::Season;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// SalesRecord - 原始周销量
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    #[serde(rename = "Date")]
    pub date: NaiveDate, // 周对齐日期
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Sales")]
    pub sales: f64, // 非负销量
    #[serde(rename = "Promo_Flag")]
    pub promo_flag: u8, // 0/1
    #[serde(rename = "Marketing_Spend")]
    pub marketing_spend: f64,
}

impl SalesRecord {
    pub fn new(date: NaiveDate, sku: &str, sales: f64) -> Self {
        Self {
            date,
            sku: sku.to_string(),
            sales,
            promo_flag: 0,
            marketing_spend: 0.0,
        }
    }
}

// ==========================================
// CleanedRecord - 清洗 + 日历特征
// ==========================================
// 每次运行重新计算, 不单独落盘
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    #[serde(flatten)]
    pub raw: SalesRecord,
    #[serde(rename = "Sales_Cleaned")]
    pub sales_cleaned: f64, // 缩尾后的销量
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "Season")]
    pub season: Season,
}

impl CleanedRecord {
    pub fn sku(&self) -> &str {
        &self.raw.sku
    }

    pub fn date(&self) -> NaiveDate {
        self.raw.date
    }
}

// ==========================================
// AnomalyFlag - 异常点
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub sku: String,
    pub date: NaiveDate,
    pub sales: f64,
    pub z_score: f64,
}
