// ==========================================
// 需求计划协商系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 引擎错误只在阶段内部或编排器隔离层消化, 不导致流水线崩溃
// ==========================================

use crate::importer::ImportError;
use crate::repository::RepositoryError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 预测 =====
    #[error("基线拟合失败 (sku={sku}): {message}")]
    ForecastFit { sku: String, message: String },

    // ===== 情景 =====
    #[error("事件周偏移越界 (sku={sku}): week_offset={week_offset}, 可用周数={available}")]
    WeekOffsetOutOfRange {
        sku: String,
        week_offset: usize,
        available: usize,
    },

    #[error("无效的提升比例 (sku={sku}): {uplift_pct}")]
    InvalidUplift { sku: String, uplift_pct: f64 },

    // ===== 协商 =====
    #[error("计划行不存在: sku={sku}, date={date}")]
    AllocationNotFound { sku: String, date: NaiveDate },

    #[error("无效的削减量 (sku={sku}, date={date}): {message}")]
    InvalidCut {
        sku: String,
        date: NaiveDate,
        message: String,
    },

    #[error("建议削减与协商规则冲突 (sku={sku}, date={date}): {message}")]
    AdviceRejected {
        sku: String,
        date: NaiveDate,
        message: String,
    },

    // ===== 外部 =====
    #[error("销量导入失败: {0}")]
    Import(#[from] ImportError),

    #[error("产物仓储失败: {0}")]
    Repository(#[from] RepositoryError),
}

pub type EngineResult<T> = Result<T, EngineError>;
