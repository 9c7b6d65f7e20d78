// ==========================================
// 需求计划协商系统 - 核心库
// ==========================================
// 流水线: 清洗 -> 分群 -> 基线预测 -> 情景 -> 产能协商 -> 报告
// 系统定位: 决策支持系统 (建议层可选, 确定性决策兜底)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 计划产物 / 交互记录
pub mod repository;

// 引擎层 - 流水线各阶段
pub mod engine;

// 导入层 - 销量历史
pub mod importer;

// 配置层 - 运行参数与策略上下文
pub mod config;

// 建议层 - 外部模型 / 工具调用
pub mod advisory;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{Feature, ModelFamily, ResidualShortagePolicy, Season, Segment};

// 领域实体
pub use domain::{
    AnomalyFlag, BaselineForecast, CleanedRecord, FinalPlanRow, Playbook, PolicyContext,
    PolicyEvent, SalesRecord, ScenarioRow, SkuMetrics,
};

// 引擎
pub use engine::{
    BaselineForecaster, Cleaner, CycleReport, Negotiator, PipelineOrchestrator,
    PipelineRunResult, Reporter, ScenarioLayer, Segmenter, WeekStatus,
};

// 配置
pub use config::{PipelineConfig, PolicyLoader, PolicySource};

// 建议层
pub use advisory::{Advisor, AdvisoryClient};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "需求计划协商系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
