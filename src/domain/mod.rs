// ==========================================
// 需求计划协商系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod plan;
pub mod playbook;
pub mod policy;
pub mod sales;
pub mod types;

// 重导出核心类型
pub use plan::{BaselineForecast, FinalPlanRow, ScenarioRow};
pub use playbook::{Playbook, SkuMetrics};
pub use policy::{EventAnchor, PolicyConstraints, PolicyContext, PolicyEvent};
pub use sales::{AnomalyFlag, CleanedRecord, SalesRecord};
pub use types::{Feature, ModelFamily, ResidualShortagePolicy, Season, Segment};
