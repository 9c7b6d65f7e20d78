// ==========================================
// 需求计划协商系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 计划产物文件 + 交互记录库, 屏蔽存储细节
// 约束: 所有查询使用参数化
// ==========================================

pub mod error;
pub mod interaction_store;
pub mod plan_artifact_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use interaction_store::{InteractionRecord, InteractionStore};
pub use plan_artifact_repo::{PlanArtifactRepository, FINAL_PLAN_COLUMNS};
