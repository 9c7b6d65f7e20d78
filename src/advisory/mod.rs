// ==========================================
// 需求计划协商系统 - 建议层
// ==========================================
// 职责: 外部模型 / 工具调用协作方的接口与客户端
// 红线: 建议只能驱动阶段自身的确定性操作, 且必须可被 decide 替代
// ==========================================

pub mod advisor;
pub mod client;
pub mod error;
pub mod stage;
pub mod types;

// 重导出
pub use advisor::{Advisor, DisabledAdvisor, ScriptedAdvisor};
pub use client::{AdvisoryClient, Consultation, DEFAULT_ADVISORY_TIMEOUT_MS};
pub use error::{AdvisoryError, AdvisoryResult};
pub use stage::{collect_actions, AdvisedStage};
pub use types::{AdvisoryRequest, AdvisoryResponse, ToolCall, ToolSpec};
