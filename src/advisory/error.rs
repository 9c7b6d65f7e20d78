// ==========================================
// 需求计划协商系统 - 建议层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 建议层错误只在阶段边界内消化, 不向流水线传播
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdvisoryError {
    #[error("建议服务不可用: {0}")]
    Unavailable(String),

    #[error("建议调用超时: stage={stage}, timeout_ms={timeout_ms}")]
    Timeout { stage: String, timeout_ms: u64 },

    #[error("建议服务传输失败: {0}")]
    Transport(String),

    #[error("未声明的工具: {0}")]
    UnknownTool(String),

    #[error("工具调用参数错误 (tool={tool}): {message}")]
    MalformedCall { tool: String, message: String },
}

pub type AdvisoryResult<T> = Result<T, AdvisoryError>;
