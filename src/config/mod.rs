// ==========================================
// 需求计划协商系统 - 配置层
// ==========================================
// 职责: 运行参数 + 策略上下文检索（多种传输, 统一退化为默认值）
// 存储: JSON 文件 / config_kv 表 / 内存
// ==========================================

pub mod config_manager;
pub mod pipeline_config;
pub mod policy_loader;
pub mod policy_source;

// 重导出
pub use config_manager::{config_keys, ConfigManager};
pub use pipeline_config::PipelineConfig;
pub use policy_loader::{PolicyLoadOutcome, PolicyLoader};
pub use policy_source::{
    JsonFilePolicySource, PolicyError, PolicyResult, PolicySource, StaticPolicySource,
};
