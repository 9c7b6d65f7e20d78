// ==========================================
// 需求计划协商系统 - 策略读取 Trait
// ==========================================
// 职责: 定义策略/配置检索协作方接口 get(key) -> 值（JSON 文本）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 策略读取错误
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("策略源不可用: {0}")]
    Unavailable(String),

    #[error("策略读取超时 (key: {key}, {timeout_ms}ms)")]
    Timeout { key: String, timeout_ms: u64 },

    #[error("策略值格式错误 (key: {key}): {message}")]
    Parse { key: String, message: String },

    #[error("策略文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("策略库查询失败: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

// ==========================================
// PolicySource Trait
// ==========================================
// 实现者: StaticPolicySource / JsonFilePolicySource / ConfigManager(config_kv)
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// 读取配置值
    ///
    /// # 返回
    /// - Ok(Some(json_text)): 配置存在
    /// - Ok(None): 配置不存在
    /// - Err: 传输层失败
    async fn get(&self, key: &str) -> PolicyResult<Option<String>>;

    /// 策略源名称（日志用）
    fn name(&self) -> &str;
}

// ==========================================
// StaticPolicySource - 内存策略源
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    values: HashMap<String, String>,
}

impl StaticPolicySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式写入一个 JSON 值
    pub fn with(mut self, key: &str, value: JsonValue) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    /// 链式写入原始文本（可用于构造格式错误的场景）
    pub fn with_raw(mut self, key: &str, raw: &str) -> Self {
        self.values.insert(key.to_string(), raw.to_string());
        self
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn get(&self, key: &str) -> PolicyResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ==========================================
// JsonFilePolicySource - JSON 文件策略源
// ==========================================
// 每次读取都重新加载文件; 先查顶层 key, 再在一级子对象中查找
#[derive(Debug, Clone)]
pub struct JsonFilePolicySource {
    path: PathBuf,
}

impl JsonFilePolicySource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn load(&self) -> PolicyResult<JsonValue> {
        let text = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&text).map_err(|e| PolicyError::Parse {
            key: self.path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl PolicySource for JsonFilePolicySource {
    async fn get(&self, key: &str) -> PolicyResult<Option<String>> {
        let document = self.load()?;
        let Some(root) = document.as_object() else {
            return Ok(None);
        };

        if let Some(value) = root.get(key) {
            return Ok(Some(value.to_string()));
        }

        let nested = root
            .values()
            .filter_map(|section| section.as_object())
            .find_map(|section| section.get(key));

        Ok(nested.map(|v| v.to_string()))
    }

    fn name(&self) -> &str {
        "json_file"
    }
}
