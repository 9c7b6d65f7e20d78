// ==========================================
// 需求计划协商系统 - 建议服务接口
// ==========================================
// 职责: 外部生成式模型 + 工具调用协作方的抽象
// 红线: 核心只把工具调用当作对自身确定性操作的可选驱动, 不作为新事实来源
// ==========================================

use crate::advisory::error::{AdvisoryError, AdvisoryResult};
use crate::advisory::types::{AdvisoryRequest, AdvisoryResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

// ==========================================
// Advisor Trait
// ==========================================
#[async_trait]
pub trait Advisor: Send + Sync {
    /// 提交一次阶段任务, 返回零到多个工具调用及总结
    async fn advise(&self, request: &AdvisoryRequest) -> AdvisoryResult<AdvisoryResponse>;

    /// 服务名称（日志用）
    fn name(&self) -> &str;

    /// 是否启用; 未启用时客户端直接跳过调用
    fn is_enabled(&self) -> bool {
        true
    }
}

// ==========================================
// DisabledAdvisor - 未配置模型时使用
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAdvisor;

#[async_trait]
impl Advisor for DisabledAdvisor {
    async fn advise(&self, _request: &AdvisoryRequest) -> AdvisoryResult<AdvisoryResponse> {
        Err(AdvisoryError::Unavailable("建议服务未启用".to_string()))
    }

    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

// ==========================================
// ScriptedAdvisor - 按阶段返回预置响应
// ==========================================
// 用于测试与离线回放; 未预置的阶段返回空响应
#[derive(Default)]
pub struct ScriptedAdvisor {
    responses: HashMap<String, AdvisoryResult<AdvisoryResponse>>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<AdvisoryRequest>>,
}

impl ScriptedAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, stage: &str, response: AdvisoryResponse) -> Self {
        self.responses.insert(stage.to_string(), Ok(response));
        self
    }

    pub fn fail(mut self, stage: &str, error: AdvisoryError) -> Self {
        self.responses.insert(stage.to_string(), Err(error));
        self
    }

    /// 对指定阶段延迟响应（用于验证超时）
    pub fn delay(mut self, stage: &str, delay: Duration) -> Self {
        self.delays.insert(stage.to_string(), delay);
        self
    }

    /// 已收到的请求（按到达顺序）
    pub fn received(&self) -> Vec<AdvisoryRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn advise(&self, request: &AdvisoryRequest) -> AdvisoryResult<AdvisoryResponse> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }

        if let Some(delay) = self.delays.get(&request.stage) {
            tokio::time::sleep(*delay).await;
        }

        match self.responses.get(&request.stage) {
            Some(result) => result.clone(),
            None => Ok(AdvisoryResponse::default()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
