// ==========================================
// 需求计划协商系统 - 建议客户端
// ==========================================
// 职责: 有界超时调用 Advisor, 吞掉所有建议层错误, 可选记录交互
// 红线: consult 永不返回错误; 任何失败都等价于"无建议"
// ==========================================

use crate::advisory::advisor::{Advisor, DisabledAdvisor};
use crate::advisory::error::AdvisoryError;
use crate::advisory::types::{AdvisoryRequest, AdvisoryResponse};
use crate::repository::InteractionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 默认单次调用超时
pub const DEFAULT_ADVISORY_TIMEOUT_MS: u64 = 30_000;

/// 一次咨询的结果
#[derive(Debug, Clone)]
pub struct Consultation {
    /// None 表示无可用建议（未启用 / 失败 / 超时）
    pub response: Option<AdvisoryResponse>,
    /// 需要写入运行日志的说明
    pub notes: Vec<String>,
}

impl Consultation {
    fn none(note: Option<String>) -> Self {
        Self {
            response: None,
            notes: note.into_iter().collect(),
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.response.as_ref().and_then(|r| r.summary.as_deref())
    }
}

// ==========================================
// AdvisoryClient
// ==========================================
pub struct AdvisoryClient {
    advisor: Arc<dyn Advisor>,
    timeout: Duration,
    store: Option<Arc<InteractionStore>>,
}

impl AdvisoryClient {
    pub fn new(advisor: Arc<dyn Advisor>, timeout: Duration) -> Self {
        Self {
            advisor,
            timeout,
            store: None,
        }
    }

    /// 不调用任何模型, 所有阶段直接走确定性决策
    pub fn disabled() -> Self {
        Self::new(
            Arc::new(DisabledAdvisor),
            Duration::from_millis(DEFAULT_ADVISORY_TIMEOUT_MS),
        )
    }

    /// 附加交互记录库
    pub fn with_store(mut self, store: Arc<InteractionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.advisor.is_enabled()
    }

    /// 咨询建议服务
    pub async fn consult(&self, request: AdvisoryRequest) -> Consultation {
        if !self.advisor.is_enabled() {
            debug!(stage = %request.stage, "建议服务未启用, 跳过");
            return Consultation::none(None);
        }

        let result = match tokio::time::timeout(self.timeout, self.advisor.advise(&request)).await {
            Ok(result) => result,
            Err(_) => Err(AdvisoryError::Timeout {
                stage: request.stage.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(response) => {
                info!(
                    stage = %request.stage,
                    advisor = self.advisor.name(),
                    tool_calls = response.tool_calls.len(),
                    "收到建议"
                );
                let recorded = response
                    .summary
                    .clone()
                    .unwrap_or_else(|| format!("{} tool call(s)", response.tool_calls.len()));
                self.record(&request, &recorded);
                Consultation {
                    response: Some(response),
                    notes: Vec::new(),
                }
            }
            Err(err) => {
                warn!(stage = %request.stage, advisor = self.advisor.name(), error = %err, "建议调用失败, 使用确定性决策");
                self.record(&request, &format!("ERROR: {}", err));
                Consultation::none(Some(format!("[{}] 建议不可用 ({})", request.stage, err)))
            }
        }
    }

    /// 记录交互; 记录失败只告警
    fn record(&self, request: &AdvisoryRequest, response: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.log_interaction(&request.stage, &request.prompt, response) {
                warn!(stage = %request.stage, error = %e, "交互记录写入失败");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::advisor::ScriptedAdvisor;
    use crate::advisory::types::ToolCall;
    use serde_json::json;

    fn request(stage: &str) -> AdvisoryRequest {
        AdvisoryRequest {
            stage: stage.to_string(),
            role: "role".to_string(),
            tools: Vec::new(),
            prompt: "do it".to_string(),
        }
    }

    #[tokio::test]
    async fn test_disabled_client_returns_no_advice() {
        let client = AdvisoryClient::disabled();
        let consultation = client.consult(request("cleaner")).await;
        assert!(consultation.response.is_none());
        assert!(consultation.notes.is_empty());
    }

    #[tokio::test]
    async fn test_error_is_swallowed_and_recorded() {
        let store = Arc::new(InteractionStore::in_memory().unwrap());
        let advisor = ScriptedAdvisor::new()
            .fail("segmenter", AdvisoryError::Transport("connection reset".to_string()));
        let client = AdvisoryClient::new(Arc::new(advisor), Duration::from_millis(200))
            .with_store(store.clone());

        let consultation = client.consult(request("segmenter")).await;
        assert!(consultation.response.is_none());
        assert_eq!(consultation.notes.len(), 1);

        let records = store.list_interactions().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].agent_response.starts_with("ERROR:"));
    }

    #[tokio::test]
    async fn test_timeout_is_swallowed() {
        let advisor = ScriptedAdvisor::new().delay("baseline", Duration::from_millis(500));
        let client = AdvisoryClient::new(Arc::new(advisor), Duration::from_millis(20));

        let consultation = client.consult(request("baseline")).await;
        assert!(consultation.response.is_none());
        assert!(consultation.notes[0].contains("超时"));
    }

    #[tokio::test]
    async fn test_response_passes_through() {
        let response = AdvisoryResponse {
            tool_calls: vec![ToolCall::new("clean_data", json!({}))],
            summary: Some("cleaned".to_string()),
        };
        let advisor = ScriptedAdvisor::new().respond("cleaner", response.clone());
        let client = AdvisoryClient::new(Arc::new(advisor), Duration::from_millis(200));

        let consultation = client.consult(request("cleaner")).await;
        assert_eq!(consultation.response, Some(response));
        assert_eq!(consultation.summary(), Some("cleaned"));
    }
}
