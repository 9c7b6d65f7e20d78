// ==========================================
// 需求计划协商系统 - 阶段建议契约
// ==========================================
// 职责: 每个阶段声明角色 + 工具, 并把工具调用解析为本阶段的受检动作
// 红线: 解析失败的调用只记录说明后丢弃; 阶段无可执行动作时必须走 decide
// ==========================================

use crate::advisory::error::{AdvisoryError, AdvisoryResult};
use crate::advisory::types::{AdvisoryRequest, AdvisoryResponse, ToolCall, ToolSpec};
use tracing::debug;

pub trait AdvisedStage {
    /// 本阶段可执行的受检动作
    type Action;

    /// 阶段标识
    const STAGE: &'static str;

    /// 系统角色描述
    const ROLE: &'static str;

    /// 对外声明的工具
    fn tools() -> Vec<ToolSpec>;

    /// 把一次工具调用解析为动作
    fn parse_action(call: &ToolCall) -> AdvisoryResult<Self::Action>;

    /// 构造本阶段的建议请求
    fn request(prompt: String) -> AdvisoryRequest {
        AdvisoryRequest {
            stage: Self::STAGE.to_string(),
            role: Self::ROLE.to_string(),
            tools: Self::tools(),
            prompt,
        }
    }
}

/// 解析响应中的全部工具调用; 未声明工具与参数错误写入 notes
pub fn collect_actions<S: AdvisedStage>(
    response: Option<&AdvisoryResponse>,
    notes: &mut Vec<String>,
) -> Vec<S::Action> {
    let Some(response) = response else {
        return Vec::new();
    };

    let declared: Vec<String> = S::tools().into_iter().map(|t| t.name).collect();
    let mut actions = Vec::new();

    for call in &response.tool_calls {
        let parsed = if declared.iter().any(|name| name == &call.tool_name) {
            S::parse_action(call)
        } else {
            Err(AdvisoryError::UnknownTool(call.tool_name.clone()))
        };

        match parsed {
            Ok(action) => actions.push(action),
            Err(err) => {
                debug!(stage = S::STAGE, tool = %call.tool_name, error = %err, "忽略建议调用");
                notes.push(format!("[{}] 忽略建议调用 {}: {}", S::STAGE, call.tool_name, err));
            }
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoStage;

    impl AdvisedStage for EchoStage {
        type Action = String;
        const STAGE: &'static str = "echo";
        const ROLE: &'static str = "echo role";

        fn tools() -> Vec<ToolSpec> {
            vec![ToolSpec::new("echo", "echo a word", &[("word", "string", true)])]
        }

        fn parse_action(call: &ToolCall) -> AdvisoryResult<String> {
            call.str_arg("word")
        }
    }

    #[test]
    fn test_collect_actions_filters_bad_calls() {
        let response = AdvisoryResponse {
            tool_calls: vec![
                ToolCall::new("echo", json!({"word": "hi"})),
                ToolCall::new("echo", json!({})),
                ToolCall::new("rm_rf", json!({"word": "x"})),
            ],
            summary: None,
        };

        let mut notes = Vec::new();
        let actions = collect_actions::<EchoStage>(Some(&response), &mut notes);
        assert_eq!(actions, vec!["hi".to_string()]);
        assert_eq!(notes.len(), 2);
        assert!(notes[1].contains("rm_rf"));
    }

    #[test]
    fn test_request_carries_stage_contract() {
        let request = EchoStage::request("say hi".to_string());
        assert_eq!(request.stage, "echo");
        assert_eq!(request.tools.len(), 1);
        assert!(collect_actions::<EchoStage>(None, &mut Vec::new()).is_empty());
    }
}
