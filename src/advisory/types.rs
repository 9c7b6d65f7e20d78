// ==========================================
// 需求计划协商系统 - 建议层消息类型
// ==========================================
// 职责: 工具声明 / 工具调用 / 请求 / 响应
// ==========================================

use crate::advisory::error::{AdvisoryError, AdvisoryResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

// ==========================================
// ToolSpec - 阶段对外声明的可调用工具
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl ToolSpec {
    /// 以 (参数名, JSON 类型, 是否必填) 列表构造对象 schema
    pub fn new(name: &str, description: &str, params: &[(&str, &str, bool)]) -> Self {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for (param, ty, is_required) in params {
            properties.insert(param.to_string(), json!({ "type": ty }));
            if *is_required {
                required.push(JsonValue::String(param.to_string()));
            }
        }

        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

// ==========================================
// ToolCall - 模型给出的一次工具调用
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: JsonValue,
}

impl ToolCall {
    pub fn new(tool_name: &str, arguments: JsonValue) -> Self {
        Self {
            id: String::new(),
            tool_name: tool_name.to_string(),
            arguments,
        }
    }

    fn malformed(&self, message: String) -> AdvisoryError {
        AdvisoryError::MalformedCall {
            tool: self.tool_name.clone(),
            message,
        }
    }

    fn arg(&self, key: &str) -> Option<&JsonValue> {
        self.arguments.get(key).filter(|v| !v.is_null())
    }

    /// 必填字符串参数
    pub fn str_arg(&self, key: &str) -> AdvisoryResult<String> {
        match self.arg(key) {
            Some(JsonValue::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(other) => Err(self.malformed(format!("{} 应为非空字符串, 实际为 {}", key, other))),
            None => Err(self.malformed(format!("缺少参数 {}", key))),
        }
    }

    /// 可选数值参数（允许字符串形式的数字）
    pub fn opt_f64_arg(&self, key: &str) -> AdvisoryResult<Option<f64>> {
        match self.arg(key) {
            None => Ok(None),
            Some(JsonValue::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.malformed(format!("{} 不是有效数值", key))),
            Some(JsonValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.malformed(format!("{} 不是有效数值: {}", key, s))),
            Some(other) => Err(self.malformed(format!("{} 应为数值, 实际为 {}", key, other))),
        }
    }

    pub fn f64_arg(&self, key: &str) -> AdvisoryResult<f64> {
        self.opt_f64_arg(key)?
            .ok_or_else(|| self.malformed(format!("缺少参数 {}", key)))
    }

    /// 非负整数参数
    pub fn usize_arg(&self, key: &str) -> AdvisoryResult<usize> {
        let value = self.f64_arg(key)?;
        if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
            return Err(self.malformed(format!("{} 应为非负整数, 实际为 {}", key, value)));
        }
        Ok(value as usize)
    }

    /// 日期参数（取前 10 位 YYYY-MM-DD）
    pub fn date_arg(&self, key: &str) -> AdvisoryResult<NaiveDate> {
        let raw = self.str_arg(key)?;
        let day = raw.get(..10).unwrap_or(&raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|e| self.malformed(format!("{} 日期格式错误 ({}): {}", key, raw, e)))
    }
}

// ==========================================
// AdvisoryRequest / AdvisoryResponse
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    /// 阶段标识（cleaner / segmenter / ...）
    pub stage: String,
    /// 系统角色描述
    pub role: String,
    pub tools: Vec<ToolSpec>,
    /// 任务提示
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResponse {
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// 最终自然语言总结
    #[serde(default)]
    pub summary: Option<String>,
}

impl AdvisoryResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_spec_schema() {
        let spec = ToolSpec::new(
            "cut_allocation",
            "cut",
            &[("sku", "string", true), ("amount", "number", true), ("note", "string", false)],
        );
        assert_eq!(spec.input_schema["properties"]["amount"]["type"], "number");
        assert_eq!(spec.input_schema["required"], json!(["sku", "amount"]));
    }

    #[test]
    fn test_argument_accessors() {
        let call = ToolCall::new(
            "apply_event_uplift",
            json!({"sku": " SKU_001 ", "week_offset": 4, "uplift_pct": "0.3", "date": "2025-03-10T00:00:00"}),
        );
        assert_eq!(call.str_arg("sku").unwrap(), "SKU_001");
        assert_eq!(call.usize_arg("week_offset").unwrap(), 4);
        assert_eq!(call.f64_arg("uplift_pct").unwrap(), 0.3);
        assert_eq!(
            call.date_arg("date").unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );
    }

    #[test]
    fn test_malformed_arguments() {
        let call = ToolCall::new("apply_event_uplift", json!({"week_offset": -1, "sku": 3}));
        assert!(matches!(
            call.usize_arg("week_offset"),
            Err(AdvisoryError::MalformedCall { .. })
        ));
        assert!(call.str_arg("sku").is_err());
        assert!(call.f64_arg("uplift_pct").is_err());
        assert_eq!(call.opt_f64_arg("threshold").unwrap(), None);
    }
}
