// ==========================================
// 需求计划协商系统 - 策略上下文加载器
// ==========================================
// 职责: 通过 PolicySource 组装 PolicyContext
// 红线: 传输失败 / 超时 / 缺失 / 格式错误 一律退化为内置默认值, 不中断运行
// ==========================================

use crate::config::config_manager::config_keys;
use crate::config::policy_source::{PolicyError, PolicySource};
use crate::domain::policy::{default_events, PolicyConstraints, PolicyContext, PolicyEvent};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 默认单 key 读取超时
pub const DEFAULT_POLICY_TIMEOUT_MS: u64 = 5_000;

// ==========================================
// PolicyLoadOutcome
// ==========================================
#[derive(Debug, Clone)]
pub struct PolicyLoadOutcome {
    pub context: PolicyContext,
    pub notes: Vec<String>, // 每个退化为默认值的 key 一条
}

// ==========================================
// PolicyLoader
// ==========================================
pub struct PolicyLoader {
    source: Option<Arc<dyn PolicySource>>,
    timeout: Duration,
}

impl PolicyLoader {
    pub fn new(source: Option<Arc<dyn PolicySource>>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// 无策略源: 直接使用内置默认值
    pub fn defaults_only() -> Self {
        Self::new(None, Duration::from_millis(DEFAULT_POLICY_TIMEOUT_MS))
    }

    /// 加载策略上下文
    pub async fn load(&self) -> PolicyLoadOutcome {
        let mut notes = Vec::new();
        let defaults = PolicyContext::default();

        if self.source.is_none() {
            notes.push("未配置策略源, 使用内置默认策略".to_string());
            return PolicyLoadOutcome {
                context: defaults,
                notes,
            };
        }

        let priorities = self
            .fetch::<JsonValue>(config_keys::PRIORITIES, &mut notes)
            .await
            .unwrap_or(defaults.priorities);

        let constraints = self
            .fetch::<PolicyConstraints>(config_keys::CONSTRAINTS, &mut notes)
            .await
            .unwrap_or(defaults.constraints);

        let strategic_skus = self
            .fetch::<Vec<String>>(config_keys::STRATEGIC_SKUS, &mut notes)
            .await
            .map(|skus| skus.into_iter().collect::<BTreeSet<_>>())
            .unwrap_or(defaults.strategic_skus);

        let events = self
            .fetch::<Vec<PolicyEvent>>(config_keys::EVENTS, &mut notes)
            .await
            .unwrap_or_else(default_events);

        info!(
            max_promo_uplift = constraints.max_promo_uplift,
            capacity_limit_total = constraints.capacity_limit_total,
            strategic_count = strategic_skus.len(),
            events_count = events.len(),
            defaulted_keys = notes.len(),
            "策略上下文加载完成"
        );

        PolicyLoadOutcome {
            context: PolicyContext {
                priorities,
                constraints,
                strategic_skus,
                events,
            },
            notes,
        }
    }

    /// 读取并解析单个 key; 失败返回 None 并记录原因
    async fn fetch<T: DeserializeOwned>(&self, key: &str, notes: &mut Vec<String>) -> Option<T> {
        let source = self.source.as_ref()?;

        let raw = match tokio::time::timeout(self.timeout, source.get(key)).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => {
                debug!(key, source = source.name(), "策略 key 不存在, 使用默认值");
                notes.push(format!("策略 {} 缺失, 使用默认值", key));
                return None;
            }
            Ok(Err(err)) => {
                warn!(key, source = source.name(), error = %err, "策略读取失败, 使用默认值");
                notes.push(format!("策略 {} 读取失败 ({}), 使用默认值", key, err));
                return None;
            }
            Err(_) => {
                let err = PolicyError::Timeout {
                    key: key.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                warn!(key, source = source.name(), error = %err, "策略读取超时, 使用默认值");
                notes.push(format!("{}, 使用默认值", err));
                return None;
            }
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = PolicyError::Parse {
                    key: key.to_string(),
                    message: e.to_string(),
                };
                warn!(key, error = %err, "策略值解析失败, 使用默认值");
                notes.push(format!("{}, 使用默认值", err));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::policy_source::StaticPolicySource;
    use crate::domain::policy::{DEFAULT_CAPACITY_LIMIT_TOTAL, DEFAULT_MAX_PROMO_UPLIFT};
    use serde_json::json;

    fn loader(source: StaticPolicySource) -> PolicyLoader {
        PolicyLoader::new(Some(Arc::new(source)), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_no_source_yields_defaults() {
        let outcome = PolicyLoader::defaults_only().load().await;
        assert_eq!(outcome.context, PolicyContext::default());
        assert_eq!(outcome.notes.len(), 1);
    }

    #[tokio::test]
    async fn test_full_policy_is_loaded() {
        let source = StaticPolicySource::new()
            .with("priorities", json!({"service_level": "high"}))
            .with("constraints", json!({"max_promo_uplift": 0.3, "capacity_limit_total": 2500}))
            .with("strategic_skus", json!(["SKU_003"]))
            .with("events", json!([]));

        let outcome = loader(source).load().await;
        assert!(outcome.notes.is_empty());
        assert_eq!(outcome.context.constraints.max_promo_uplift, 0.3);
        assert_eq!(outcome.context.constraints.capacity_limit_total, 2500.0);
        assert!(outcome.context.is_strategic("SKU_003"));
        assert!(!outcome.context.is_strategic("SKU_001"));
        assert!(outcome.context.events.is_empty());
        assert_eq!(outcome.context.priorities["service_level"], json!("high"));
    }

    #[tokio::test]
    async fn test_malformed_and_missing_keys_degrade_per_key() {
        let source = StaticPolicySource::new()
            .with_raw("constraints", "{capacity_limit_total: oops")
            .with("strategic_skus", json!(["SKU_004"]));

        let outcome = loader(source).load().await;
        let ctx = outcome.context;
        assert_eq!(ctx.constraints.capacity_limit_total, DEFAULT_CAPACITY_LIMIT_TOTAL);
        assert_eq!(ctx.constraints.max_promo_uplift, DEFAULT_MAX_PROMO_UPLIFT);
        assert!(ctx.is_strategic("SKU_004"));
        assert_eq!(ctx.events, default_events());
        // priorities 缺失 + constraints 格式错误 + events 缺失
        assert_eq!(outcome.notes.len(), 3);
    }
}
