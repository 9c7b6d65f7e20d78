// ==========================================
// 需求计划协商系统 - 配置管理器 (config_kv)
// ==========================================
// 职责: 基于 SQLite config_kv 表的策略源, 支持读取/写入 global scope
// 存储: config_kv 表 (scope_id + key -> value)
// ==========================================

use crate::config::policy_source::{PolicyError, PolicyResult, PolicySource};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 配置键
pub mod config_keys {
    pub const PRIORITIES: &str = "priorities";
    pub const CONSTRAINTS: &str = "constraints";
    pub const STRATEGIC_SKUS: &str = "strategic_skus";
    pub const EVENTS: &str = "events";
}

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例（自动建表）
    pub fn new(db_path: &str) -> PolicyResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        let manager = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        manager.ensure_schema()?;
        Ok(manager)
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> PolicyResult<Self> {
        {
            let guard = lock(&conn)?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        let manager = Self { conn };
        manager.ensure_schema()?;
        Ok(manager)
    }

    fn ensure_schema(&self) -> PolicyResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config_kv (
                scope_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (scope_id, key)
            );
            "#,
        )?;
        Ok(())
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> PolicyResult<Option<String>> {
        let conn = lock(&self.conn)?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> PolicyResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 获取 global 配置快照（JSON 格式, 按 key 排序）
    ///
    /// # 用途
    /// - 运行结束时随交互记录一起留存, 便于复现
    pub fn get_config_snapshot(&self) -> PolicyResult<String> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;

        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(json!(config_map).to_string())
    }
}

fn lock(conn: &Arc<Mutex<Connection>>) -> PolicyResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| PolicyError::Unavailable(format!("锁获取失败: {}", e)))
}

// ==========================================
// PolicySource Trait 实现
// ==========================================
#[async_trait]
impl PolicySource for ConfigManager {
    async fn get(&self, key: &str) -> PolicyResult<Option<String>> {
        self.get_global_config_value(key)
    }

    fn name(&self) -> &str {
        "config_kv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_set_and_get_global_value() {
        let temp = NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(temp.path().to_str().unwrap()).unwrap();

        assert_eq!(manager.get(config_keys::CONSTRAINTS).await.unwrap(), None);

        manager
            .set_global_config_value(config_keys::CONSTRAINTS, r#"{"capacity_limit_total": 800}"#)
            .unwrap();
        manager
            .set_global_config_value(config_keys::CONSTRAINTS, r#"{"capacity_limit_total": 900}"#)
            .unwrap();

        assert_eq!(
            manager.get(config_keys::CONSTRAINTS).await.unwrap(),
            Some(r#"{"capacity_limit_total": 900}"#.to_string())
        );
    }

    #[test]
    fn test_config_snapshot_is_sorted() {
        let temp = NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(temp.path().to_str().unwrap()).unwrap();
        manager.set_global_config_value("strategic_skus", r#"["A"]"#).unwrap();
        manager.set_global_config_value("constraints", "{}").unwrap();

        let snapshot = manager.get_config_snapshot().unwrap();
        assert_eq!(snapshot, r#"{"constraints":"{}","strategic_skus":"[\"A\"]"}"#);
    }
}
