// ==========================================
// 需求计划协商系统 - 交互记录仓储
// ==========================================
// 职责: 建议层交互历史 + 洞察键值 (interaction_log / insight 表)
// 红线: 显式构造、由调用方持有, 不提供进程级单例
// ==========================================

use crate::db::{configure_sqlite_connection, open_in_memory_connection, open_sqlite_connection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 一次交互记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interaction_id: String,
    pub recorded_at: NaiveDateTime,
    pub agent: String,
    pub user_query: String,
    pub agent_response: String,
}

// ==========================================
// InteractionStore
// ==========================================
pub struct InteractionStore {
    conn: Arc<Mutex<Connection>>,
}

impl InteractionStore {
    /// 打开（或创建）文件库
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 内存库（测试/一次性运行）
    pub fn in_memory() -> RepositoryResult<Self> {
        let conn = open_in_memory_connection()
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建（自动建表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let store = Self { conn };
        {
            let guard = store.get_conn()?;
            configure_sqlite_connection(&guard)?;
            guard.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS interaction_log (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    interaction_id TEXT NOT NULL UNIQUE,
                    recorded_at TEXT NOT NULL,
                    agent TEXT NOT NULL,
                    user_query TEXT NOT NULL,
                    agent_response TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS insight (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
            )?;
        }
        Ok(store)
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 记录一次交互, 返回 interaction_id
    pub fn log_interaction(
        &self,
        agent: &str,
        user_query: &str,
        agent_response: &str,
    ) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let interaction_id = Uuid::new_v4().to_string();

        conn.execute(
            r#"
            INSERT INTO interaction_log (interaction_id, recorded_at, agent, user_query, agent_response)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                interaction_id,
                Utc::now().naive_utc().format(TS_FORMAT).to_string(),
                agent,
                user_query,
                agent_response,
            ],
        )?;

        Ok(interaction_id)
    }

    /// 保存（覆盖）一条洞察
    pub fn save_insight(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO insight (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().naive_utc().format(TS_FORMAT).to_string()],
        )?;
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn get_insight(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM insight WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 全部洞察（按 key 升序）
    pub fn list_insights(&self) -> RepositoryResult<BTreeMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM insight ORDER BY key")?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(pairs.into_iter().collect())
    }

    /// 交互历史（按写入顺序）
    pub fn list_interactions(&self) -> RepositoryResult<Vec<InteractionRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT interaction_id, recorded_at, agent, user_query, agent_response
            FROM interaction_log
            ORDER BY seq ASC
            "#,
        )?;
        let records = stmt
            .query_map([], map_interaction)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }
}

fn map_interaction(row: &Row) -> SqliteResult<InteractionRecord> {
    let ts: String = row.get(1)?;
    let recorded_at = NaiveDateTime::parse_from_str(&ts, TS_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(InteractionRecord {
        interaction_id: row.get(0)?,
        recorded_at,
        agent: row.get(2)?,
        user_query: row.get(3)?,
        agent_response: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_and_list_interactions_in_order() {
        let store = InteractionStore::in_memory().unwrap();

        let first = store.log_interaction("cleaner", "clean the data", "done").unwrap();
        store.log_interaction("negotiator", "check capacity", "2 weeks cut").unwrap();

        let records = store.list_interactions().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].interaction_id, first);
        assert_eq!(records[0].agent, "cleaner");
        assert_eq!(records[1].agent_response, "2 weeks cut");
    }

    #[test]
    fn test_insight_upsert() {
        let store = InteractionStore::in_memory().unwrap();
        assert_eq!(store.get_insight("peak_week").unwrap(), None);

        store.save_insight("peak_week", "2025-03-10").unwrap();
        store.save_insight("peak_week", "2025-03-17").unwrap();
        store.save_insight("alpha", "x").unwrap();

        assert_eq!(store.get_insight("peak_week").unwrap().as_deref(), Some("2025-03-17"));
        let all = store.list_insights().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["alpha", "peak_week"]);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interactions.db");
        let path = path.to_str().unwrap();

        {
            let store = InteractionStore::open(path).unwrap();
            store.log_interaction("segmenter", "q", "a").unwrap();
        }

        let reopened = InteractionStore::open(path).unwrap();
        assert_eq!(reopened.list_interactions().unwrap().len(), 1);
    }
}
