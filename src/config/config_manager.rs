// ==========================================
// 染整车间生产流程引擎 - 配置管理器
// ==========================================
// 职责: 业务配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::workflow_config_trait::WorkflowConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 用水成本系数默认值 (每单位读数差 / 公斤)
pub const DEFAULT_WATER_COST_FACTOR: f64 = 0.4;
/// 排队位冲突重试次数默认值
pub const DEFAULT_QUEUE_SLOT_RETRY_LIMIT: u32 = 3;
/// 无人签名时的履历操作人
pub const DEFAULT_ACTOR: &str = "System";

// ==========================================
// WorkflowSettings - 引擎运行参数快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    pub water_cost_factor: f64,
    pub queue_slot_retry_limit: u32,
    pub default_actor: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            water_cost_factor: DEFAULT_WATER_COST_FACTOR,
            queue_slot_retry_limit: DEFAULT_QUEUE_SLOT_RETRY_LIMIT,
            default_actor: DEFAULT_ACTOR.to_string(),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error + Send + Sync>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 配置 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"INSERT INTO config_kv (scope_id, key, value, updated_at)
               VALUES ('global', ?1, ?2, datetime('now'))
               ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')"#,
            params![key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(self.get_global_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 一次性读取引擎运行参数
    pub async fn load_settings(&self) -> Result<WorkflowSettings, Box<dyn Error + Send + Sync>> {
        Ok(WorkflowSettings {
            water_cost_factor: self.get_water_cost_factor().await?,
            queue_slot_retry_limit: self.get_queue_slot_retry_limit().await?,
            default_actor: self.get_default_actor().await?,
        })
    }
}

// ==========================================
// WorkflowConfigReader Trait 实现
// ==========================================
#[async_trait]
impl WorkflowConfigReader for ConfigManager {
    async fn get_water_cost_factor(&self) -> Result<f64, Box<dyn Error + Send + Sync>> {
        let value = self.get_config_or_default(
            config_keys::WATER_COST_FACTOR,
            &DEFAULT_WATER_COST_FACTOR.to_string(),
        )?;
        match value.trim().parse::<f64>() {
            Ok(factor) if factor.is_finite() && factor >= 0.0 => Ok(factor),
            _ => {
                tracing::warn!(
                    config_key = config_keys::WATER_COST_FACTOR,
                    raw_value = %value,
                    "用水成本系数配置格式错误，使用默认值"
                );
                Ok(DEFAULT_WATER_COST_FACTOR)
            }
        }
    }

    async fn get_queue_slot_retry_limit(&self) -> Result<u32, Box<dyn Error + Send + Sync>> {
        let value = self.get_config_or_default(
            config_keys::QUEUE_SLOT_RETRY_LIMIT,
            &DEFAULT_QUEUE_SLOT_RETRY_LIMIT.to_string(),
        )?;
        match value.trim().parse::<u32>() {
            Ok(limit) if limit >= 1 => Ok(limit),
            _ => {
                tracing::warn!(
                    config_key = config_keys::QUEUE_SLOT_RETRY_LIMIT,
                    raw_value = %value,
                    "排队位重试次数配置格式错误，使用默认值"
                );
                Ok(DEFAULT_QUEUE_SLOT_RETRY_LIMIT)
            }
        }
    }

    async fn get_default_actor(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        let value = self.get_config_or_default(config_keys::DEFAULT_ACTOR, DEFAULT_ACTOR)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Ok(DEFAULT_ACTOR.to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 成本
    pub const WATER_COST_FACTOR: &str = "water_cost_factor";

    // 排队
    pub const QUEUE_SLOT_RETRY_LIMIT: &str = "queue_slot_retry_limit";

    // 履历
    pub const DEFAULT_ACTOR: &str = "default_actor";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ConfigManager {
        let conn = crate::db::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_table_empty() {
        let manager = setup();
        assert_eq!(manager.load_settings().await.unwrap(), WorkflowSettings::default());
    }

    #[tokio::test]
    async fn test_malformed_values_fall_back() {
        let manager = setup();
        manager.set_global_config_value(config_keys::WATER_COST_FACTOR, "abc").unwrap();
        manager.set_global_config_value(config_keys::QUEUE_SLOT_RETRY_LIMIT, "0").unwrap();
        manager.set_global_config_value(config_keys::DEFAULT_ACTOR, "  ").unwrap();

        let settings = manager.load_settings().await.unwrap();
        assert_eq!(settings, WorkflowSettings::default());
    }

    #[tokio::test]
    async fn test_overrides_are_read() {
        let manager = setup();
        manager.set_global_config_value(config_keys::WATER_COST_FACTOR, "0.55").unwrap();
        manager.set_global_config_value(config_keys::QUEUE_SLOT_RETRY_LIMIT, "5").unwrap();

        let settings = manager.load_settings().await.unwrap();
        assert_eq!(settings.water_cost_factor, 0.55);
        assert_eq!(settings.queue_slot_retry_limit, 5);
        assert!(manager.get_config_snapshot().unwrap().contains("water_cost_factor"));
    }
}
