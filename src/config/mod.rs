// ==========================================
// 染整车间生产流程引擎 - 配置层
// ==========================================
// 职责: 进程配置 (环境变量) + 业务配置 (config_kv 表)
// ==========================================

pub mod app_config;
pub mod config_manager;
pub mod workflow_config_trait;

pub use app_config::{get_default_db_path, AppConfig};
pub use config_manager::{config_keys, ConfigManager, WorkflowSettings};
pub use workflow_config_trait::WorkflowConfigReader;
