// ==========================================
// 染整车间生产流程引擎 - 进程级配置
// ==========================================
// 来源: 环境变量 (数据库路径、监听地址、令牌表)
// 业务参数不在此处, 见 config_manager
// ==========================================

use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "DYEHOUSE_DB_PATH";
pub const ENV_BIND_ADDR: &str = "DYEHOUSE_BIND_ADDR";
pub const ENV_TOKENS_FILE: &str = "DYEHOUSE_TOKENS_FILE";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:7390";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: String,
    pub bind_addr: String,
    pub tokens_file: Option<String>,
}

impl AppConfig {
    /// 从环境变量读取, 空值视为未设置
    pub fn from_env() -> Self {
        Self {
            db_path: non_empty_env(ENV_DB_PATH).unwrap_or_else(get_default_db_path),
            bind_addr: non_empty_env(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            tokens_file: non_empty_env(ENV_TOKENS_FILE),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 获取默认数据库路径
///
/// # 返回
/// - 用户数据目录/dyehouse-workflow/dyehouse.db
/// - 拿不到用户数据目录时回退到 ./dyehouse.db
pub fn get_default_db_path() -> String {
    let mut path = PathBuf::from("./dyehouse.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("dyehouse-workflow");
        // 目录创建失败时保持回退路径
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("dyehouse.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_path_ends_with_file_name() {
        assert!(get_default_db_path().ends_with("dyehouse.db"));
    }
}
