// ==========================================
// 染整车间生产流程引擎 - 核心库
// ==========================================
// 技术栈: axum + Rust + SQLite
// 系统定位: 机台排队、用水计量、成本归集、回修链
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - HTTP 集成
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AssignmentStatus, JobStatus, MaterialKind, Role, WaterStatus};

// 领域实体
pub use domain::{Actor, CustomerDetails, HistoryEntry, JobRecord, MaterialLine, ReceiverId, WaterProcess};

// 引擎
pub use engine::{AssignmentView, JobLifecycle, MachineQueue, ReprocessEngine};

// API
pub use api::{JobApi, QueueApi, WaterApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "染整车间生产流程引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
