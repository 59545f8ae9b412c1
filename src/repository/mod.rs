// ==========================================
// 染整车间生产流程引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口, 屏蔽数据库细节
// 约束: 所有查询使用参数化, 防止 SQL 注入
// ==========================================

pub mod assignment_repo;
pub mod customer_repo;
pub mod error;
pub mod history_repo;
pub mod job_repo;
pub mod machine_status_repo;
pub mod water_repo;

// 重导出核心仓储
pub use assignment_repo::AssignmentRepository;
pub use customer_repo::CustomerRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use history_repo::{HistoryEntity, HistoryRepository};
pub use job_repo::{JobFilter, JobRecordRepository};
pub use machine_status_repo::MachineStatusRepository;
pub use water_repo::WaterProcessRepository;
