// ==========================================
// 染整车间生产流程引擎 - 领域模型层
// ==========================================
// 职责: 定义作业、用水计量、分派等实体与类型
// 红线: 不含数据访问逻辑, 不含引擎逻辑
// ==========================================

pub mod actor;
pub mod assignment;
pub mod customer;
pub mod history;
pub mod job;
pub mod machine_status;
pub mod types;
pub mod water;

// 重导出核心类型
pub use actor::Actor;
pub use assignment::OperatorAssignment;
pub use customer::CustomerDetails;
pub use history::{history_actions, HistoryEntry};
pub use job::{JobRecord, MaterialLine, ReceiverId};
pub use machine_status::MachineStatus;
pub use types::{AssignmentStatus, JobStatus, MaterialKind, Role, WaterStatus};
pub use water::WaterProcess;
