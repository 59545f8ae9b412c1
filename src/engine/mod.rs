// ==========================================
// 染整车间生产流程引擎 - 引擎层
// ==========================================
// 职责: 状态机、排队、回修、成本规则
// 红线: Engine 不拼 SQL, 存储访问一律经 Repository
// ==========================================

pub mod assignment_view;
pub mod cost;
pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod repositories;
pub mod reprocess;

// 重导出核心引擎
pub use assignment_view::{AssignmentView, QueueItem};
pub use cost::{CostBreakdown, WaterCostOutcome};
pub use error::{EngineError, EngineResult};
pub use lifecycle::{CostOutcome, JobLifecycle, NewJob, PauseMode, TransitionOutcome};
pub use queue::MachineQueue;
pub use repositories::WorkflowRepositories;
pub use reprocess::{ReprocessEngine, ReprocessOptions, ReprocessOutcome};
