// ==========================================
// 染整车间生产流程引擎 - API 层
// ==========================================
// 职责: 请求校验、角色权限、错误映射, 供 HTTP 处理器调用
// ==========================================

pub mod access;
pub mod error;
pub mod job_api;
pub mod queue_api;
pub mod water_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use job_api::{CreateJobRequest, JobApi, JobPage, JobQuery, MaterialRequest, ReprocessRequest, UpdateJobRequest};
pub use queue_api::{QueueApi, ReorderRequest};
pub use water_api::{ClosingRequest, PauseRequest, PauseResponse, StartRequest, WaterApi};
