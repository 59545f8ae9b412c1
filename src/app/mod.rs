// ==========================================
// 染整车间生产流程引擎 - 应用层
// ==========================================
// 职责: axum 集成, 连接 HTTP 请求与 API 层
// ==========================================

pub mod auth;
pub mod handlers;
pub mod router;
pub mod state;

// 重导出
pub use auth::{StaticTokenVerifier, TokenVerifier};
pub use router::build_router;
pub use state::AppState;
