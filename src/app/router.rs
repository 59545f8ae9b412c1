// ==========================================
// 染整车间生产流程引擎 - 路由
// ==========================================
// /health            - 存活检查 (免鉴权)
// /api/process/*     - 生产流程接口 (Bearer 令牌)
// ==========================================

use axum::routing::{get, post, put};
use axum::Router;

use crate::app::handlers::*;
use crate::app::state::AppState;

/// 组装完整路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/process", process_router())
        .with_state(state)
}

/// 生产流程路由
///
/// 鉴权由 Actor 提取器完成, 角色校验在 API 层
fn process_router() -> Router<AppState> {
    Router::new()
        // 生命周期
        .route("/create", post(create_job))
        .route("/start", post(start_water))
        .route("/pause/{id}", post(pause_water))
        .route("/stop/{id}", post(stop_water))
        .route("/calc-cost/{id}", post(calculate_cost).patch(calculate_cost))
        .route("/reprocess/{receiver_no}", put(reprocess_by_receiver))
        .route("/reprocess/id/{job_id}", put(reprocess_by_id))
        // 排队与看板
        .route("/machine", get(machine_queue))
        .route("/operator/queue", get(operator_queue))
        .route("/machine-status", get(machine_statuses))
        // 作业
        .route("/jobs", get(list_jobs))
        .route("/jobs/paged", get(list_jobs_paged))
        .route("/jobs/search", get(search_jobs))
        .route("/jobs/latest", get(latest_jobs))
        .route("/jobs/{id}", get(get_job).put(update_job).delete(delete_job))
        .route("/jobs/{id}/history", get(job_history))
        .route("/jobs/{id}/order", put(reorder_job))
        .route("/jobs/{id}/chemical", post(add_chemical))
        .route("/jobs/{id}/dye", post(add_dye))
        .route("/cycles/{base_receiver}", get(list_cycles))
        // 用水计量
        .route("/water/{id}", get(get_water))
        .route("/water/receiver/{receiver_no}", get(water_by_receiver))
}
