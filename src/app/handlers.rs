// ==========================================
// 染整车间生产流程引擎 - HTTP 处理器
// ==========================================
// 每个处理器: 取一次 now → spawn_blocking 调用同步 API → JSON 响应
// 请求体/查询串解析失败统一转为 ValidationError ({message} 响应体)
// ==========================================

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{
    ApiError, ApiResult, ClosingRequest, CreateJobRequest, JobPage, JobQuery, MaterialRequest, PauseRequest,
    PauseResponse, ReorderRequest, ReprocessRequest, StartRequest, UpdateJobRequest,
};
use crate::app::state::AppState;
use crate::domain::{Actor, HistoryEntry, JobRecord, MachineStatus, WaterProcess};
use crate::engine::{CostOutcome, QueueItem, ReprocessOutcome, TransitionOutcome};

// ==========================================
// 公共辅助
// ==========================================

/// 请求时刻 (本地时间, 整个请求内复用)
fn request_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// 在阻塞线程池中执行同步 API
async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::InternalError(format!("后台任务失败: {}", e)))?
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::ValidationError(format!("请求体格式错误: {}", e.body_text())))
}

/// 可省略的请求体: 未带 JSON 内容类型时取默认值
fn optional_body<T: Default>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(e) => Err(ApiError::ValidationError(format!("请求体格式错误: {}", e.body_text()))),
    }
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(value)| value)
        .map_err(|e| ApiError::ValidationError(format!("查询参数格式错误: {}", e.body_text())))
}

// ==========================================
// 查询参数
// ==========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineQueueParams {
    pub machine_no: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorQueueParams {
    pub operator: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedParams {
    pub receiver_no: Option<String>,
    pub status: Option<String>,
    pub machine_no: Option<String>,
    pub date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

// ==========================================
// 健康检查
// ==========================================

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

// ==========================================
// 作业生命周期
// ==========================================

pub async fn create_job(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    let req = body(payload)?;
    let now = request_now();
    let api = state.job_api.clone();
    let job = run_blocking(move || api.create_job(&actor, req, now)).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn start_water(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TransitionOutcome>)> {
    let req = body(payload)?;
    let now = request_now();
    let api = state.water_api.clone();
    let outcome = run_blocking(move || api.start(&actor, req, now)).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn pause_water(
    State(state): State<AppState>,
    actor: Actor,
    Path(water_id): Path<String>,
    payload: Result<Json<PauseRequest>, JsonRejection>,
) -> ApiResult<Json<PauseResponse>> {
    let req = optional_body(payload)?;
    let now = request_now();
    let api = state.water_api.clone();
    let outcome = run_blocking(move || api.pause_or_resume(&actor, &water_id, req, now)).await?;
    Ok(Json(outcome))
}

pub async fn stop_water(
    State(state): State<AppState>,
    actor: Actor,
    Path(water_id): Path<String>,
    payload: Result<Json<ClosingRequest>, JsonRejection>,
) -> ApiResult<Json<TransitionOutcome>> {
    let req = optional_body(payload)?;
    let now = request_now();
    let api = state.water_api.clone();
    let outcome = run_blocking(move || api.stop(&actor, &water_id, req, now)).await?;
    Ok(Json(outcome))
}

pub async fn calculate_cost(
    State(state): State<AppState>,
    actor: Actor,
    Path(water_id): Path<String>,
    payload: Result<Json<ClosingRequest>, JsonRejection>,
) -> ApiResult<Json<CostOutcome>> {
    let req = optional_body(payload)?;
    let now = request_now();
    let api = state.water_api.clone();
    let outcome = run_blocking(move || api.calculate_cost(&actor, &water_id, req, now)).await?;
    Ok(Json(outcome))
}

pub async fn reprocess_by_receiver(
    State(state): State<AppState>,
    actor: Actor,
    Path(receiver_no): Path<String>,
    payload: Result<Json<ReprocessRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReprocessOutcome>)> {
    let req = optional_body(payload)?;
    let now = request_now();
    let api = state.job_api.clone();
    let outcome = run_blocking(move || api.reprocess_by_receiver(&actor, &receiver_no, req, now)).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn reprocess_by_id(
    State(state): State<AppState>,
    actor: Actor,
    Path(job_id): Path<String>,
    payload: Result<Json<ReprocessRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReprocessOutcome>)> {
    let req = optional_body(payload)?;
    let now = request_now();
    let api = state.job_api.clone();
    let outcome = run_blocking(move || api.reprocess_by_id(&actor, &job_id, req, now)).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

// ==========================================
// 排队与看板
// ==========================================

pub async fn machine_queue(
    State(state): State<AppState>,
    _actor: Actor,
    params: Result<Query<MachineQueueParams>, QueryRejection>,
) -> ApiResult<Json<Vec<QueueItem>>> {
    let params = query(params)?;
    let machine_no = params
        .machine_no
        .ok_or_else(|| ApiError::ValidationError("缺少 machineNo 参数".to_string()))?;
    let now = request_now();
    let date = params.date.unwrap_or_else(|| now.date());
    let api = state.queue_api.clone();
    let items = run_blocking(move || api.machine_queue(&machine_no, date, now)).await?;
    Ok(Json(items))
}

pub async fn operator_queue(
    State(state): State<AppState>,
    actor: Actor,
    params: Result<Query<OperatorQueueParams>, QueryRejection>,
) -> ApiResult<Json<Vec<QueueItem>>> {
    let params = query(params)?;
    let now = request_now();
    let date = params.date.unwrap_or_else(|| now.date());
    let api = state.queue_api.clone();
    let items = run_blocking(move || api.operator_queue(&actor, params.operator.as_deref(), date, now)).await?;
    Ok(Json(items))
}

pub async fn machine_statuses(State(state): State<AppState>, _actor: Actor) -> ApiResult<Json<Vec<MachineStatus>>> {
    let api = state.queue_api.clone();
    let statuses = run_blocking(move || api.machine_statuses()).await?;
    Ok(Json(statuses))
}

pub async fn reorder_job(
    State(state): State<AppState>,
    actor: Actor,
    Path(job_id): Path<String>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> ApiResult<Json<JobRecord>> {
    let req = body(payload)?;
    let now = request_now();
    let api = state.queue_api.clone();
    let job = run_blocking(move || api.reorder(&actor, &job_id, req, now)).await?;
    Ok(Json(job))
}

// ==========================================
// 作业查询与维护
// ==========================================

pub async fn list_jobs(
    State(state): State<AppState>,
    _actor: Actor,
    params: Result<Query<JobQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    let params = query(params)?;
    let api = state.job_api.clone();
    let jobs = run_blocking(move || api.list_jobs(&params)).await?;
    Ok(Json(jobs))
}

pub async fn list_jobs_paged(
    State(state): State<AppState>,
    _actor: Actor,
    params: Result<Query<PagedParams>, QueryRejection>,
) -> ApiResult<Json<JobPage>> {
    let params = query(params)?;
    let filter = JobQuery {
        receiver_no: params.receiver_no,
        status: params.status,
        machine_no: params.machine_no,
        date: params.date,
    };
    let api = state.job_api.clone();
    let page = run_blocking(move || api.list_jobs_paged(&filter, params.page, params.limit)).await?;
    Ok(Json(page))
}

pub async fn search_jobs(
    State(state): State<AppState>,
    _actor: Actor,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    let keyword = query(params)?.q.unwrap_or_default();
    let api = state.job_api.clone();
    let jobs = run_blocking(move || api.search_jobs(&keyword)).await?;
    Ok(Json(jobs))
}

pub async fn latest_jobs(State(state): State<AppState>, _actor: Actor) -> ApiResult<Json<Vec<JobRecord>>> {
    let api = state.job_api.clone();
    let jobs = run_blocking(move || api.latest_per_receiver()).await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    _actor: Actor,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    let now = request_now();
    let api = state.job_api.clone();
    let job = run_blocking(move || api.get_job(&job_id, now)).await?;
    Ok(Json(job))
}

pub async fn job_history(
    State(state): State<AppState>,
    _actor: Actor,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let now = request_now();
    let api = state.job_api.clone();
    let history = run_blocking(move || api.job_history(&job_id, now)).await?;
    Ok(Json(history))
}

pub async fn update_job(
    State(state): State<AppState>,
    actor: Actor,
    Path(job_id): Path<String>,
    payload: Result<Json<UpdateJobRequest>, JsonRejection>,
) -> ApiResult<Json<JobRecord>> {
    let req = body(payload)?;
    let now = request_now();
    let api = state.job_api.clone();
    let job = run_blocking(move || api.update_job(&actor, &job_id, req, now)).await?;
    Ok(Json(job))
}

pub async fn delete_job(
    State(state): State<AppState>,
    actor: Actor,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let api = state.job_api.clone();
    let deleted = job_id.clone();
    run_blocking(move || api.delete_job(&actor, &job_id)).await?;
    Ok(Json(json!({ "message": "作业已删除", "jobId": deleted })))
}

pub async fn add_chemical(
    State(state): State<AppState>,
    actor: Actor,
    Path(job_id): Path<String>,
    payload: Result<Json<MaterialRequest>, JsonRejection>,
) -> ApiResult<Json<JobRecord>> {
    let req = body(payload)?;
    let now = request_now();
    let api = state.job_api.clone();
    let job = run_blocking(move || api.add_chemical(&actor, &job_id, req, now)).await?;
    Ok(Json(job))
}

pub async fn add_dye(
    State(state): State<AppState>,
    actor: Actor,
    Path(job_id): Path<String>,
    payload: Result<Json<MaterialRequest>, JsonRejection>,
) -> ApiResult<Json<JobRecord>> {
    let req = body(payload)?;
    let now = request_now();
    let api = state.job_api.clone();
    let job = run_blocking(move || api.add_dye(&actor, &job_id, req, now)).await?;
    Ok(Json(job))
}

pub async fn list_cycles(
    State(state): State<AppState>,
    _actor: Actor,
    Path(base_receiver): Path<String>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    let api = state.job_api.clone();
    let jobs = run_blocking(move || api.list_cycles(&base_receiver)).await?;
    Ok(Json(jobs))
}

// ==========================================
// 用水计量查询
// ==========================================

pub async fn get_water(
    State(state): State<AppState>,
    _actor: Actor,
    Path(water_id): Path<String>,
) -> ApiResult<Json<WaterProcess>> {
    let api = state.water_api.clone();
    let water = run_blocking(move || api.get_water(&water_id)).await?;
    Ok(Json(water))
}

pub async fn water_by_receiver(
    State(state): State<AppState>,
    _actor: Actor,
    Path(receiver_no): Path<String>,
) -> ApiResult<Json<Vec<WaterProcess>>> {
    let api = state.water_api.clone();
    let sessions = run_blocking(move || api.find_by_receiver(&receiver_no)).await?;
    Ok(Json(sessions))
}
