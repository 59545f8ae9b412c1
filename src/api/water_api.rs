// ==========================================
// 染整车间生产流程引擎 - 用水计量 API
// ==========================================
// 职责: 开工、暂停/恢复、停机、成本核算、计量查询
// 权限: 操作工只能操作分派给自己的作业
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::access::{require_manager, require_operate};
use crate::api::error::{ApiError, ApiResult};
use crate::domain::actor::Actor;
use crate::domain::types::JobStatus;
use crate::domain::water::WaterProcess;
use crate::engine::lifecycle::{CostOutcome, JobLifecycle, PauseMode, TransitionOutcome};
use crate::engine::repositories::WorkflowRepositories;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(alias = "receiverNo")]
    pub receiver_number: String,
    pub opening_reading: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseRequest {
    pub remarks: Option<String>,
    /// toggle | pause | resume, 默认 toggle
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingRequest {
    pub closing_reading: Option<f64>,
}

/// 暂停/恢复响应
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseResponse {
    pub running_time: f64,
    pub status: String,
    #[serde(flatten)]
    pub outcome: TransitionOutcome,
}

pub struct WaterApi {
    repos: WorkflowRepositories,
    lifecycle: Arc<JobLifecycle>,
}

impl WaterApi {
    pub fn new(repos: WorkflowRepositories, lifecycle: Arc<JobLifecycle>) -> Self {
        Self { repos, lifecycle }
    }

    /// 开工
    pub fn start(&self, actor: &Actor, req: StartRequest, now: NaiveDateTime) -> ApiResult<TransitionOutcome> {
        let receiver_no = req.receiver_number.trim().to_string();
        if receiver_no.is_empty() {
            return Err(ApiError::ValidationError("回单号不能为空".to_string()));
        }
        if !actor.can_manage() {
            // 操作工: 待开工作业必须分派给本人; 找不到时交由引擎给出准确错误
            let pending = self
                .repos
                .job_repo
                .find_by_receiver(&receiver_no)?
                .into_iter()
                .find(|j| j.status == JobStatus::Pending);
            if let Some(job) = pending {
                require_operate(actor, &job)?;
            }
        }
        Ok(self
            .lifecycle
            .start(&receiver_no, req.opening_reading, actor.display_name(), now)?)
    }

    /// 暂停 / 恢复
    pub fn pause_or_resume(
        &self,
        actor: &Actor,
        water_id: &str,
        req: PauseRequest,
        now: NaiveDateTime,
    ) -> ApiResult<PauseResponse> {
        let mode = match req.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => PauseMode::from_str(raw)
                .ok_or_else(|| ApiError::ValidationError(format!("未知的暂停模式: {}", raw)))?,
            None => PauseMode::default(),
        };
        self.check_operate(actor, water_id)?;

        let outcome = self
            .lifecycle
            .pause_or_resume(water_id, mode, req.remarks, actor.display_name(), now)?;
        Ok(PauseResponse {
            running_time: outcome.water.running_time_minutes,
            status: outcome.water.status.as_str().to_string(),
            outcome,
        })
    }

    /// 停机
    pub fn stop(
        &self,
        actor: &Actor,
        water_id: &str,
        req: ClosingRequest,
        now: NaiveDateTime,
    ) -> ApiResult<TransitionOutcome> {
        self.check_operate(actor, water_id)?;
        Ok(self
            .lifecycle
            .stop(water_id, req.closing_reading, actor.display_name(), now)?)
    }

    /// 成本核算并完工
    pub fn calculate_cost(
        &self,
        actor: &Actor,
        water_id: &str,
        req: ClosingRequest,
        now: NaiveDateTime,
    ) -> ApiResult<CostOutcome> {
        require_manager(actor)?;
        Ok(self
            .lifecycle
            .calculate_cost(water_id, req.closing_reading, actor.display_name(), now)?)
    }

    /// 计量会话详情 (含履历)
    pub fn get_water(&self, water_id: &str) -> ApiResult<WaterProcess> {
        self.repos
            .water_repo
            .find_by_id(water_id)?
            .ok_or_else(|| ApiError::NotFound(format!("计量会话不存在: {}", water_id)))
    }

    /// 回单号下的全部计量会话 (新的在前)
    pub fn find_by_receiver(&self, receiver_no: &str) -> ApiResult<Vec<WaterProcess>> {
        Ok(self.repos.water_repo.find_by_receiver(receiver_no.trim())?)
    }

    fn check_operate(&self, actor: &Actor, water_id: &str) -> ApiResult<()> {
        if actor.can_manage() {
            return Ok(());
        }
        let water = self.get_water(water_id)?;
        match self.lifecycle.job_for_water(&water)? {
            Some(job) => require_operate(actor, &job),
            None => Err(ApiError::Forbidden(format!("计量会话{}没有可操作的作业", water_id))),
        }
    }
}
