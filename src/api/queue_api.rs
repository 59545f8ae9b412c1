// ==========================================
// 染整车间生产流程引擎 - 机台排队 API
// ==========================================
// 职责: 机台队列、操作人员待办、调序、机台看板
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;

use crate::api::access::require_manager;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::actor::Actor;
use crate::domain::history::{history_actions, HistoryEntry};
use crate::domain::job::JobRecord;
use crate::domain::machine_status::MachineStatus;
use crate::engine::assignment_view::{AssignmentView, QueueItem};
use crate::engine::queue::MachineQueue;
use crate::engine::repositories::WorkflowRepositories;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub order_no: i32,
}

pub struct QueueApi {
    repos: WorkflowRepositories,
    queue: Arc<MachineQueue>,
    assignment_view: Arc<AssignmentView>,
}

impl QueueApi {
    pub fn new(repos: WorkflowRepositories, queue: Arc<MachineQueue>, assignment_view: Arc<AssignmentView>) -> Self {
        Self {
            repos,
            queue,
            assignment_view,
        }
    }

    /// 机台当日队列 (按序号, 队首 Pending 作业 canStart)
    ///
    /// # 返回
    /// - `Err(NotFound)`: 该机台当日没有排队作业
    pub fn machine_queue(&self, machine_no: &str, plan_date: NaiveDate, now: NaiveDateTime) -> ApiResult<Vec<QueueItem>> {
        let machine_no = machine_no.trim();
        if machine_no.is_empty() {
            return Err(ApiError::ValidationError("机台号不能为空".to_string()));
        }

        let items = self.assignment_view.for_machine(machine_no, &plan_date, now)?;
        if items.is_empty() {
            return Err(ApiError::NotFound(format!(
                "机台{}在{}没有排队作业",
                machine_no, plan_date
            )));
        }
        Ok(items)
    }

    /// 操作人员待办
    ///
    /// 操作工只能看自己的; 管理角色可通过 operator 指定任意人员
    pub fn operator_queue(
        &self,
        actor: &Actor,
        operator: Option<&str>,
        plan_date: NaiveDate,
        now: NaiveDateTime,
    ) -> ApiResult<Vec<QueueItem>> {
        let requested = operator.map(str::trim).filter(|o| !o.is_empty());
        let target = match requested {
            Some(name) if actor.can_manage() => name.to_string(),
            Some(name) if name.eq_ignore_ascii_case(actor.display_name()) => name.to_string(),
            Some(_) => {
                return Err(ApiError::Forbidden("操作工只能查看本人的待办".to_string()));
            }
            None => actor.display_name().to_string(),
        };
        Ok(self.assignment_view.for_operator(&target, &plan_date, now)?)
    }

    /// 调整待开工作业的排队序号
    pub fn reorder(
        &self,
        actor: &Actor,
        job_id: &str,
        req: ReorderRequest,
        now: NaiveDateTime,
    ) -> ApiResult<JobRecord> {
        require_manager(actor)?;
        let job = self
            .repos
            .job_repo
            .find_by_id(job_id)?
            .ok_or_else(|| ApiError::NotFound(format!("作业不存在: {}", job_id)))?;
        let from = job.order_no;
        let slot = self.queue.reorder(&job, req.order_no)?;

        // 重新读取以拿到落库后的序号
        let mut job = self
            .repos
            .job_repo
            .find_by_id(job_id)?
            .ok_or_else(|| ApiError::NotFound(format!("作业不存在: {}", job_id)))?;
        if from != Some(slot) {
            job.push_history(
                HistoryEntry::new(history_actions::QUEUE_REORDERED, actor.display_name(), now).with_changes(
                    &json!({ "from": from, "to": slot, "requested": req.order_no }),
                ),
            );
            self.repos.job_repo.save(&job)?;
            tracing::info!(
                job_id = %job.job_id,
                machine_no = %job.machine_no,
                from = ?from,
                order_no = slot,
                "排队序号已调整"
            );
        }
        Ok(job)
    }

    /// 机台看板
    pub fn machine_statuses(&self) -> ApiResult<Vec<MachineStatus>> {
        Ok(self.repos.machine_status_repo.list_all()?)
    }
}
