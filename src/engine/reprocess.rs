// ==========================================
// 染整车间生产流程引擎 - 回修引擎
// ==========================================
// 回修 = 新建下一代作业, 不是旧作业的状态转换
// 旧作业: 转 Reprocess 标记, 离队, 分派标记 Reprocess
// 新作业: cycle = 链上最大代次 + 1, 结转旧作业成本, 重新入队
// 写入顺序: 计量 → 新作业 → 旧作业 → 客户回单号
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::history::{history_actions, HistoryEntry};
use crate::domain::job::{JobRecord, ReceiverId};
use crate::domain::types::{AssignmentStatus, JobStatus};
use crate::engine::cost;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::lifecycle::JobLifecycle;
use crate::engine::queue::MachineQueue;
use crate::engine::repositories::WorkflowRepositories;
use crate::repository::RepositoryError;

/// 回修参数 (均可省略)
#[derive(Debug, Clone, Default)]
pub struct ReprocessOptions {
    /// 新作业日期, 默认当天
    pub plan_date: Option<NaiveDate>,
    /// 新作业机台, 默认沿用
    pub machine_no: Option<String>,
    /// 新作业排队序号, 默认排到队尾
    pub order_no: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessOutcome {
    pub job: JobRecord,
    pub previous: JobRecord,
}

// ==========================================
// ReprocessEngine - 回修引擎
// ==========================================
pub struct ReprocessEngine {
    repos: WorkflowRepositories,
    queue: Arc<MachineQueue>,
    lifecycle: Arc<JobLifecycle>,
}

impl ReprocessEngine {
    pub fn new(repos: WorkflowRepositories, queue: Arc<MachineQueue>, lifecycle: Arc<JobLifecycle>) -> Self {
        Self {
            repos,
            queue,
            lifecycle,
        }
    }

    /// 按回单号回修 (取回修链上的最新一代)
    pub fn reprocess_by_receiver(
        &self,
        receiver_no: &str,
        options: ReprocessOptions,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<ReprocessOutcome> {
        let receiver_no = receiver_no.trim();
        let base = match self.repos.job_repo.find_by_receiver(receiver_no)?.into_iter().next() {
            Some(job) => job.base_receiver,
            None => ReceiverId::parse(receiver_no).base,
        };
        let latest = self
            .repos
            .job_repo
            .find_by_base(&base)?
            .into_iter()
            .last()
            .ok_or_else(|| EngineError::NotFound(format!("回单号{}没有作业记录", receiver_no)))?;
        self.reprocess(latest, options, actor, now)
    }

    /// 按作业主键回修
    pub fn reprocess_by_id(
        &self,
        job_id: &str,
        options: ReprocessOptions,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<ReprocessOutcome> {
        let job = self
            .repos
            .job_repo
            .find_by_id(job_id)?
            .ok_or_else(|| EngineError::NotFound(format!("作业不存在: {}", job_id)))?;
        self.reprocess(job, options, actor, now)
    }

    fn reprocess(
        &self,
        mut previous: JobRecord,
        options: ReprocessOptions,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<ReprocessOutcome> {
        match previous.status {
            JobStatus::Pending => {
                return Err(EngineError::Conflict(format!(
                    "回单号{}仍在待开工, 不能回修",
                    previous.receiver_no
                )))
            }
            JobStatus::Reprocess => {
                let successor = self
                    .repos
                    .job_repo
                    .find_by_base(&previous.base_receiver)?
                    .into_iter()
                    .last()
                    .map(|j| j.receiver_no)
                    .unwrap_or_default();
                return Err(EngineError::Conflict(format!(
                    "回单号{}已转入回修, 后续代次为{}",
                    previous.receiver_no, successor
                )));
            }
            JobStatus::Running | JobStatus::Paused | JobStatus::Stopped | JobStatus::Completed => {}
        }

        let machine_no = options
            .machine_no
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&previous.machine_no)
            .to_string();
        let plan_date = options.plan_date.unwrap_or_else(|| now.date());

        // 1) 计量: 运行中的先停机, 并取出尚未并入作业的用水成本
        let mut water = self.lifecycle.water_for_job(&previous)?;
        if let Some(session) = water.as_mut().filter(|w| w.status.is_open()) {
            self.lifecycle.close_water_session(session, None, actor, now)?;
            previous.running_time_minutes = session.running_time_minutes;
        }
        let unfolded_water = water
            .as_ref()
            .map(|w| (w.total_water_cost - previous.water_cost).max(0.0))
            .unwrap_or(0.0);
        let carried_cost = cost::round2(previous.total_cost + unfolded_water);

        // 2) 新作业
        let cycle = self.repos.job_repo.max_cycle(&previous.base_receiver)? + 1;
        let receiver_no = ReceiverId::new(previous.base_receiver.clone(), cycle).display();
        let mut job = JobRecord {
            job_id: Uuid::new_v4().to_string(),
            receiver_no: receiver_no.clone(),
            base_receiver: previous.base_receiver.clone(),
            cycle,
            machine_no,
            plan_date,
            order_no: None,
            qty: previous.qty,
            rate: previous.rate,
            base_cost: previous.base_cost,
            carried_cost: Some(carried_cost),
            water_cost: 0.0,
            chemical_cost: 0.0,
            dye_cost: 0.0,
            total_cost: carried_cost,
            running_time_minutes: 0.0,
            status: JobStatus::Pending,
            operators: previous.operators.clone(),
            chemicals: Vec::new(),
            dyes: Vec::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        job.push_history(
            HistoryEntry::new(history_actions::REPROCESS_CREATED, actor, now).with_changes(&json!({
                "previousReceiverNo": previous.receiver_no,
                "previousJobId": previous.job_id,
                "cycle": cycle,
                "carriedCost": carried_cost,
                "unfoldedWaterCost": unfolded_water,
            })),
        );
        let slot = self.queue.assign(&job, options.order_no)?;
        job.order_no = Some(slot);
        self.lifecycle.assign_operators(&job, now)?;

        // 3) 旧作业
        let previous_status = previous.status;
        previous.status = JobStatus::Reprocess;
        previous.push_history(
            HistoryEntry::new(history_actions::REPROCESS_STARTED, actor, now).with_changes(&json!({
                "previousStatus": previous_status,
                "successorReceiverNo": receiver_no,
                "successorJobId": job.job_id,
                "carriedCost": carried_cost,
            })),
        );
        self.repos.job_repo.save(&previous)?;
        if previous.order_no.is_some() {
            self.queue.remove(&mut previous)?;
        }
        self.repos
            .assignment_repo
            .set_status_for_job(&previous.job_id, AssignmentStatus::Reprocess)?;

        // 4) 客户回单号跟随新代次
        match self
            .repos
            .customer_repo
            .update_receiver_no(&previous.receiver_no, &receiver_no)
        {
            Ok(()) => {}
            Err(RepositoryError::NotFound { .. }) => {
                tracing::warn!(
                    receiver_no = %previous.receiver_no,
                    successor = %receiver_no,
                    "客户来料记录不在旧回单号下, 跳过改名"
                );
            }
            Err(err) => return Err(err.into()),
        }

        // 旧作业与新作业同机台同日时, 旧作业离队会让新作业前移
        let job = self.repos.job_repo.find_by_id(&job.job_id)?.unwrap_or(job);

        tracing::info!(
            job_id = %job.job_id,
            previous_job_id = %previous.job_id,
            receiver_no = %receiver_no,
            cycle,
            carried_cost,
            order_no = job.order_no.unwrap_or(slot),
            actor = actor,
            "回修作业已创建"
        );
        Ok(ReprocessOutcome { job, previous })
    }
}
