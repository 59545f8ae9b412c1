// ==========================================
// 染整车间生产流程引擎 - 机台排队
// ==========================================
// 不变量: 同一 (机台, 日期) 下占位作业的 order_no 恰为 {1..N}
// 插入: 目标位已占用时 >= 目标位的作业整体后移, 不拒绝
// 并发: 依赖存储层唯一索引 + 冲突重试, 不使用进程内锁
// ==========================================

use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::job::JobRecord;
use crate::domain::types::JobStatus;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::{JobRecordRepository, RepositoryError};

/// 排队位唯一冲突 (区别于回修代次冲突)
fn is_slot_collision(err: &RepositoryError) -> bool {
    matches!(err, RepositoryError::UniqueConstraintViolation(msg) if msg.contains("order_no"))
}

// ==========================================
// MachineQueue - 机台排队
// ==========================================
pub struct MachineQueue {
    job_repo: Arc<JobRecordRepository>,
    retry_limit: u32,
}

impl MachineQueue {
    pub fn new(job_repo: Arc<JobRecordRepository>, retry_limit: u32) -> Self {
        Self {
            job_repo,
            retry_limit: retry_limit.max(1),
        }
    }

    /// 新作业入队
    ///
    /// # 参数
    /// - `job`: 待插入作业 (尚未落库)
    /// - `desired`: 期望序号, None 表示排到队尾; 超过 N+1 时钳到 N+1
    ///
    /// # 返回
    /// 实际占用的序号
    pub fn assign(&self, job: &JobRecord, desired: Option<i32>) -> EngineResult<i32> {
        if let Some(order_no) = desired {
            if order_no < 1 {
                return Err(EngineError::ValidationError(format!(
                    "排队序号必须 >= 1: {}",
                    order_no
                )));
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let tail = self.job_repo.max_order_no(&job.machine_no, &job.plan_date)? + 1;
            let slot = desired.map_or(tail, |d| d.min(tail));

            match self.job_repo.insert_with_shift(job, slot) {
                Ok(()) => {
                    tracing::info!(
                        job_id = %job.job_id,
                        machine_no = %job.machine_no,
                        order_no = slot,
                        shifted = slot < tail,
                        "作业已入队"
                    );
                    return Ok(slot);
                }
                Err(err) if is_slot_collision(&err) && attempt < self.retry_limit => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        machine_no = %job.machine_no,
                        attempt,
                        "排队位冲突, 重试"
                    );
                }
                Err(err) if err.is_unique_violation() && !is_slot_collision(&err) => {
                    return Err(EngineError::Conflict(format!(
                        "回单号代次已存在: {} 第{}代",
                        job.base_receiver, job.cycle
                    )));
                }
                Err(err) if is_slot_collision(&err) => {
                    return Err(EngineError::Conflict(format!(
                        "排队位冲突, 已重试{}次: machine={}, date={}",
                        attempt, job.machine_no, job.plan_date
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// 作业离队, 后续作业前移
    ///
    /// # 返回
    /// 原序号; 作业本就不在队中时为 None
    pub fn remove(&self, job: &mut JobRecord) -> EngineResult<Option<i32>> {
        let released = self.job_repo.release_slot(&job.job_id)?;
        if let Some(slot) = released {
            tracing::debug!(job_id = %job.job_id, machine_no = %job.machine_no, order_no = slot, "作业离队");
        }
        job.order_no = None;
        Ok(released)
    }

    /// 队内调整序号 (仅 Pending 作业)
    ///
    /// 超过 N 时钳到 N
    pub fn reorder(&self, job: &JobRecord, desired: i32) -> EngineResult<i32> {
        if desired < 1 {
            return Err(EngineError::ValidationError(format!(
                "排队序号必须 >= 1: {}",
                desired
            )));
        }
        if job.status != JobStatus::Pending || job.order_no.is_none() {
            return Err(EngineError::Conflict(format!(
                "只有排队中的待开工作业可以调整顺序: {} ({})",
                job.receiver_no, job.status
            )));
        }

        let tail = self.job_repo.max_order_no(&job.machine_no, &job.plan_date)?;
        let slot = desired.min(tail);
        if Some(slot) != job.order_no {
            self.job_repo.move_slot(&job.job_id, slot)?;
        }
        Ok(slot)
    }

    /// 机台/日期下的全部作业 (排队中的按序号在前)
    pub fn list(&self, machine_no: &str, plan_date: &NaiveDate) -> EngineResult<Vec<JobRecord>> {
        Ok(self.job_repo.list_by_machine_date(machine_no, plan_date)?)
    }

    /// 队首: Pending 作业中序号最小者
    pub fn peek_next(&self, machine_no: &str, plan_date: &NaiveDate) -> EngineResult<Option<JobRecord>> {
        Ok(self
            .list(machine_no, plan_date)?
            .into_iter()
            .filter(|job| job.status == JobStatus::Pending && job.order_no.is_some())
            .min_by_key(|job| job.order_no))
    }
}
