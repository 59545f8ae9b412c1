// ==========================================
// 染整车间生产流程引擎 - 排队读模型
// ==========================================
// 只读投影: 每次查询现算, 不缓存 (排队顺序变动频繁)
// 规则: canStart 仅给机台当日队首 (Pending 中序号最小者)
// 读取前先对未完结作业做 reconcile 自愈
// ==========================================

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::domain::job::JobRecord;
use crate::domain::types::{AssignmentStatus, JobStatus};
use crate::engine::error::EngineResult;
use crate::engine::lifecycle::JobLifecycle;
use crate::engine::queue::MachineQueue;
use crate::repository::{AssignmentRepository, JobRecordRepository};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    #[serde(flatten)]
    pub job: JobRecord,
    pub can_start: bool,
}

/// 队首作业: 同一机台/日期下 Pending 且序号最小
fn queue_head(jobs: &[JobRecord]) -> Option<&JobRecord> {
    jobs.iter()
        .filter(|job| job.status == JobStatus::Pending && job.order_no.is_some())
        .min_by_key(|job| job.order_no)
}

pub struct AssignmentView {
    job_repo: Arc<JobRecordRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    queue: Arc<MachineQueue>,
    lifecycle: Arc<JobLifecycle>,
}

impl AssignmentView {
    pub fn new(
        job_repo: Arc<JobRecordRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        queue: Arc<MachineQueue>,
        lifecycle: Arc<JobLifecycle>,
    ) -> Self {
        Self {
            job_repo,
            assignment_repo,
            queue,
            lifecycle,
        }
    }

    /// 机台当日排队中的作业 (按序号)
    pub fn for_machine(
        &self,
        machine_no: &str,
        plan_date: &NaiveDate,
        now: NaiveDateTime,
    ) -> EngineResult<Vec<QueueItem>> {
        let mut jobs = self.queue.list(machine_no, plan_date)?;
        if self.lifecycle.reconcile_active(&jobs, now)? > 0 {
            jobs = self.queue.list(machine_no, plan_date)?;
        }

        let mut queued: Vec<JobRecord> = jobs.into_iter().filter(|job| job.order_no.is_some()).collect();
        queued.sort_by_key(|job| job.order_no);
        let head = queue_head(&queued).map(|job| job.job_id.clone());
        Ok(queued
            .into_iter()
            .map(|job| QueueItem {
                can_start: head.as_deref() == Some(job.job_id.as_str()),
                job,
            })
            .collect())
    }

    /// 操作人员在指定日期的待开工作业 (按序号、机台)
    ///
    /// 共用机台时, 只有该机台队首那一条可开工
    pub fn for_operator(
        &self,
        operator: &str,
        plan_date: &NaiveDate,
        now: NaiveDateTime,
    ) -> EngineResult<Vec<QueueItem>> {
        let job_ids: Vec<String> = self
            .assignment_repo
            .find_by_operator(operator)?
            .into_iter()
            .filter(|a| a.status == AssignmentStatus::Pending)
            .map(|a| a.job_id)
            .collect();

        let mut jobs = self.job_repo.find_by_ids(&job_ids)?;
        if self.lifecycle.reconcile_active(&jobs, now)? > 0 {
            jobs = self.job_repo.find_by_ids(&job_ids)?;
        }
        let mut jobs: Vec<JobRecord> = jobs
            .into_iter()
            .filter(|job| job.status == JobStatus::Pending && job.plan_date == *plan_date)
            .collect();
        jobs.sort_by(|a, b| {
            (a.order_no.is_none(), a.order_no, &a.machine_no).cmp(&(
                b.order_no.is_none(),
                b.order_no,
                &b.machine_no,
            ))
        });

        let mut machines: Vec<&str> = jobs.iter().map(|job| job.machine_no.as_str()).collect();
        machines.sort_unstable();
        machines.dedup();
        let mut heads: HashSet<String> = HashSet::new();
        for machine_no in machines {
            if let Some(head) = self.queue.peek_next(machine_no, plan_date)? {
                heads.insert(head.job_id);
            }
        }

        Ok(jobs
            .into_iter()
            .map(|job| QueueItem {
                can_start: heads.contains(&job.job_id),
                job,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowSettings;
    use crate::domain::customer::CustomerDetails;
    use crate::engine::lifecycle::NewJob;
    use crate::engine::repositories::WorkflowRepositories;
    use std::sync::Mutex;

    struct Fixture {
        repos: WorkflowRepositories,
        lifecycle: Arc<JobLifecycle>,
        view: AssignmentView,
        date: NaiveDate,
        now: NaiveDateTime,
    }

    fn setup() -> Fixture {
        let conn = crate::db::open_in_memory().unwrap();
        let repos = WorkflowRepositories::from_connection(Arc::new(Mutex::new(conn)));
        let queue = Arc::new(MachineQueue::new(repos.job_repo.clone(), 3));
        let lifecycle = Arc::new(JobLifecycle::new(repos.clone(), queue.clone(), WorkflowSettings::default()));
        let view = AssignmentView::new(
            repos.job_repo.clone(),
            repos.assignment_repo.clone(),
            queue,
            lifecycle.clone(),
        );
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        Fixture {
            repos,
            lifecycle,
            view,
            date,
            now: date.and_hms_opt(8, 0, 0).unwrap(),
        }
    }

    fn create(fx: &Fixture, receiver: &str, order_no: Option<i32>, operator: &str) {
        fx.repos
            .customer_repo
            .insert(&CustomerDetails {
                customer_id: receiver.to_string(),
                company_name: "Sri Textiles".to_string(),
                customer_name: None,
                receiver_no: receiver.to_string(),
                party_dc_no: None,
                color: None,
                weight: Some(20.0),
                date: None,
            })
            .unwrap();
        fx.lifecycle
            .create(
                NewJob {
                    receiver_no: receiver.to_string(),
                    machine_no: "M1".to_string(),
                    plan_date: fx.date,
                    qty: 1.0,
                    rate: 1.0,
                    order_no,
                    operators: vec![operator.to_string()],
                },
                "admin",
                fx.now,
            )
            .unwrap();
    }

    #[test]
    fn test_only_first_pending_job_can_start() {
        let fx = setup();
        for receiver in ["R1", "R2", "R3"] {
            create(&fx, receiver, Some(1), "Ravi");
        }

        let items = fx.view.for_operator("ravi", &fx.date, fx.now).unwrap();
        let receivers: Vec<&str> = items.iter().map(|i| i.job.receiver_no.as_str()).collect();
        assert_eq!(receivers, vec!["R3", "R2", "R1"]);
        assert_eq!(items.iter().filter(|i| i.can_start).count(), 1);
        assert!(items[0].can_start);

        fx.lifecycle.start("R3", 0.0, "ravi", fx.now).unwrap();
        let items = fx.view.for_operator("Ravi", &fx.date, fx.now).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].job.receiver_no, "R2");
        assert!(items[0].can_start);

        assert!(fx.view.for_operator("Kumar", &fx.date, fx.now).unwrap().is_empty());
    }

    #[test]
    fn test_shared_machine_only_head_owner_can_start() {
        let fx = setup();
        create(&fx, "R1", None, "Kumar");
        create(&fx, "R2", None, "Ravi");

        let ravi = fx.view.for_operator("Ravi", &fx.date, fx.now).unwrap();
        assert_eq!(ravi.len(), 1);
        assert!(!ravi[0].can_start);
        let kumar = fx.view.for_operator("Kumar", &fx.date, fx.now).unwrap();
        assert!(kumar[0].can_start);

        let machine = fx.view.for_machine("M1", &fx.date, fx.now).unwrap();
        let startable: Vec<&str> = machine
            .iter()
            .filter(|i| i.can_start)
            .map(|i| i.job.receiver_no.as_str())
            .collect();
        assert_eq!(startable, vec!["R1"]);
    }
}
