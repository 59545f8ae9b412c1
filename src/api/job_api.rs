// ==========================================
// 染整车间生产流程引擎 - 作业 API
// ==========================================
// 职责: 建单、查询、修改、删除、物料追加、回修
// 红线: 单条作业读取一律经 reconcile 自愈
// 时间: now 由调用方 (HTTP 入口) 取一次传入
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api::access::{require_manager, require_owner_or_admin};
use crate::api::error::{ApiError, ApiResult};
use crate::domain::actor::Actor;
use crate::domain::history::{history_actions, HistoryEntry};
use crate::domain::job::{JobRecord, MaterialLine, ReceiverId};
use crate::domain::types::{JobStatus, MaterialKind};
use crate::engine::cost;
use crate::engine::lifecycle::{normalize_operators, JobLifecycle, NewJob};
use crate::engine::reprocess::{ReprocessEngine, ReprocessOptions, ReprocessOutcome};
use crate::engine::repositories::WorkflowRepositories;
use crate::repository::{HistoryEntity, JobFilter};

/// 分页默认条数
pub const DEFAULT_PAGE_LIMIT: i64 = 20;
/// 分页最大条数
pub const MAX_PAGE_LIMIT: i64 = 200;

// ==========================================
// 请求 / 响应
// ==========================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[serde(alias = "receiverNo")]
    pub receiver_number: String,
    pub qty: f64,
    pub machine_no: String,
    pub rate: f64,
    #[serde(default)]
    pub order_no: Option<i32>,
    /// 省略时取当天
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub operators: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobRequest {
    pub qty: Option<f64>,
    pub rate: Option<f64>,
    pub operators: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRequest {
    pub name: String,
    pub qty: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessRequest {
    pub date: Option<NaiveDate>,
    pub machine_no: Option<String>,
    pub order_no: Option<i32>,
}

/// 列表过滤 (查询串)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    #[serde(alias = "receiverNumber")]
    pub receiver_no: Option<String>,
    pub status: Option<String>,
    pub machine_no: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub items: Vec<JobRecord>,
}

// ==========================================
// JobApi - 作业 API
// ==========================================
pub struct JobApi {
    repos: WorkflowRepositories,
    lifecycle: Arc<JobLifecycle>,
    reprocess_engine: Arc<ReprocessEngine>,
}

impl JobApi {
    pub fn new(
        repos: WorkflowRepositories,
        lifecycle: Arc<JobLifecycle>,
        reprocess_engine: Arc<ReprocessEngine>,
    ) -> Self {
        Self {
            repos,
            lifecycle,
            reprocess_engine,
        }
    }

    // ==========================================
    // 建单
    // ==========================================

    /// 新建作业
    ///
    /// # 返回
    /// - `Err(NotFound)`: 客户回单号不存在
    /// - `Err(Conflict)`: 回单号已有未完结作业
    pub fn create_job(&self, actor: &Actor, req: CreateJobRequest, now: NaiveDateTime) -> ApiResult<JobRecord> {
        require_manager(actor)?;
        if let Some(order_no) = req.order_no {
            if order_no < 1 {
                return Err(ApiError::ValidationError(format!("排队序号必须 >= 1: {}", order_no)));
            }
        }

        let new_job = NewJob {
            receiver_no: req.receiver_number,
            machine_no: req.machine_no,
            plan_date: req.date.unwrap_or_else(|| now.date()),
            qty: req.qty,
            rate: req.rate,
            order_no: req.order_no,
            operators: req.operators,
        };
        Ok(self.lifecycle.create(new_job, actor.display_name(), now)?)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 作业详情 (含物料明细与履历, 读取前自愈同步)
    pub fn get_job(&self, job_id: &str, now: NaiveDateTime) -> ApiResult<JobRecord> {
        let job = self.load_job(job_id)?;
        Ok(self.lifecycle.reconcile(job, now)?)
    }

    /// 作业履历 (按时间先后, 读取前自愈同步)
    pub fn job_history(&self, job_id: &str, now: NaiveDateTime) -> ApiResult<Vec<HistoryEntry>> {
        let job = self.get_job(job_id, now)?;
        Ok(self.repos.history_repo.list_for(HistoryEntity::Job, &job.job_id)?)
    }

    /// 条件列表 (创建时间倒序)
    pub fn list_jobs(&self, query: &JobQuery) -> ApiResult<Vec<JobRecord>> {
        let filter = build_filter(query)?;
        Ok(self.repos.job_repo.find_by_filter(&filter, None, None)?)
    }

    /// 分页列表
    pub fn list_jobs_paged(&self, query: &JobQuery, page: Option<i64>, limit: Option<i64>) -> ApiResult<JobPage> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page < 1 {
            return Err(ApiError::ValidationError(format!("页码必须 >= 1: {}", page)));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(ApiError::ValidationError(format!(
                "每页条数必须在 1..={} 之间: {}",
                MAX_PAGE_LIMIT, limit
            )));
        }

        let filter = build_filter(query)?;
        let total = self.repos.job_repo.count_by_filter(&filter)?;
        let items = self
            .repos
            .job_repo
            .find_by_filter(&filter, Some(limit), Some((page - 1) * limit))?;
        Ok(JobPage {
            page,
            limit,
            total,
            items,
        })
    }

    /// 关键字搜索 (回单号/机台/状态/操作人员)
    pub fn search_jobs(&self, keyword: &str) -> ApiResult<Vec<JobRecord>> {
        if keyword.trim().is_empty() {
            return Err(ApiError::ValidationError("搜索关键字不能为空".to_string()));
        }
        Ok(self.repos.job_repo.search(keyword)?)
    }

    /// 回修链全部代次 (按代次升序)
    pub fn list_cycles(&self, base_receiver: &str) -> ApiResult<Vec<JobRecord>> {
        let base = ReceiverId::parse(base_receiver).base;
        let jobs = self.repos.job_repo.find_by_base(&base)?;
        if jobs.is_empty() {
            return Err(ApiError::NotFound(format!("回修链不存在: {}", base)));
        }
        Ok(jobs)
    }

    /// 每条回修链的最新代次
    pub fn latest_per_receiver(&self) -> ApiResult<Vec<JobRecord>> {
        Ok(self.repos.job_repo.latest_per_base()?)
    }

    // ==========================================
    // 修改 / 删除
    // ==========================================

    /// 修改数量、单价、操作人员 (仅 Pending)
    pub fn update_job(
        &self,
        actor: &Actor,
        job_id: &str,
        req: UpdateJobRequest,
        now: NaiveDateTime,
    ) -> ApiResult<JobRecord> {
        require_manager(actor)?;
        let mut job = self.load_job(job_id)?;
        if job.status != JobStatus::Pending {
            return Err(ApiError::Conflict(format!(
                "只有待开工作业可以修改: {} ({})",
                job.receiver_no, job.status
            )));
        }

        let mut changes = Map::new();
        if let Some(qty) = req.qty {
            if !qty.is_finite() || qty <= 0.0 {
                return Err(ApiError::ValidationError(format!("数量必须为正数: {}", qty)));
            }
            if qty != job.qty {
                changes.insert("qty".to_string(), json!({ "before": job.qty, "after": qty }));
                job.qty = qty;
            }
        }
        if let Some(rate) = req.rate {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ApiError::ValidationError(format!("单价不能为负: {}", rate)));
            }
            if rate != job.rate {
                changes.insert("rate".to_string(), json!({ "before": job.rate, "after": rate }));
                job.rate = rate;
            }
        }
        let mut operators_changed = false;
        if let Some(operators) = req.operators {
            let operators = normalize_operators(&operators);
            if operators != job.operators {
                changes.insert(
                    "operators".to_string(),
                    json!({ "before": job.operators, "after": operators }),
                );
                job.operators = operators;
                operators_changed = true;
            }
        }
        if changes.is_empty() {
            return Ok(job);
        }

        let base_before = job.base_cost;
        job.base_cost = cost::base_cost(job.qty, job.rate);
        if job.base_cost != base_before {
            changes.insert(
                "baseCost".to_string(),
                json!({ "before": base_before, "after": job.base_cost }),
            );
        }
        cost::recompute_job_cost(&mut job);
        job.push_history(
            HistoryEntry::new(history_actions::PROCESS_UPDATED, actor.display_name(), now)
                .with_changes(&Value::Object(changes)),
        );
        self.repos.job_repo.save(&job)?;

        if operators_changed {
            self.repos.assignment_repo.delete_for_job(&job.job_id)?;
            self.lifecycle.assign_operators(&job, now)?;
        }

        tracing::info!(job_id = %job.job_id, receiver_no = %job.receiver_no, actor = %actor.id, "作业已修改");
        Ok(job)
    }

    /// 删除无计量记录的待开工作业 (队列压实, 分派清除)
    pub fn delete_job(&self, actor: &Actor, job_id: &str) -> ApiResult<()> {
        require_owner_or_admin(actor)?;
        let job = self.load_job(job_id)?;
        if job.status != JobStatus::Pending {
            return Err(ApiError::Conflict(format!(
                "只有待开工作业可以删除: {} ({})",
                job.receiver_no, job.status
            )));
        }
        // 只看本作业之后建立的计量, 同回单号的历史代次不影响
        if let Some(water) = self.lifecycle.water_for_job(&job)? {
            return Err(ApiError::Conflict(format!(
                "回单号{}已有用水计量记录{}, 不能删除",
                job.receiver_no, water.water_id
            )));
        }

        self.repos.job_repo.delete(&job.job_id)?;
        self.repos.assignment_repo.delete_for_job(&job.job_id)?;
        tracing::info!(
            job_id = %job.job_id,
            receiver_no = %job.receiver_no,
            machine_no = %job.machine_no,
            actor = %actor.id,
            "作业已删除"
        );
        Ok(())
    }

    // ==========================================
    // 助剂 / 染料
    // ==========================================

    pub fn add_chemical(
        &self,
        actor: &Actor,
        job_id: &str,
        req: MaterialRequest,
        now: NaiveDateTime,
    ) -> ApiResult<JobRecord> {
        self.add_material(actor, job_id, MaterialKind::Chemical, req, now)
    }

    pub fn add_dye(&self, actor: &Actor, job_id: &str, req: MaterialRequest, now: NaiveDateTime) -> ApiResult<JobRecord> {
        self.add_material(actor, job_id, MaterialKind::Dye, req, now)
    }

    fn add_material(
        &self,
        actor: &Actor,
        job_id: &str,
        kind: MaterialKind,
        req: MaterialRequest,
        now: NaiveDateTime,
    ) -> ApiResult<JobRecord> {
        require_manager(actor)?;
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::ValidationError("物料名称不能为空".to_string()));
        }
        for (field, value) in [("qty", req.qty), ("cost", req.cost)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ApiError::ValidationError(format!("{}必须为非负数: {}", field, value)));
            }
        }

        let mut job = self.load_job(job_id)?;
        if job.status == JobStatus::Reprocess {
            return Err(ApiError::Conflict(format!(
                "回单号{}已转入回修, 请在新代次上追加",
                job.receiver_no
            )));
        }

        let line = MaterialLine {
            name,
            qty: req.qty,
            cost: req.cost,
            added_at: now,
        };
        let action = match kind {
            MaterialKind::Chemical => {
                job.chemicals.push(line.clone());
                history_actions::CHEMICAL_ADDED
            }
            MaterialKind::Dye => {
                job.dyes.push(line.clone());
                history_actions::DYE_ADDED
            }
        };
        let breakdown = cost::recompute_job_cost(&mut job);
        job.push_history(
            HistoryEntry::new(action, actor.display_name(), now).with_changes(&json!({
                "name": line.name,
                "qty": line.qty,
                "cost": line.cost,
                "totalCost": breakdown.total_cost,
            })),
        );
        self.repos.job_repo.save(&job)?;

        tracing::info!(
            job_id = %job.job_id,
            kind = kind.as_str(),
            cost = line.cost,
            total_cost = job.total_cost,
            "物料已追加"
        );
        Ok(job)
    }

    // ==========================================
    // 回修
    // ==========================================

    /// 按回单号回修 (取链上最新代次)
    pub fn reprocess_by_receiver(
        &self,
        actor: &Actor,
        receiver_no: &str,
        req: ReprocessRequest,
        now: NaiveDateTime,
    ) -> ApiResult<ReprocessOutcome> {
        require_manager(actor)?;
        let options = reprocess_options(req)?;
        Ok(self
            .reprocess_engine
            .reprocess_by_receiver(receiver_no, options, actor.display_name(), now)?)
    }

    /// 按作业主键回修
    pub fn reprocess_by_id(
        &self,
        actor: &Actor,
        job_id: &str,
        req: ReprocessRequest,
        now: NaiveDateTime,
    ) -> ApiResult<ReprocessOutcome> {
        require_manager(actor)?;
        let options = reprocess_options(req)?;
        Ok(self
            .reprocess_engine
            .reprocess_by_id(job_id, options, actor.display_name(), now)?)
    }

    fn load_job(&self, job_id: &str) -> ApiResult<JobRecord> {
        self.repos
            .job_repo
            .find_by_id(job_id)?
            .ok_or_else(|| ApiError::NotFound(format!("作业不存在: {}", job_id)))
    }
}

fn build_filter(query: &JobQuery) -> ApiResult<JobFilter> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            JobStatus::from_str(raw).ok_or_else(|| ApiError::ValidationError(format!("未知的作业状态: {}", raw)))?,
        ),
        None => None,
    };
    let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
    Ok(JobFilter {
        receiver_no: non_empty(&query.receiver_no),
        status,
        machine_no: non_empty(&query.machine_no),
        plan_date: query.date,
    })
}

fn reprocess_options(req: ReprocessRequest) -> ApiResult<ReprocessOptions> {
    if let Some(order_no) = req.order_no {
        if order_no < 1 {
            return Err(ApiError::ValidationError(format!("排队序号必须 >= 1: {}", order_no)));
        }
    }
    Ok(ReprocessOptions {
        plan_date: req.date,
        machine_no: req.machine_no.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
        order_no: req.order_no,
    })
}
