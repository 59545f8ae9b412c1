// ==========================================
// 染整车间生产流程引擎 - 作业生命周期状态机
// ==========================================
// 状态: Pending → Running → {Paused ⇄ Running} → Stopped / Completed
// 写入顺序: 先落用水计量, 再翻转作业状态
//   (中途失败时作业状态落后于计量, 由 reconcile 在下次读取时补齐)
// 时间: now 由调用方在请求入口取一次, 全程复用
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::WorkflowSettings;
use crate::domain::assignment::OperatorAssignment;
use crate::domain::customer::CustomerDetails;
use crate::domain::history::{history_actions, HistoryEntry};
use crate::domain::job::{JobRecord, ReceiverId};
use crate::domain::machine_status::MachineStatus;
use crate::domain::types::{AssignmentStatus, JobStatus, WaterStatus};
use crate::domain::water::WaterProcess;
use crate::engine::cost;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::queue::MachineQueue;
use crate::engine::repositories::WorkflowRepositories;

// ==========================================
// 输入 / 输出
// ==========================================

/// 新建作业参数
#[derive(Debug, Clone)]
pub struct NewJob {
    pub receiver_no: String,
    pub machine_no: String,
    pub plan_date: NaiveDate,
    pub qty: f64,
    pub rate: f64,
    pub order_no: Option<i32>,
    pub operators: Vec<String>,
}

/// 状态转换结果 (计量会话 + 关联作业)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub water: WaterProcess,
    pub job: Option<JobRecord>,
}

/// 成本核算结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostOutcome {
    pub water: WaterProcess,
    pub job: JobRecord,
    pub total_cost: f64,
}

/// 暂停接口的模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseMode {
    #[default]
    Toggle,
    Pause,
    Resume,
}

impl PauseMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "toggle" => Some(PauseMode::Toggle),
            "pause" => Some(PauseMode::Pause),
            "resume" => Some(PauseMode::Resume),
            _ => None,
        }
    }
}

// ==========================================
// JobLifecycle - 作业生命周期引擎
// ==========================================
pub struct JobLifecycle {
    repos: WorkflowRepositories,
    queue: Arc<MachineQueue>,
    settings: WorkflowSettings,
}

impl JobLifecycle {
    pub fn new(repos: WorkflowRepositories, queue: Arc<MachineQueue>, settings: WorkflowSettings) -> Self {
        Self { repos, queue, settings }
    }

    // ==========================================
    // 建单
    // ==========================================

    /// 新建作业并入队
    ///
    /// # 返回
    /// - `Err(NotFound)`: 客户回单号不存在
    /// - `Err(Conflict)`: 同一回单号已有未完结作业
    pub fn create(&self, new_job: NewJob, actor: &str, now: NaiveDateTime) -> EngineResult<JobRecord> {
        let receiver_no = new_job.receiver_no.trim().to_string();
        let machine_no = new_job.machine_no.trim().to_string();
        if receiver_no.is_empty() {
            return Err(EngineError::ValidationError("回单号不能为空".to_string()));
        }
        if machine_no.is_empty() {
            return Err(EngineError::ValidationError("机台号不能为空".to_string()));
        }
        if !new_job.qty.is_finite() || new_job.qty <= 0.0 {
            return Err(EngineError::ValidationError(format!("数量必须为正数: {}", new_job.qty)));
        }
        if !new_job.rate.is_finite() || new_job.rate < 0.0 {
            return Err(EngineError::ValidationError(format!("单价不能为负: {}", new_job.rate)));
        }

        if self.repos.customer_repo.find_by_receiver(&receiver_no)?.is_none() {
            return Err(EngineError::NotFound(format!("客户回单号不存在: {}", receiver_no)));
        }
        let existing = self.repos.job_repo.find_by_receiver(&receiver_no)?;
        if let Some(active) = existing.iter().find(|j| j.status.is_active()) {
            return Err(EngineError::Conflict(format!(
                "回单号{}已有未完结作业: 机台{} 状态{}",
                receiver_no, active.machine_no, active.status
            )));
        }

        // 回修链: 回单号已有作业时沿用其链, 否则按回单号解析基准号
        let base_receiver = existing
            .first()
            .map(|j| j.base_receiver.clone())
            .unwrap_or_else(|| ReceiverId::parse(&receiver_no).base);
        let cycle = self.repos.job_repo.max_cycle(&base_receiver)? + 1;
        let operators = normalize_operators(&new_job.operators);
        let base_cost = cost::base_cost(new_job.qty, new_job.rate);

        let mut job = JobRecord {
            job_id: Uuid::new_v4().to_string(),
            receiver_no: receiver_no.clone(),
            base_receiver,
            cycle,
            machine_no,
            plan_date: new_job.plan_date,
            order_no: None,
            qty: new_job.qty,
            rate: new_job.rate,
            base_cost,
            carried_cost: None,
            water_cost: 0.0,
            chemical_cost: 0.0,
            dye_cost: 0.0,
            total_cost: base_cost,
            running_time_minutes: 0.0,
            status: JobStatus::Pending,
            operators,
            chemicals: Vec::new(),
            dyes: Vec::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        job.push_history(
            HistoryEntry::new(history_actions::PROCESS_CREATED, actor, now).with_changes(&json!({
                "machineNo": job.machine_no,
                "date": job.plan_date,
                "qty": job.qty,
                "rate": job.rate,
                "baseCost": job.base_cost,
                "requestedOrderNo": new_job.order_no,
                "operators": job.operators,
            })),
        );

        let slot = self.queue.assign(&job, new_job.order_no)?;
        job.order_no = Some(slot);
        self.assign_operators(&job, now)?;

        tracing::info!(
            job_id = %job.job_id,
            receiver_no = %job.receiver_no,
            machine_no = %job.machine_no,
            order_no = slot,
            actor = actor,
            "作业已创建"
        );
        Ok(job)
    }

    // ==========================================
    // 开工
    // ==========================================

    /// 开工: 建立/激活计量会话, 作业转 Running
    ///
    /// 前置: 回单号下恰有一条 Pending 作业, 且为其机台当日队首
    pub fn start(
        &self,
        receiver_no: &str,
        opening_reading: f64,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<TransitionOutcome> {
        let receiver_no = receiver_no.trim();
        validate_reading("openingReading", opening_reading)?;

        let jobs = self.repos.job_repo.find_by_receiver(receiver_no)?;
        let pending: Vec<&JobRecord> = jobs.iter().filter(|j| j.status == JobStatus::Pending).collect();

        let mut job = match pending.as_slice() {
            [job] => (*job).clone(),
            [] => {
                if let Some(marker) = jobs.iter().find(|j| j.status == JobStatus::Reprocess) {
                    let successor = self
                        .repos
                        .job_repo
                        .find_by_base(&marker.base_receiver)?
                        .into_iter()
                        .last()
                        .map(|j| j.receiver_no)
                        .unwrap_or_default();
                    return Err(EngineError::Conflict(format!(
                        "回单号{}已转入回修, 请使用新回单号{}",
                        receiver_no, successor
                    )));
                }
                if let Some(active) = jobs.iter().find(|j| j.status.is_active()) {
                    return Err(EngineError::Conflict(format!(
                        "回单号{}已在机台{}上{}",
                        receiver_no, active.machine_no, active.status
                    )));
                }
                return Err(EngineError::NotFound(format!("回单号{}没有待开工作业", receiver_no)));
            }
            _ => {
                return Err(EngineError::Conflict(format!(
                    "回单号{}存在{}条待开工作业",
                    receiver_no,
                    pending.len()
                )))
            }
        };

        if let Some(head) = self.queue.peek_next(&job.machine_no, &job.plan_date)? {
            if head.job_id != job.job_id {
                return Err(EngineError::Conflict(format!(
                    "未轮到回单号{}: 机台{}当前队首为{} (序号{})",
                    receiver_no,
                    job.machine_no,
                    head.receiver_no,
                    head.order_no.unwrap_or_default()
                )));
            }
        }
        if let Some(open) = self.repos.water_repo.find_open_by_receiver(receiver_no)? {
            return Err(EngineError::Conflict(format!(
                "回单号{}已有未结束的用水计量: {} ({})",
                receiver_no, open.water_id, open.status
            )));
        }

        // 复用本作业之后建立的 Pending 计量行, 否则新建
        let mut water = self
            .repos
            .water_repo
            .find_latest_by_receiver(receiver_no)?
            .filter(|w| w.status == WaterStatus::Pending && w.created_at >= job.created_at)
            .unwrap_or_else(|| WaterProcess::new(Uuid::new_v4().to_string(), receiver_no, now));

        water.opening_reading = Some(opening_reading);
        water.start_time = Some(now);
        water.end_time = None;
        water.status = WaterStatus::Running;
        water.push_history(
            HistoryEntry::new(history_actions::WATER_STARTED, actor, now)
                .with_changes(&json!({ "openingReading": opening_reading })),
        );
        self.repos.water_repo.save(&water)?;

        job.status = JobStatus::Running;
        job.push_history(
            HistoryEntry::new(history_actions::PROCESS_STARTED, actor, now).with_changes(&json!({
                "openingReading": opening_reading,
                "waterId": water.water_id,
            })),
        );
        self.repos.job_repo.save(&job)?;
        self.touch_machine(&job, now)?;

        tracing::info!(
            job_id = %job.job_id,
            water_id = %water.water_id,
            receiver_no = receiver_no,
            machine_no = %job.machine_no,
            actor = actor,
            "作业已开工"
        );
        Ok(TransitionOutcome { water, job: Some(job) })
    }

    // ==========================================
    // 暂停 / 恢复
    // ==========================================

    /// 暂停: 折算运行时长, 清空 start_time
    pub fn pause(
        &self,
        water_id: &str,
        remarks: Option<String>,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<TransitionOutcome> {
        let mut water = self.load_water(water_id)?;
        if water.status != WaterStatus::Running {
            return Err(EngineError::invalid_transition(water.status, WaterStatus::Paused));
        }

        let elapsed = self.fold_open_interval(&mut water, actor, now);
        water.status = WaterStatus::Paused;
        let remarks = remarks.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if remarks.is_some() {
            water.remarks = remarks.clone();
        }
        water.push_history(
            HistoryEntry::new(history_actions::WATER_PAUSED, actor, now).with_changes(&json!({
                "elapsedMinutes": elapsed,
                "runningTimeMinutes": water.running_time_minutes,
                "remarks": remarks,
            })),
        );
        self.repos.water_repo.save(&water)?;

        let job = self.follow_water(&water, JobStatus::Paused, history_actions::PROCESS_PAUSED, actor, now)?;
        tracing::info!(water_id = %water.water_id, running_time = water.running_time_minutes, actor = actor, "计量已暂停");
        Ok(TransitionOutcome { water, job })
    }

    /// 恢复: 重置 start_time, 不改动已累计时长
    pub fn resume(&self, water_id: &str, actor: &str, now: NaiveDateTime) -> EngineResult<TransitionOutcome> {
        let mut water = self.load_water(water_id)?;
        if water.status != WaterStatus::Paused {
            return Err(EngineError::invalid_transition(water.status, WaterStatus::Running));
        }

        water.start_time = Some(now);
        water.status = WaterStatus::Running;
        water.push_history(
            HistoryEntry::new(history_actions::WATER_RESUMED, actor, now)
                .with_changes(&json!({ "runningTimeMinutes": water.running_time_minutes })),
        );
        self.repos.water_repo.save(&water)?;

        let job = self.follow_water(&water, JobStatus::Running, history_actions::PROCESS_RESUMED, actor, now)?;
        tracing::info!(water_id = %water.water_id, actor = actor, "计量已恢复");
        Ok(TransitionOutcome { water, job })
    }

    /// 按模式暂停/恢复 (toggle 按当前状态翻转)
    pub fn pause_or_resume(
        &self,
        water_id: &str,
        mode: PauseMode,
        remarks: Option<String>,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<TransitionOutcome> {
        match mode {
            PauseMode::Pause => self.pause(water_id, remarks, actor, now),
            PauseMode::Resume => self.resume(water_id, actor, now),
            PauseMode::Toggle => {
                let water = self.load_water(water_id)?;
                match water.status {
                    WaterStatus::Running => self.pause(water_id, remarks, actor, now),
                    WaterStatus::Paused => self.resume(water_id, actor, now),
                    other => Err(EngineError::invalid_transition(other, "Paused/Running")),
                }
            }
        }
    }

    // ==========================================
    // 停机
    // ==========================================

    /// 停机: 最后一次折算, 作业离队
    pub fn stop(
        &self,
        water_id: &str,
        closing_reading: Option<f64>,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<TransitionOutcome> {
        if let Some(closing) = closing_reading {
            validate_reading("closingReading", closing)?;
        }
        let mut water = self.load_water(water_id)?;
        self.close_water_session(&mut water, closing_reading, actor, now)?;

        let mut job = self.job_for_water(&water)?;
        if let Some(job) = job.as_mut().filter(|j| j.status.is_active()) {
            job.status = JobStatus::Stopped;
            job.running_time_minutes = water.running_time_minutes;
            job.push_history(
                HistoryEntry::new(history_actions::PROCESS_STOPPED, actor, now).with_changes(&json!({
                    "waterId": water.water_id,
                    "closingReading": water.closing_reading,
                    "runningTimeMinutes": water.running_time_minutes,
                })),
            );
            self.repos.job_repo.save(job)?;
            self.queue.remove(job)?;
            self.repos
                .assignment_repo
                .set_status_for_job(&job.job_id, AssignmentStatus::Stopped)?;
            self.touch_machine(job, now)?;
        }

        tracing::info!(water_id = %water.water_id, running_time = water.running_time_minutes, actor = actor, "计量已停止");
        Ok(TransitionOutcome { water, job })
    }

    /// 结束计量会话 (只写计量, 不动作业)
    pub(crate) fn close_water_session(
        &self,
        water: &mut WaterProcess,
        closing_reading: Option<f64>,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<()> {
        if !water.status.is_open() {
            return Err(EngineError::invalid_transition(water.status, WaterStatus::Stopped));
        }

        let elapsed = self.fold_open_interval(water, actor, now);
        water.status = WaterStatus::Stopped;
        water.end_time = Some(now);
        if closing_reading.is_some() {
            water.closing_reading = closing_reading;
        }
        water.push_history(
            HistoryEntry::new(history_actions::WATER_STOPPED, actor, now).with_changes(&json!({
                "elapsedMinutes": elapsed,
                "closingReading": water.closing_reading,
                "runningTimeMinutes": water.running_time_minutes,
            })),
        );
        self.repos.water_repo.save(water)?;
        Ok(())
    }

    // ==========================================
    // 成本核算 / 完工
    // ==========================================

    /// 核算用水成本并完工
    ///
    /// # 返回
    /// - `Err(ValidationError)`: 缺少开始或结束读数
    /// - `Err(NotFound)`: 计量会话、作业或客户不存在
    /// - `Err(Conflict)`: 已完工, 或尚未开工
    pub fn calculate_cost(
        &self,
        water_id: &str,
        closing_reading: Option<f64>,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<CostOutcome> {
        if let Some(closing) = closing_reading {
            validate_reading("closingReading", closing)?;
        }
        let mut water = self.load_water(water_id)?;
        match water.status {
            WaterStatus::Completed => {
                return Err(EngineError::Conflict(format!("计量会话{}已完成成本核算", water_id)))
            }
            WaterStatus::Pending => {
                return Err(EngineError::Conflict(format!("计量会话{}尚未开始", water_id)))
            }
            WaterStatus::Running | WaterStatus::Paused | WaterStatus::Stopped => {}
        }

        let mut job = self
            .job_for_water(&water)?
            .ok_or_else(|| EngineError::NotFound(format!("回单号{}对应的作业不存在", water.receiver_no)))?;
        if job.status == JobStatus::Reprocess {
            return Err(EngineError::Conflict(format!(
                "回单号{}已转入回修, 成本已结转",
                job.receiver_no
            )));
        }

        let opening = water
            .opening_reading
            .ok_or_else(|| EngineError::ValidationError("缺少开始读数".to_string()))?;
        let closing = closing_reading
            .or(water.closing_reading)
            .ok_or_else(|| EngineError::ValidationError("缺少结束读数".to_string()))?;
        let customer = self.customer_for(&water, &job)?;

        self.fold_open_interval(&mut water, actor, now);
        let outcome = cost::water_cost(opening, closing, customer.weight, self.settings.water_cost_factor);

        water.closing_reading = Some(closing);
        water.end_time = water.end_time.or(Some(now));
        water.status = WaterStatus::Completed;
        water.total_water_cost = outcome.cost;
        water.push_history(
            HistoryEntry::new(history_actions::WATER_COST_CALCULATED, actor, now).with_changes(&json!({
                "openingReading": opening,
                "closingReading": closing,
                "weight": customer.weight,
                "factor": self.settings.water_cost_factor,
                "waterCost": outcome.cost,
            })),
        );
        if let Some(reason) = &outcome.anomaly {
            tracing::warn!(water_id = %water.water_id, receiver_no = %water.receiver_no, reason = %reason, "用水成本异常, 已钳为 0");
            water.push_history(
                HistoryEntry::new(history_actions::COST_ANOMALY, actor, now)
                    .with_changes(&json!({ "reason": reason })),
            );
        }
        self.repos.water_repo.save(&water)?;

        job.water_cost = outcome.cost;
        job.running_time_minutes = water.running_time_minutes;
        job.status = JobStatus::Completed;
        let breakdown = cost::recompute_job_cost(&mut job);
        job.push_history(
            HistoryEntry::new(history_actions::PROCESS_COMPLETED, actor, now).with_changes(&json!({
                "waterId": water.water_id,
                "waterCost": breakdown.water_cost,
                "totalCost": breakdown.total_cost,
                "runningTimeMinutes": job.running_time_minutes,
            })),
        );
        if let Some(reason) = &outcome.anomaly {
            job.push_history(
                HistoryEntry::new(history_actions::COST_ANOMALY, actor, now)
                    .with_changes(&json!({ "reason": reason, "waterId": water.water_id })),
            );
        }
        self.repos.job_repo.save(&job)?;
        if job.order_no.is_some() {
            self.queue.remove(&mut job)?;
        }
        self.repos
            .assignment_repo
            .set_status_for_job(&job.job_id, AssignmentStatus::Completed)?;
        self.touch_machine(&job, now)?;

        tracing::info!(
            job_id = %job.job_id,
            water_id = %water.water_id,
            water_cost = breakdown.water_cost,
            total_cost = breakdown.total_cost,
            actor = actor,
            "成本核算完成"
        );
        Ok(CostOutcome {
            total_cost: job.total_cost,
            water,
            job,
        })
    }

    // ==========================================
    // 自愈同步
    // ==========================================

    /// 按计量状态重新推导作业状态
    ///
    /// 只向前补齐: 已终止的作业不会被拉回排队态
    pub fn reconcile(&self, mut job: JobRecord, now: NaiveDateTime) -> EngineResult<JobRecord> {
        if job.status == JobStatus::Reprocess {
            return Ok(job);
        }
        let Some(water) = self.water_for_job(&job)? else {
            return Ok(job);
        };
        let Some(implied) = water.status.implied_job_status() else {
            return Ok(job);
        };
        if implied == job.status {
            return Ok(job);
        }
        if !job.status.is_active() && implied.is_active() {
            tracing::warn!(
                job_id = %job.job_id,
                job_status = %job.status,
                water_status = %water.status,
                "作业已终止但计量仍未结束, 不回退作业状态"
            );
            return Ok(job);
        }

        let from = job.status;
        job.status = implied;
        job.running_time_minutes = water.running_time_minutes;
        if implied == JobStatus::Completed {
            job.water_cost = water.total_water_cost;
            cost::recompute_job_cost(&mut job);
        }
        job.push_history(
            HistoryEntry::new(history_actions::STATUS_RESYNCED, &self.settings.default_actor, now).with_changes(
                &json!({
                    "from": from,
                    "to": implied,
                    "waterId": water.water_id,
                    "waterStatus": water.status,
                }),
            ),
        );
        self.repos.job_repo.save(&job)?;

        if !implied.holds_queue_slot() && job.order_no.is_some() {
            self.queue.remove(&mut job)?;
        }
        match implied {
            JobStatus::Stopped => {
                self.repos
                    .assignment_repo
                    .set_status_for_job(&job.job_id, AssignmentStatus::Stopped)?;
            }
            JobStatus::Completed => {
                self.repos
                    .assignment_repo
                    .set_status_for_job(&job.job_id, AssignmentStatus::Completed)?;
            }
            _ => {}
        }
        self.touch_machine(&job, now)?;

        tracing::warn!(
            job_id = %job.job_id,
            water_id = %water.water_id,
            from = %from,
            to = %implied,
            "作业状态已按计量会话重新同步"
        );
        Ok(job)
    }

    /// 批量自愈未完结作业, 返回被重新同步的条数
    pub fn reconcile_active(&self, jobs: &[JobRecord], now: NaiveDateTime) -> EngineResult<usize> {
        let mut healed = 0;
        for job in jobs.iter().filter(|j| j.status.is_active()) {
            if self.reconcile(job.clone(), now)?.status != job.status {
                healed += 1;
            }
        }
        Ok(healed)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn load_water(&self, water_id: &str) -> EngineResult<WaterProcess> {
        self.repos
            .water_repo
            .find_by_id(water_id)?
            .ok_or_else(|| EngineError::NotFound(format!("计量会话不存在: {}", water_id)))
    }

    /// 折算当前运行区间, 返回本次折算分钟数
    fn fold_open_interval(&self, water: &mut WaterProcess, actor: &str, now: NaiveDateTime) -> f64 {
        let Some(start) = water.start_time.take() else {
            return 0.0;
        };
        let fold = cost::elapsed_minutes(start, now);
        if fold.clock_anomaly {
            tracing::warn!(water_id = %water.water_id, start = %start, now = %now, "运行区间为负, 按 0 折算");
            water.push_history(
                HistoryEntry::new(history_actions::CLOCK_ANOMALY, actor, now)
                    .with_changes(&json!({ "startTime": start, "now": now })),
            );
        }
        water.running_time_minutes = cost::round2(water.running_time_minutes + fold.minutes);
        fold.minutes
    }

    /// 计量会话对应的作业: 同回单号, 建于会话之前的最新一代
    pub(crate) fn job_for_water(&self, water: &WaterProcess) -> EngineResult<Option<JobRecord>> {
        Ok(self
            .repos
            .job_repo
            .find_by_receiver(&water.receiver_no)?
            .into_iter()
            .filter(|j| j.created_at <= water.created_at)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.cycle.cmp(&b.cycle))))
    }

    /// 作业对应的计量会话: 同回单号, 建于作业之后的最早一条
    pub(crate) fn water_for_job(&self, job: &JobRecord) -> EngineResult<Option<WaterProcess>> {
        Ok(self
            .repos
            .water_repo
            .find_by_receiver(&job.receiver_no)?
            .into_iter()
            .filter(|w| w.created_at >= job.created_at)
            .min_by(|a, b| a.created_at.cmp(&b.created_at)))
    }

    /// 作业状态跟随计量 (暂停/恢复)
    fn follow_water(
        &self,
        water: &WaterProcess,
        status: JobStatus,
        action: &str,
        actor: &str,
        now: NaiveDateTime,
    ) -> EngineResult<Option<JobRecord>> {
        let mut job = self.job_for_water(water)?;
        if let Some(job) = job.as_mut().filter(|j| j.status.is_active()) {
            job.status = status;
            job.running_time_minutes = water.running_time_minutes;
            job.push_history(HistoryEntry::new(action, actor, now).with_changes(&json!({
                "waterId": water.water_id,
                "runningTimeMinutes": water.running_time_minutes,
            })));
            self.repos.job_repo.save(job)?;
            self.touch_machine(job, now)?;
        }
        Ok(job)
    }

    /// 客户来料: 先按计量回单号, 再按回修链最新回单号
    fn customer_for(&self, water: &WaterProcess, job: &JobRecord) -> EngineResult<CustomerDetails> {
        if let Some(customer) = self.repos.customer_repo.find_by_receiver(&water.receiver_no)? {
            return Ok(customer);
        }
        if let Some(latest) = self.repos.job_repo.find_by_base(&job.base_receiver)?.into_iter().last() {
            if let Some(customer) = self.repos.customer_repo.find_by_receiver(&latest.receiver_no)? {
                return Ok(customer);
            }
        }
        Err(EngineError::NotFound(format!("回单号{}的客户来料信息不存在", water.receiver_no)))
    }

    /// 为作业的操作人员写入 Pending 分派
    pub(crate) fn assign_operators(&self, job: &JobRecord, now: NaiveDateTime) -> EngineResult<()> {
        for operator in &job.operators {
            self.repos.assignment_repo.upsert(&OperatorAssignment {
                operator: operator.clone(),
                job_id: job.job_id.clone(),
                receiver_no: job.receiver_no.clone(),
                status: AssignmentStatus::Pending,
                assigned_at: now,
            })?;
        }
        Ok(())
    }

    /// 更新机台看板
    pub(crate) fn touch_machine(&self, job: &JobRecord, now: NaiveDateTime) -> EngineResult<()> {
        self.repos.machine_status_repo.upsert(&MachineStatus {
            machine_no: job.machine_no.clone(),
            last_status: job.status.as_str().to_string(),
            receiver_no: Some(job.receiver_no.clone()),
            updated_at: now,
        })?;
        Ok(())
    }
}

/// 去空白、去重 (大小写不敏感, 保留首次出现的写法)
pub(crate) fn normalize_operators(raw: &[String]) -> Vec<String> {
    let mut operators: Vec<String> = Vec::new();
    for name in raw.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !operators.iter().any(|o| o.eq_ignore_ascii_case(name)) {
            operators.push(name.to_string());
        }
    }
    operators
}

fn validate_reading(field: &str, value: f64) -> EngineResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::ValidationError(format!("{}必须为非负数: {}", field, value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::CustomerDetails;
    use chrono::Duration;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn setup() -> (WorkflowRepositories, JobLifecycle) {
        let conn: Connection = crate::db::open_in_memory().unwrap();
        let repos = WorkflowRepositories::from_connection(Arc::new(Mutex::new(conn)));
        let queue = Arc::new(MachineQueue::new(repos.job_repo.clone(), 3));
        let lifecycle = JobLifecycle::new(repos.clone(), queue, WorkflowSettings::default());
        (repos, lifecycle)
    }

    fn seed_customer(repos: &WorkflowRepositories, receiver: &str, weight: Option<f64>) {
        repos
            .customer_repo
            .insert(&CustomerDetails {
                customer_id: format!("C-{}", receiver),
                company_name: "Sri Textiles".to_string(),
                customer_name: None,
                receiver_no: receiver.to_string(),
                party_dc_no: None,
                color: None,
                weight,
                date: None,
            })
            .unwrap();
    }

    fn new_job(receiver: &str, order_no: Option<i32>) -> NewJob {
        NewJob {
            receiver_no: receiver.to_string(),
            machine_no: "M1".to_string(),
            plan_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            qty: 100.0,
            rate: 5.0,
            order_no,
            operators: vec!["Ravi".to_string()],
        }
    }

    #[test]
    fn test_reference_scenario_total_cost() {
        let (repos, lifecycle) = setup();
        seed_customer(&repos, "R1", Some(25.0));
        let job = lifecycle.create(new_job("R1", Some(1)), "admin", t0()).unwrap();
        assert_eq!(job.base_cost, 500.0);
        assert_eq!(job.order_no, Some(1));

        let started = lifecycle.start("R1", 1000.0, "ravi", t0()).unwrap();
        let water_id = started.water.water_id.clone();

        let paused = lifecycle
            .pause(&water_id, Some("lunch".to_string()), "ravi", t0() + Duration::minutes(30))
            .unwrap();
        assert_eq!(paused.water.running_time_minutes, 30.0);
        assert_eq!(paused.job.as_ref().unwrap().status, JobStatus::Paused);

        lifecycle.resume(&water_id, "ravi", t0() + Duration::minutes(40)).unwrap();
        let stopped = lifecycle
            .stop(&water_id, Some(1050.0), "ravi", t0() + Duration::minutes(60))
            .unwrap();
        assert_eq!(stopped.water.running_time_minutes, 50.0);
        assert_eq!(stopped.job.as_ref().unwrap().order_no, None);

        let costed = lifecycle
            .calculate_cost(&water_id, None, "admin", t0() + Duration::minutes(65))
            .unwrap();
        assert_eq!(costed.water.total_water_cost, 0.8);
        assert_eq!(costed.job.water_cost, 0.8);
        assert_eq!(costed.total_cost, 500.8);
        assert_eq!(costed.job.status, JobStatus::Completed);
        assert_eq!(costed.job.running_time_minutes, 50.0);
    }

    #[test]
    fn test_pause_twice_fails_cleanly() {
        let (repos, lifecycle) = setup();
        seed_customer(&repos, "R1", Some(25.0));
        lifecycle.create(new_job("R1", None), "admin", t0()).unwrap();
        let water_id = lifecycle.start("R1", 1000.0, "ravi", t0()).unwrap().water.water_id;

        lifecycle.pause(&water_id, None, "ravi", t0() + Duration::minutes(10)).unwrap();
        let err = lifecycle
            .pause(&water_id, None, "ravi", t0() + Duration::minutes(20))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidStateTransition { .. }));

        // 重复暂停不会重复累计时长
        let water = repos.water_repo.find_by_id(&water_id).unwrap().unwrap();
        assert_eq!(water.running_time_minutes, 10.0);
    }

    #[test]
    fn test_start_enforces_fifo() {
        let (repos, lifecycle) = setup();
        seed_customer(&repos, "R1", Some(25.0));
        seed_customer(&repos, "R2", Some(25.0));
        lifecycle.create(new_job("R1", None), "admin", t0()).unwrap();
        lifecycle.create(new_job("R2", None), "admin", t0()).unwrap();

        let err = lifecycle.start("R2", 10.0, "ravi", t0()).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert!(lifecycle.start("R1", 10.0, "ravi", t0()).is_ok());
        // R1 运行中不再是 Pending, R2 成为队首
        assert!(lifecycle.start("R2", 10.0, "ravi", t0()).is_ok());
    }

    #[test]
    fn test_create_rejects_unknown_and_active_receiver() {
        let (repos, lifecycle) = setup();
        let err = lifecycle.create(new_job("R9", None), "admin", t0()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        seed_customer(&repos, "R1", Some(25.0));
        lifecycle.create(new_job("R1", None), "admin", t0()).unwrap();
        let err = lifecycle.create(new_job("R1", None), "admin", t0()).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn test_missing_weight_clamps_and_records_anomaly() {
        let (repos, lifecycle) = setup();
        seed_customer(&repos, "R1", None);
        lifecycle.create(new_job("R1", None), "admin", t0()).unwrap();
        let water_id = lifecycle.start("R1", 1000.0, "ravi", t0()).unwrap().water.water_id;

        let costed = lifecycle
            .calculate_cost(&water_id, Some(1100.0), "admin", t0() + Duration::minutes(5))
            .unwrap();
        assert_eq!(costed.water.total_water_cost, 0.0);
        assert_eq!(costed.total_cost, 500.0);
        assert!(costed
            .job
            .history
            .iter()
            .any(|h| h.action == history_actions::COST_ANOMALY));
        assert!(costed
            .water
            .history
            .iter()
            .any(|h| h.action == history_actions::COST_ANOMALY));
    }

    #[test]
    fn test_calculate_cost_requires_closing_reading() {
        let (repos, lifecycle) = setup();
        seed_customer(&repos, "R1", Some(25.0));
        lifecycle.create(new_job("R1", None), "admin", t0()).unwrap();
        let water_id = lifecycle.start("R1", 1000.0, "ravi", t0()).unwrap().water.water_id;

        let err = lifecycle.calculate_cost(&water_id, None, "admin", t0()).unwrap_err();
        assert!(matches!(err, EngineError::ValidationError(_)));
    }

    #[test]
    fn test_clock_anomaly_clamps_elapsed() {
        let (repos, lifecycle) = setup();
        seed_customer(&repos, "R1", Some(25.0));
        lifecycle.create(new_job("R1", None), "admin", t0()).unwrap();
        let water_id = lifecycle.start("R1", 1000.0, "ravi", t0()).unwrap().water.water_id;

        let paused = lifecycle
            .pause(&water_id, None, "ravi", t0() - Duration::minutes(3))
            .unwrap();
        assert_eq!(paused.water.running_time_minutes, 0.0);
        assert!(paused
            .water
            .history
            .iter()
            .any(|h| h.action == history_actions::CLOCK_ANOMALY));
    }

    #[test]
    fn test_normalize_operators() {
        let raw = vec![" Ravi ".to_string(), "ravi".to_string(), "".to_string(), "Kumar".to_string()];
        assert_eq!(normalize_operators(&raw), vec!["Ravi".to_string(), "Kumar".to_string()]);
    }
}
