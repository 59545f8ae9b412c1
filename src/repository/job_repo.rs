// ==========================================
// 染整车间生产流程引擎 - 作业数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑, 只做数据映射
// 红线: order_no 只经由排队位方法改写, save() 不触碰
// 约束: 所有查询使用参数化
// ==========================================

use crate::db::{format_date, format_ts, parse_date, parse_json, parse_ts};
use crate::domain::job::{JobRecord, MaterialLine};
use crate::domain::types::{JobStatus, MaterialKind};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::history_repo::{self, HistoryEntity};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const JOB_COLUMNS: &str = r#"job_id, receiver_no, base_receiver, cycle, machine_no, plan_date, order_no,
    qty, rate, base_cost, carried_cost, water_cost, chemical_cost, dye_cost, total_cost,
    running_time_minutes, status, operators_json, created_at, updated_at"#;

/// 作业列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub receiver_no: Option<String>,
    pub status: Option<JobStatus>,
    pub machine_no: Option<String>,
    pub plan_date: Option<NaiveDate>,
}

// ==========================================
// JobRecordRepository - 作业仓储
// ==========================================
pub struct JobRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobRecordRepository {
    /// 创建新的 JobRecordRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 保存作业 (不改 order_no)
    ///
    /// 主表整行覆盖; 助剂/染料/履历只追加新增部分
    pub fn save(&self, job: &JobRecord) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let affected = tx.execute(
            r#"UPDATE job_record SET
                   receiver_no = ?2, base_receiver = ?3, cycle = ?4, machine_no = ?5, plan_date = ?6,
                   qty = ?7, rate = ?8, base_cost = ?9, carried_cost = ?10, water_cost = ?11,
                   chemical_cost = ?12, dye_cost = ?13, total_cost = ?14, running_time_minutes = ?15,
                   status = ?16, operators_json = ?17, updated_at = ?18
               WHERE job_id = ?1"#,
            params![
                job.job_id,
                job.receiver_no,
                job.base_receiver,
                job.cycle,
                job.machine_no,
                format_date(&job.plan_date),
                job.qty,
                job.rate,
                job.base_cost,
                job.carried_cost,
                job.water_cost,
                job.chemical_cost,
                job.dye_cost,
                job.total_cost,
                job.running_time_minutes,
                job.status.as_str(),
                serde_json::to_string(&job.operators)?,
                format_ts(&job.updated_at),
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "JobRecord".to_string(),
                id: job.job_id.clone(),
            });
        }

        append_material_lines(&tx, job)?;
        history_repo::append_new(&tx, HistoryEntity::Job, &job.job_id, &job.history)?;

        tx.commit()?;
        Ok(())
    }

    /// 插入作业并占用排队位 (单事务: 先后移, 再插入)
    ///
    /// # 参数
    /// - `job`: 待插入作业, 其 order_no 字段被忽略
    /// - `slot`: 目标排队序号, 已被占用时 >= slot 的作业整体后移一位
    ///
    /// # 返回
    /// - `Err(UniqueConstraintViolation)`: 并发写入撞位, 由调用方重试
    pub fn insert_with_shift(&self, job: &JobRecord, slot: i32) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        shift_up_from(&tx, &job.machine_no, &job.plan_date, slot)?;
        insert_row(&tx, job, Some(slot))?;
        append_material_lines(&tx, job)?;
        history_repo::append_new(&tx, HistoryEntity::Job, &job.job_id, &job.history)?;

        tx.commit()?;
        tracing::debug!(job_id = %job.job_id, machine_no = %job.machine_no, order_no = slot, "作业入队");
        Ok(())
    }

    /// 释放作业的排队位, 后续作业前移一位
    ///
    /// # 返回
    /// - `Ok(Some(slot))`: 原排队序号
    /// - `Ok(None)`: 作业本就不在排队中
    pub fn release_slot(&self, job_id: &str) -> RepositoryResult<Option<i32>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let slot = release_row_slot(&tx, job_id)?;

        tx.commit()?;
        Ok(slot)
    }

    /// 在同一机台/日期内移动作业排队位 (释放 + 后移 + 占位, 单事务)
    pub fn move_slot(&self, job_id: &str, slot: i32) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let (machine_no, plan_date) = scope_of(&tx, job_id)?;
        release_row_slot(&tx, job_id)?;
        shift_up_from(&tx, &machine_no, &plan_date, slot)?;
        tx.execute(
            "UPDATE job_record SET order_no = ?2 WHERE job_id = ?1",
            params![job_id, slot],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// 删除作业 (排队位先释放并压实)
    pub fn delete(&self, job_id: &str) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        release_row_slot(&tx, job_id)?;
        let affected = tx.execute("DELETE FROM job_record WHERE job_id = ?1", params![job_id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "JobRecord".to_string(),
                id: job_id.to_string(),
            });
        }

        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按主键查询
    pub fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<JobRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM job_record WHERE job_id = ?1", JOB_COLUMNS);
        let job = conn
            .query_row(&sql, params![job_id], map_job_row)
            .optional()?;
        match job {
            Some(job) => Ok(Some(load_details(&conn, job)?)),
            None => Ok(None),
        }
    }

    /// 按回单号查询全部作业 (代次降序)
    pub fn find_by_receiver(&self, receiver_no: &str) -> RepositoryResult<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM job_record WHERE receiver_no = ?1 ORDER BY cycle DESC, created_at DESC",
            JOB_COLUMNS
        );
        self.query_jobs(&sql, vec![Value::from(receiver_no.to_string())])
    }

    /// 查询回修链上的全部代次 (代次升序)
    pub fn find_by_base(&self, base_receiver: &str) -> RepositoryResult<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM job_record WHERE base_receiver = ?1 ORDER BY cycle ASC",
            JOB_COLUMNS
        );
        self.query_jobs(&sql, vec![Value::from(base_receiver.to_string())])
    }

    /// 回修链当前最大代次 (无记录返回 0)
    pub fn max_cycle(&self, base_receiver: &str) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;
        let max: Option<i32> = conn.query_row(
            "SELECT MAX(cycle) FROM job_record WHERE base_receiver = ?1",
            params![base_receiver],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// 机台/日期下当前最大排队序号 (无排队返回 0)
    pub fn max_order_no(&self, machine_no: &str, plan_date: &NaiveDate) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;
        let max: Option<i32> = conn.query_row(
            "SELECT MAX(order_no) FROM job_record WHERE machine_no = ?1 AND plan_date = ?2",
            params![machine_no, format_date(plan_date)],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// 机台/日期下的作业 (排队中的按序号在前, 已离队的按创建时间在后)
    pub fn list_by_machine_date(
        &self,
        machine_no: &str,
        plan_date: &NaiveDate,
    ) -> RepositoryResult<Vec<JobRecord>> {
        let sql = format!(
            r#"SELECT {} FROM job_record
               WHERE machine_no = ?1 AND plan_date = ?2
               ORDER BY order_no IS NULL, order_no, created_at"#,
            JOB_COLUMNS
        );
        self.query_jobs(
            &sql,
            vec![
                Value::from(machine_no.to_string()),
                Value::from(format_date(plan_date)),
            ],
        )
    }

    /// 按主键批量查询
    pub fn find_by_ids(&self, job_ids: &[String]) -> RepositoryResult<Vec<JobRecord>> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=job_ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM job_record WHERE job_id IN ({}) ORDER BY order_no IS NULL, order_no",
            JOB_COLUMNS, placeholders
        );
        self.query_jobs(&sql, job_ids.iter().map(|id| Value::from(id.clone())).collect())
    }

    /// 条件查询 (创建时间倒序, 可分页)
    pub fn find_by_filter(
        &self,
        filter: &JobFilter,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<JobRecord>> {
        let (where_sql, mut values) = build_filter(filter);
        let mut sql = format!(
            "SELECT {} FROM job_record{} ORDER BY created_at DESC, cycle DESC",
            JOB_COLUMNS, where_sql
        );
        let mut idx = values.len() + 1;
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT ?{}", idx));
            values.push(Value::from(limit));
            idx += 1;
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET ?{}", idx));
            values.push(Value::from(offset));
        }
        self.query_jobs(&sql, values)
    }

    /// 条件计数
    pub fn count_by_filter(&self, filter: &JobFilter) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let (where_sql, values) = build_filter(filter);
        let sql = format!("SELECT COUNT(*) FROM job_record{}", where_sql);
        let count = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count)
    }

    /// 模糊搜索 (回单号/机台/状态/操作人员, 大小写不敏感)
    pub fn search(&self, keyword: &str) -> RepositoryResult<Vec<JobRecord>> {
        let pattern = format!("%{}%", keyword.trim().to_lowercase());
        let sql = format!(
            r#"SELECT {} FROM job_record
               WHERE lower(receiver_no) LIKE ?1
                  OR lower(machine_no) LIKE ?1
                  OR lower(status) LIKE ?1
                  OR lower(operators_json) LIKE ?1
               ORDER BY created_at DESC"#,
            JOB_COLUMNS
        );
        self.query_jobs(&sql, vec![Value::from(pattern)])
    }

    /// 每条回修链的最新代次
    pub fn latest_per_base(&self) -> RepositoryResult<Vec<JobRecord>> {
        let sql = format!(
            r#"SELECT {} FROM job_record j
               WHERE cycle = (SELECT MAX(cycle) FROM job_record WHERE base_receiver = j.base_receiver)
               ORDER BY created_at DESC"#,
            JOB_COLUMNS
        );
        self.query_jobs(&sql, Vec::new())
    }

    fn query_jobs(&self, sql: &str, values: Vec<Value>) -> RepositoryResult<Vec<JobRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let jobs = stmt
            .query_map(params_from_iter(values), map_job_row)?
            .collect::<Result<Vec<_>, _>>()?;
        jobs.into_iter()
            .map(|job| load_details(&conn, job))
            .collect()
    }
}

// ==========================================
// 排队位辅助 (事务内调用)
// ==========================================

/// >= slot 的作业整体后移一位
///
/// 先翻到负数区间再翻回, 唯一索引不会看到中间态的重复
fn shift_up_from(conn: &Connection, machine_no: &str, plan_date: &NaiveDate, slot: i32) -> RepositoryResult<()> {
    let date = format_date(plan_date);
    conn.execute(
        r#"UPDATE job_record SET order_no = -(order_no + 1)
           WHERE machine_no = ?1 AND plan_date = ?2 AND order_no >= ?3"#,
        params![machine_no, date, slot],
    )?;
    conn.execute(
        r#"UPDATE job_record SET order_no = -order_no
           WHERE machine_no = ?1 AND plan_date = ?2 AND order_no < 0"#,
        params![machine_no, date],
    )?;
    Ok(())
}

/// > slot 的作业整体前移一位
fn shift_down_after(conn: &Connection, machine_no: &str, plan_date: &str, slot: i32) -> RepositoryResult<()> {
    conn.execute(
        r#"UPDATE job_record SET order_no = -(order_no - 1)
           WHERE machine_no = ?1 AND plan_date = ?2 AND order_no > ?3"#,
        params![machine_no, plan_date, slot],
    )?;
    conn.execute(
        r#"UPDATE job_record SET order_no = -order_no
           WHERE machine_no = ?1 AND plan_date = ?2 AND order_no < 0"#,
        params![machine_no, plan_date],
    )?;
    Ok(())
}

fn release_row_slot(conn: &Connection, job_id: &str) -> RepositoryResult<Option<i32>> {
    let row: Option<(String, String, Option<i32>)> = conn
        .query_row(
            "SELECT machine_no, plan_date, order_no FROM job_record WHERE job_id = ?1",
            params![job_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (machine_no, plan_date, order_no) = row.ok_or_else(|| RepositoryError::NotFound {
        entity: "JobRecord".to_string(),
        id: job_id.to_string(),
    })?;

    let Some(slot) = order_no else {
        return Ok(None);
    };
    conn.execute(
        "UPDATE job_record SET order_no = NULL WHERE job_id = ?1",
        params![job_id],
    )?;
    shift_down_after(conn, &machine_no, &plan_date, slot)?;
    Ok(Some(slot))
}

fn scope_of(conn: &Connection, job_id: &str) -> RepositoryResult<(String, NaiveDate)> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT machine_no, plan_date FROM job_record WHERE job_id = ?1",
            params![job_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (machine_no, plan_date) = row.ok_or_else(|| RepositoryError::NotFound {
        entity: "JobRecord".to_string(),
        id: job_id.to_string(),
    })?;
    Ok((machine_no, parse_date(1, &plan_date)?))
}

fn insert_row(conn: &Connection, job: &JobRecord, order_no: Option<i32>) -> RepositoryResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO job_record ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            JOB_COLUMNS
        ),
        params![
            job.job_id,
            job.receiver_no,
            job.base_receiver,
            job.cycle,
            job.machine_no,
            format_date(&job.plan_date),
            order_no,
            job.qty,
            job.rate,
            job.base_cost,
            job.carried_cost,
            job.water_cost,
            job.chemical_cost,
            job.dye_cost,
            job.total_cost,
            job.running_time_minutes,
            job.status.as_str(),
            serde_json::to_string(&job.operators)?,
            format_ts(&job.created_at),
            format_ts(&job.updated_at),
        ],
    )?;
    Ok(())
}

/// 追加尚未落库的助剂/染料明细
fn append_material_lines(conn: &Connection, job: &JobRecord) -> RepositoryResult<()> {
    for (kind, lines) in [
        (MaterialKind::Chemical, &job.chemicals),
        (MaterialKind::Dye, &job.dyes),
    ] {
        let persisted: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_material_line WHERE job_id = ?1 AND kind = ?2",
            params![job.job_id, kind.as_str()],
            |row| row.get(0),
        )?;
        for line in lines.iter().skip(persisted as usize) {
            conn.execute(
                r#"INSERT INTO job_material_line (job_id, kind, name, qty, cost, added_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    job.job_id,
                    kind.as_str(),
                    line.name,
                    line.qty,
                    line.cost,
                    format_ts(&line.added_at),
                ],
            )?;
        }
    }
    Ok(())
}

fn load_material_lines(conn: &Connection, job_id: &str, kind: MaterialKind) -> RepositoryResult<Vec<MaterialLine>> {
    let mut stmt = conn.prepare_cached(
        r#"SELECT name, qty, cost, added_at FROM job_material_line
           WHERE job_id = ?1 AND kind = ?2 ORDER BY line_id"#,
    )?;
    let lines = stmt
        .query_map(params![job_id, kind.as_str()], |row| {
            let added_at: String = row.get(3)?;
            Ok(MaterialLine {
                name: row.get(0)?,
                qty: row.get(1)?,
                cost: row.get(2)?,
                added_at: parse_ts(3, &added_at)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

fn load_details(conn: &Connection, mut job: JobRecord) -> RepositoryResult<JobRecord> {
    job.chemicals = load_material_lines(conn, &job.job_id, MaterialKind::Chemical)?;
    job.dyes = load_material_lines(conn, &job.job_id, MaterialKind::Dye)?;
    job.history = history_repo::load(conn, HistoryEntity::Job, &job.job_id)?;
    Ok(job)
}

fn build_filter(filter: &JobFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(receiver) = filter.receiver_no.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        values.push(Value::from(receiver.to_string()));
        clauses.push(format!("receiver_no = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(Value::from(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(machine) = filter.machine_no.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        values.push(Value::from(machine.to_string()));
        clauses.push(format!("machine_no = ?{}", values.len()));
    }
    if let Some(date) = filter.plan_date {
        values.push(Value::from(format_date(&date)));
        clauses.push(format!("plan_date = ?{}", values.len()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn map_job_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let plan_date: String = row.get(5)?;
    let status: String = row.get(16)?;
    let operators: String = row.get(17)?;
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;

    Ok(JobRecord {
        job_id: row.get(0)?,
        receiver_no: row.get(1)?,
        base_receiver: row.get(2)?,
        cycle: row.get(3)?,
        machine_no: row.get(4)?,
        plan_date: parse_date(5, &plan_date)?,
        order_no: row.get(6)?,
        qty: row.get(7)?,
        rate: row.get(8)?,
        base_cost: row.get(9)?,
        carried_cost: row.get(10)?,
        water_cost: row.get(11)?,
        chemical_cost: row.get(12)?,
        dye_cost: row.get(13)?,
        total_cost: row.get(14)?,
        running_time_minutes: row.get(15)?,
        status: JobStatus::from_str(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                16,
                rusqlite::types::Type::Text,
                format!("未知作业状态: {}", status).into(),
            )
        })?,
        operators: parse_json(17, &operators)?,
        chemicals: Vec::new(),
        dyes: Vec::new(),
        history: Vec::new(),
        created_at: parse_ts(18, &created_at)?,
        updated_at: parse_ts(19, &updated_at)?,
    })
}
