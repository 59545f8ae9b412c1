// ==========================================
// 染整车间生产流程引擎 - 操作人员分派仓储
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::assignment::OperatorAssignment;
use crate::domain::types::AssignmentStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

pub struct AssignmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssignmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入分派 (同一人员同一作业只保留一条)
    pub fn upsert(&self, assignment: &OperatorAssignment) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO operator_assignment (operator, job_id, receiver_no, status, assigned_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(operator, job_id) DO UPDATE SET
                   receiver_no = excluded.receiver_no,
                   status = excluded.status"#,
            params![
                assignment.operator,
                assignment.job_id,
                assignment.receiver_no,
                assignment.status.as_str(),
                format_ts(&assignment.assigned_at),
            ],
        )?;
        Ok(())
    }

    /// 批量改写某作业全部分派的状态
    pub fn set_status_for_job(&self, job_id: &str, status: AssignmentStatus) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE operator_assignment SET status = ?2 WHERE job_id = ?1",
            params![job_id, status.as_str()],
        )?;
        Ok(affected)
    }

    /// 按操作人员查询 (大小写不敏感)
    pub fn find_by_operator(&self, operator: &str) -> RepositoryResult<Vec<OperatorAssignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT operator, job_id, receiver_no, status, assigned_at
               FROM operator_assignment
               WHERE lower(operator) = lower(?1)
               ORDER BY assigned_at"#,
        )?;
        let rows = stmt
            .query_map(params![operator.trim()], map_assignment_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find_by_job(&self, job_id: &str) -> RepositoryResult<Vec<OperatorAssignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT operator, job_id, receiver_no, status, assigned_at
               FROM operator_assignment WHERE job_id = ?1 ORDER BY operator"#,
        )?;
        let rows = stmt
            .query_map(params![job_id], map_assignment_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_for_job(&self, job_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM operator_assignment WHERE job_id = ?1",
            params![job_id],
        )?;
        Ok(affected)
    }
}

fn map_assignment_row(row: &Row<'_>) -> rusqlite::Result<OperatorAssignment> {
    let status: String = row.get(3)?;
    let assigned_at: String = row.get(4)?;
    Ok(OperatorAssignment {
        operator: row.get(0)?,
        job_id: row.get(1)?,
        receiver_no: row.get(2)?,
        status: AssignmentStatus::from_str(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("未知分派状态: {}", status).into(),
            )
        })?,
        assigned_at: parse_ts(4, &assigned_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_upsert_and_status_change() {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = AssignmentRepository::new(Arc::new(Mutex::new(conn)));
        let assigned_at = NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let assignment = OperatorAssignment {
            operator: "Ravi".to_string(),
            job_id: "J1".to_string(),
            receiver_no: "1024".to_string(),
            status: AssignmentStatus::Pending,
            assigned_at,
        };
        repo.upsert(&assignment).unwrap();
        repo.upsert(&assignment).unwrap();

        assert_eq!(repo.find_by_operator("ravi").unwrap().len(), 1);
        assert_eq!(repo.set_status_for_job("J1", AssignmentStatus::Reprocess).unwrap(), 1);
        assert_eq!(
            repo.find_by_job("J1").unwrap()[0].status,
            AssignmentStatus::Reprocess
        );
        assert_eq!(repo.delete_for_job("J1").unwrap(), 1);
        assert!(repo.find_by_operator("Ravi").unwrap().is_empty());
    }
}
