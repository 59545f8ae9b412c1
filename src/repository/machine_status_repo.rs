// ==========================================
// 染整车间生产流程引擎 - 机台状态看板仓储
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::machine_status::MachineStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct MachineStatusRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineStatusRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn upsert(&self, status: &MachineStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO machine_status (machine_no, last_status, receiver_no, updated_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(machine_no) DO UPDATE SET
                   last_status = excluded.last_status,
                   receiver_no = excluded.receiver_no,
                   updated_at = excluded.updated_at"#,
            params![
                status.machine_no,
                status.last_status,
                status.receiver_no,
                format_ts(&status.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, machine_no: &str) -> RepositoryResult<Option<MachineStatus>> {
        let conn = self.get_conn()?;
        let status = conn
            .query_row(
                "SELECT machine_no, last_status, receiver_no, updated_at FROM machine_status WHERE machine_no = ?1",
                params![machine_no],
                map_status_row,
            )
            .optional()?;
        Ok(status)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<MachineStatus>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT machine_no, last_status, receiver_no, updated_at FROM machine_status ORDER BY machine_no",
        )?;
        let rows = stmt
            .query_map([], map_status_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_status_row(row: &Row<'_>) -> rusqlite::Result<MachineStatus> {
    let updated_at: String = row.get(3)?;
    Ok(MachineStatus {
        machine_no: row.get(0)?,
        last_status: row.get(1)?,
        receiver_no: row.get(2)?,
        updated_at: parse_ts(3, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_upsert_overwrites_last_status() {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = MachineStatusRepository::new(Arc::new(Mutex::new(conn)));
        let ts = NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        for status in ["Running", "Paused"] {
            repo.upsert(&MachineStatus {
                machine_no: "M1".to_string(),
                last_status: status.to_string(),
                receiver_no: Some("1024".to_string()),
                updated_at: ts,
            })
            .unwrap();
        }

        assert_eq!(repo.find("M1").unwrap().unwrap().last_status, "Paused");
        assert_eq!(repo.list_all().unwrap().len(), 1);
        assert!(repo.find("M2").unwrap().is_none());
    }
}
