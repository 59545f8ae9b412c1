// ==========================================
// 染整车间生产流程引擎 - 用水计量数据仓储
// ==========================================
// 对齐: water_process 表 + process_history(entity_kind='water')
// 关联: receiver_no 为反范式关联键, 不设外键
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::types::WaterStatus;
use crate::domain::water::WaterProcess;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::history_repo::{self, HistoryEntity};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const WATER_COLUMNS: &str = r#"water_id, receiver_no, opening_reading, closing_reading, running_time_minutes,
    start_time, end_time, status, total_water_cost, remarks, created_at, updated_at"#;

// ==========================================
// WaterProcessRepository - 用水计量仓储
// ==========================================
pub struct WaterProcessRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WaterProcessRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 保存计量会话 (不存在则插入, 存在则整行覆盖; 履历只追加)
    pub fn save(&self, water: &WaterProcess) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                r#"INSERT INTO water_process ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                   ON CONFLICT(water_id) DO UPDATE SET
                       receiver_no = excluded.receiver_no,
                       opening_reading = excluded.opening_reading,
                       closing_reading = excluded.closing_reading,
                       running_time_minutes = excluded.running_time_minutes,
                       start_time = excluded.start_time,
                       end_time = excluded.end_time,
                       status = excluded.status,
                       total_water_cost = excluded.total_water_cost,
                       remarks = excluded.remarks,
                       updated_at = excluded.updated_at"#,
                WATER_COLUMNS
            ),
            params![
                water.water_id,
                water.receiver_no,
                water.opening_reading,
                water.closing_reading,
                water.running_time_minutes,
                water.start_time.as_ref().map(format_ts),
                water.end_time.as_ref().map(format_ts),
                water.status.as_str(),
                water.total_water_cost,
                water.remarks,
                format_ts(&water.created_at),
                format_ts(&water.updated_at),
            ],
        )?;
        history_repo::append_new(&tx, HistoryEntity::Water, &water.water_id, &water.history)?;

        tx.commit()?;
        Ok(())
    }

    /// 按主键查询
    pub fn find_by_id(&self, water_id: &str) -> RepositoryResult<Option<WaterProcess>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM water_process WHERE water_id = ?1", WATER_COLUMNS);
        let water = conn
            .query_row(&sql, params![water_id], map_water_row)
            .optional()?;
        match water {
            Some(mut water) => {
                water.history = history_repo::load(&conn, HistoryEntity::Water, &water.water_id)?;
                Ok(Some(water))
            }
            None => Ok(None),
        }
    }

    /// 按回单号查询全部计量会话 (新建在前)
    pub fn find_by_receiver(&self, receiver_no: &str) -> RepositoryResult<Vec<WaterProcess>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM water_process WHERE receiver_no = ?1 ORDER BY created_at DESC, rowid DESC",
            WATER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![receiver_no], map_water_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|mut water| {
                water.history = history_repo::load(&conn, HistoryEntity::Water, &water.water_id)?;
                Ok(water)
            })
            .collect()
    }

    /// 回单号下最近一次计量会话
    pub fn find_latest_by_receiver(&self, receiver_no: &str) -> RepositoryResult<Option<WaterProcess>> {
        Ok(self.find_by_receiver(receiver_no)?.into_iter().next())
    }

    /// 回单号下未结束 (Running / Paused) 的计量会话
    pub fn find_open_by_receiver(&self, receiver_no: &str) -> RepositoryResult<Option<WaterProcess>> {
        Ok(self
            .find_by_receiver(receiver_no)?
            .into_iter()
            .find(|w| w.status.is_open()))
    }
}

fn map_water_row(row: &Row<'_>) -> rusqlite::Result<WaterProcess> {
    let start_time: Option<String> = row.get(5)?;
    let end_time: Option<String> = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(WaterProcess {
        water_id: row.get(0)?,
        receiver_no: row.get(1)?,
        opening_reading: row.get(2)?,
        closing_reading: row.get(3)?,
        running_time_minutes: row.get(4)?,
        start_time: start_time.map(|s| parse_ts(5, &s)).transpose()?,
        end_time: end_time.map(|s| parse_ts(6, &s)).transpose()?,
        status: WaterStatus::from_str(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                format!("未知计量状态: {}", status).into(),
            )
        })?,
        total_water_cost: row.get(8)?,
        remarks: row.get(9)?,
        history: Vec::new(),
        created_at: parse_ts(10, &created_at)?,
        updated_at: parse_ts(11, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::{history_actions, HistoryEntry};
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn setup() -> WaterProcessRepository {
        let conn = crate::db::open_in_memory().unwrap();
        WaterProcessRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_save_upserts_and_keeps_history() {
        let repo = setup();
        let mut water = WaterProcess::new("W1".to_string(), "R1", now());
        water.status = WaterStatus::Running;
        water.opening_reading = Some(1000.0);
        water.start_time = Some(now());
        water.push_history(HistoryEntry::new(history_actions::WATER_STARTED, "ravi", now()));
        repo.save(&water).unwrap();

        water.status = WaterStatus::Paused;
        water.start_time = None;
        water.running_time_minutes = 30.0;
        water.push_history(HistoryEntry::new(
            history_actions::WATER_PAUSED,
            "ravi",
            now() + Duration::minutes(30),
        ));
        repo.save(&water).unwrap();

        let loaded = repo.find_by_id("W1").unwrap().unwrap();
        assert_eq!(loaded, water);
        assert!(repo.find_open_by_receiver("R1").unwrap().is_some());
    }

    #[test]
    fn test_open_lookup_ignores_closed_sessions() {
        let repo = setup();
        let mut water = WaterProcess::new("W1".to_string(), "R1", now());
        water.status = WaterStatus::Completed;
        repo.save(&water).unwrap();

        assert!(repo.find_open_by_receiver("R1").unwrap().is_none());
        assert_eq!(repo.find_latest_by_receiver("R1").unwrap().unwrap().water_id, "W1");
    }
}
