// ==========================================
// 染整车间生产流程引擎 - 履历数据仓储
// ==========================================
// 红线: 只追加, 没有 UPDATE / DELETE 语句
// 对齐: process_history 表
// ==========================================

use crate::db::{format_ts, parse_json, parse_ts};
use crate::domain::history::HistoryEntry;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// 履历所属聚合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEntity {
    Job,
    Water,
}

impl HistoryEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryEntity::Job => "job",
            HistoryEntity::Water => "water",
        }
    }
}

/// 追加尚未落库的履历条目
///
/// 已落库条数以库内计数为准, entries[persisted..] 视为新增
pub(crate) fn append_new(
    conn: &Connection,
    entity: HistoryEntity,
    entity_id: &str,
    entries: &[HistoryEntry],
) -> RepositoryResult<usize> {
    let persisted: i64 = conn.query_row(
        "SELECT COUNT(*) FROM process_history WHERE entity_kind = ?1 AND entity_id = ?2",
        params![entity.as_str(), entity_id],
        |row| row.get(0),
    )?;
    let persisted = persisted as usize;
    if persisted > entries.len() {
        // 内存副本比库内短: 调用方持有的是旧快照, 拒绝写入以免丢履历
        return Err(RepositoryError::InternalError(format!(
            "履历快照过期: {}:{} 库内{}条, 待写{}条",
            entity.as_str(),
            entity_id,
            persisted,
            entries.len()
        )));
    }

    let mut stmt = conn.prepare_cached(
        r#"INSERT INTO process_history (entity_kind, entity_id, action, changes_json, actor, ts)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
    )?;
    for entry in &entries[persisted..] {
        stmt.execute(params![
            entity.as_str(),
            entity_id,
            entry.action,
            entry.changes.to_string(),
            entry.user,
            format_ts(&entry.timestamp),
        ])?;
    }
    Ok(entries.len() - persisted)
}

/// 按写入顺序读取履历
pub(crate) fn load(
    conn: &Connection,
    entity: HistoryEntity,
    entity_id: &str,
) -> RepositoryResult<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare_cached(
        r#"SELECT action, changes_json, actor, ts
           FROM process_history
           WHERE entity_kind = ?1 AND entity_id = ?2
           ORDER BY history_id"#,
    )?;
    let entries = stmt
        .query_map(params![entity.as_str(), entity_id], |row| {
            let changes: String = row.get(1)?;
            let ts: String = row.get(3)?;
            Ok(HistoryEntry {
                action: row.get(0)?,
                changes: parse_json(1, &changes)?,
                user: row.get(2)?,
                timestamp: parse_ts(3, &ts)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

// ==========================================
// HistoryRepository - 履历查询仓储
// ==========================================
pub struct HistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询聚合的完整履历
    pub fn list_for(&self, entity: HistoryEntity, entity_id: &str) -> RepositoryResult<Vec<HistoryEntry>> {
        let conn = self.get_conn()?;
        load(&conn, entity, entity_id)
    }
}
