// ==========================================
// 染整车间生产流程引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表幂等，唯一约束落在存储层
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳落库格式（毫秒精度，运行时长按毫秒折算）
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日期落库格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存库并建表（测试与演示用）
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
///
/// 唯一约束:
/// - (machine_no, plan_date, order_no): 同机台同日一个排队位只能有一个作业
/// - (base_receiver, cycle): 回修链上代次不重复
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS job_record (
            job_id TEXT PRIMARY KEY,
            receiver_no TEXT NOT NULL,
            base_receiver TEXT NOT NULL,
            cycle INTEGER NOT NULL,
            machine_no TEXT NOT NULL,
            plan_date TEXT NOT NULL,
            order_no INTEGER,
            qty REAL NOT NULL,
            rate REAL NOT NULL,
            base_cost REAL NOT NULL,
            carried_cost REAL,
            water_cost REAL NOT NULL DEFAULT 0,
            chemical_cost REAL NOT NULL DEFAULT 0,
            dye_cost REAL NOT NULL DEFAULT 0,
            total_cost REAL NOT NULL DEFAULT 0,
            running_time_minutes REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            operators_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (base_receiver, cycle)
        );

        -- NULL order_no 表示已离开排队, SQLite 唯一索引中 NULL 互不冲突
        CREATE UNIQUE INDEX IF NOT EXISTS ux_job_queue_slot
            ON job_record(machine_no, plan_date, order_no);
        CREATE INDEX IF NOT EXISTS idx_job_receiver ON job_record(receiver_no);
        CREATE INDEX IF NOT EXISTS idx_job_status ON job_record(status);

        CREATE TABLE IF NOT EXISTS job_material_line (
            line_id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL REFERENCES job_record(job_id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            qty REAL NOT NULL,
            cost REAL NOT NULL,
            added_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_material_line_job ON job_material_line(job_id);

        -- 履历只追加, 不设外键: 作业删除后审计记录保留
        CREATE TABLE IF NOT EXISTS process_history (
            history_id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            action TEXT NOT NULL,
            changes_json TEXT NOT NULL,
            actor TEXT NOT NULL,
            ts TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_entity ON process_history(entity_kind, entity_id);

        CREATE TABLE IF NOT EXISTS water_process (
            water_id TEXT PRIMARY KEY,
            receiver_no TEXT NOT NULL,
            opening_reading REAL,
            closing_reading REAL,
            running_time_minutes REAL NOT NULL DEFAULT 0,
            start_time TEXT,
            end_time TEXT,
            status TEXT NOT NULL,
            total_water_cost REAL NOT NULL DEFAULT 0,
            remarks TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_water_receiver ON water_process(receiver_no);

        CREATE TABLE IF NOT EXISTS customer_details (
            customer_id TEXT PRIMARY KEY,
            company_name TEXT NOT NULL,
            customer_name TEXT,
            receiver_no TEXT NOT NULL UNIQUE,
            party_dc_no TEXT,
            color TEXT,
            weight REAL,
            date TEXT
        );

        CREATE TABLE IF NOT EXISTS operator_assignment (
            operator TEXT NOT NULL,
            job_id TEXT NOT NULL,
            receiver_no TEXT NOT NULL,
            status TEXT NOT NULL,
            assigned_at TEXT NOT NULL,
            PRIMARY KEY (operator, job_id)
        );

        CREATE TABLE IF NOT EXISTS machine_status (
            machine_no TEXT PRIMARY KEY,
            last_status TEXT NOT NULL,
            receiver_no TEXT,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

// ==========================================
// 日期/时间列转换
// ==========================================

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// 解析时间戳列（兼容无毫秒的旧格式）
pub fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 解析 JSON 文本列
pub fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
