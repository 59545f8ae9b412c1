// ==========================================
// 染整车间生产流程引擎 - 用水计量领域模型
// ==========================================
// WaterProcess: 一次用水计量会话, 以回单号关联作业
// 不变量: running_time_minutes 只增不减
// 不变量: closing_reading >= opening_reading (完工时校验)
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::history::HistoryEntry;
use crate::domain::types::WaterStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterProcess {
    pub water_id: String,
    pub receiver_no: String, // 反范式关联键, 不是外键
    pub opening_reading: Option<f64>,
    pub closing_reading: Option<f64>,
    pub running_time_minutes: f64,
    pub start_time: Option<NaiveDateTime>, // 暂停期间为 None
    pub end_time: Option<NaiveDateTime>,
    pub status: WaterStatus,
    pub total_water_cost: f64,
    pub remarks: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl WaterProcess {
    /// 新建计量会话 (Pending, 尚未开始计时)
    pub fn new(water_id: String, receiver_no: &str, now: NaiveDateTime) -> Self {
        Self {
            water_id,
            receiver_no: receiver_no.to_string(),
            opening_reading: None,
            closing_reading: None,
            running_time_minutes: 0.0,
            start_time: None,
            end_time: None,
            status: WaterStatus::Pending,
            total_water_cost: 0.0,
            remarks: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.updated_at = entry.timestamp;
        self.history.push(entry);
    }
}
