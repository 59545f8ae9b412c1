// ==========================================
// 染整车间生产流程引擎 - 履历领域模型
// ==========================================
// 红线: 履历只追加, 不修改, 不删除
// 用途: 审计追踪, 部分写入失败后的现场还原
// 对齐: process_history 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// HistoryEntry - 履历条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: String,          // 动作名称, 见 history_actions
    pub changes: JsonValue,      // 变更内容 (JSON 对象)
    pub user: String,            // 操作人
    pub timestamp: NaiveDateTime, // 操作时间 (请求内统一的 now)
}

impl HistoryEntry {
    /// 创建空变更的履历条目
    pub fn new(action: &str, user: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            action: action.to_string(),
            changes: JsonValue::Object(Default::default()),
            user: user.to_string(),
            timestamp,
        }
    }

    /// 设置变更内容 (序列化失败时保留空对象)
    pub fn with_changes<T: Serialize>(mut self, changes: &T) -> Self {
        if let Ok(value) = serde_json::to_value(changes) {
            self.changes = value;
        }
        self
    }
}

// ==========================================
// 履历动作名称
// ==========================================
pub mod history_actions {
    pub const PROCESS_CREATED: &str = "Process Created";
    pub const PROCESS_UPDATED: &str = "Process Updated";
    pub const PROCESS_STARTED: &str = "Process Started";
    pub const PROCESS_PAUSED: &str = "Process Paused";
    pub const PROCESS_RESUMED: &str = "Process Resumed";
    pub const PROCESS_STOPPED: &str = "Process Stopped";
    pub const WATER_STARTED: &str = "Water Started";
    pub const WATER_PAUSED: &str = "Water Paused";
    pub const WATER_RESUMED: &str = "Water Resumed";
    pub const WATER_STOPPED: &str = "Water Stopped";
    pub const WATER_COST_CALCULATED: &str = "Water Cost Calculated";
    pub const PROCESS_COMPLETED: &str = "Process Completed";
    pub const COST_ANOMALY: &str = "Cost Anomaly";
    pub const CLOCK_ANOMALY: &str = "Clock Anomaly";
    pub const CHEMICAL_ADDED: &str = "Chemical Added";
    pub const DYE_ADDED: &str = "Dye Added";
    pub const QUEUE_REORDERED: &str = "Queue Reordered";
    pub const REPROCESS_STARTED: &str = "Re-Process Started";
    pub const REPROCESS_CREATED: &str = "Re-Process Created";
    pub const STATUS_RESYNCED: &str = "Status Re-synchronized";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_changes_keeps_payload() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let entry = HistoryEntry::new(history_actions::PROCESS_PAUSED, "ravi", ts)
            .with_changes(&json!({ "runningTimeMinutes": 30.0 }));

        assert_eq!(entry.action, "Process Paused");
        assert_eq!(entry.changes["runningTimeMinutes"], json!(30.0));
        assert_eq!(entry.user, "ravi");
    }
}
