// ==========================================
// 染整车间生产流程引擎 - 机台状态看板
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 机台最近一次生命周期状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    pub machine_no: String,
    pub last_status: String,
    pub receiver_no: Option<String>,
    pub updated_at: NaiveDateTime,
}
