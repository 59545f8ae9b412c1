// ==========================================
// 染整车间生产流程引擎 - 操作人员分派
// ==========================================
// 对齐: operator_assignment 表 (每个操作人员的在手作业列表)
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::AssignmentStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorAssignment {
    pub operator: String,
    pub job_id: String,
    pub receiver_no: String,
    pub status: AssignmentStatus,
    pub assigned_at: NaiveDateTime,
}
