// ==========================================
// 染整车间生产流程引擎 - 领域类型定义
// ==========================================
// 职责: 作业状态、用水状态、角色等枚举
// 存储: 统一以 as_str() 字符串落库
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 作业状态 (Job Status)
// ==========================================
// 活动态: Pending / Running / Paused (占用排队位)
// 终止态: Stopped / Completed / Reprocess (离开排队)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,   // 待开工
    Running,   // 运行中
    Paused,    // 暂停
    Reprocess, // 已转入回修 (被新周期取代)
    Stopped,   // 已停机
    Completed, // 已完工
}

impl JobStatus {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Paused => "Paused",
            JobStatus::Reprocess => "Reprocess",
            JobStatus::Stopped => "Stopped",
            JobStatus::Completed => "Completed",
        }
    }

    /// 从字符串解析 (大小写不敏感)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "paused" => Some(JobStatus::Paused),
            "reprocess" => Some(JobStatus::Reprocess),
            "stopped" => Some(JobStatus::Stopped),
            "completed" => Some(JobStatus::Completed),
            _ => None,
        }
    }

    /// 是否占用机台排队位
    pub fn holds_queue_slot(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running | JobStatus::Paused)
    }

    /// 是否为未完结状态 (同一回单号在这些状态下只能有一条)
    pub fn is_active(&self) -> bool {
        self.holds_queue_slot()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 用水计量状态 (Water Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaterStatus {
    Pending,
    Running,
    Paused,
    Stopped,
    Completed,
}

impl WaterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaterStatus::Pending => "Pending",
            WaterStatus::Running => "Running",
            WaterStatus::Paused => "Paused",
            WaterStatus::Stopped => "Stopped",
            WaterStatus::Completed => "Completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(WaterStatus::Pending),
            "running" => Some(WaterStatus::Running),
            "paused" => Some(WaterStatus::Paused),
            "stopped" => Some(WaterStatus::Stopped),
            "completed" => Some(WaterStatus::Completed),
            _ => None,
        }
    }

    /// 计量会话是否仍未结束
    pub fn is_open(&self) -> bool {
        matches!(self, WaterStatus::Running | WaterStatus::Paused)
    }

    /// 用水状态对应的作业状态 (用于自愈同步)
    ///
    /// Pending 的计量行不代表作业进度, 返回 None
    pub fn implied_job_status(&self) -> Option<JobStatus> {
        match self {
            WaterStatus::Pending => None,
            WaterStatus::Running => Some(JobStatus::Running),
            WaterStatus::Paused => Some(JobStatus::Paused),
            WaterStatus::Stopped => Some(JobStatus::Stopped),
            WaterStatus::Completed => Some(JobStatus::Completed),
        }
    }
}

impl fmt::Display for WaterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 操作人员角色 (Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    ShiftIncharge,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::ShiftIncharge => "shiftincharge",
            Role::Operator => "operator",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            "shiftincharge" => Some(Role::ShiftIncharge),
            "operator" => Some(Role::Operator),
            _ => None,
        }
    }

    /// 可建单、回修、追加助剂的管理角色
    pub fn can_manage(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin | Role::ShiftIncharge)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 物料类别 (助剂 / 染料)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialKind {
    Chemical,
    Dye,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::Chemical => "Chemical",
            MaterialKind::Dye => "Dye",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Chemical" => Some(MaterialKind::Chemical),
            "Dye" => Some(MaterialKind::Dye),
            _ => None,
        }
    }
}

// ==========================================
// 操作人员分派状态 (对齐 assignedFabrics.status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Pending,
    Completed,
    Stopped,
    Reprocess,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "Pending",
            AssignmentStatus::Completed => "Completed",
            AssignmentStatus::Stopped => "Stopped",
            AssignmentStatus::Reprocess => "Reprocess",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(AssignmentStatus::Pending),
            "Completed" => Some(AssignmentStatus::Completed),
            "Stopped" => Some(AssignmentStatus::Stopped),
            "Reprocess" => Some(AssignmentStatus::Reprocess),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_roundtrip_and_slots() {
        for s in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Paused,
            JobStatus::Reprocess,
            JobStatus::Stopped,
            JobStatus::Completed,
        ] {
            assert_eq!(JobStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(JobStatus::from_str("  running "), Some(JobStatus::Running));
        assert!(JobStatus::Paused.holds_queue_slot());
        assert!(!JobStatus::Completed.holds_queue_slot());
        assert!(!JobStatus::Reprocess.holds_queue_slot());
    }

    #[test]
    fn test_water_status_implies_job_status() {
        assert_eq!(WaterStatus::Pending.implied_job_status(), None);
        assert_eq!(WaterStatus::Paused.implied_job_status(), Some(JobStatus::Paused));
        assert!(WaterStatus::Running.is_open());
        assert!(!WaterStatus::Stopped.is_open());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::from_str("ShiftIncharge"), Some(Role::ShiftIncharge));
        assert_eq!(Role::from_str("user"), None);
        assert!(!Role::Operator.can_manage());
        assert!(Role::Admin.can_manage());
    }
}
