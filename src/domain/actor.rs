// ==========================================
// 染整车间生产流程引擎 - 请求操作人
// ==========================================
// 来源: 令牌校验结果 {id, role, name}
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::job::JobRecord;
use crate::domain::types::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            name: name.into(),
        }
    }

    /// 履历中记录的操作人
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn can_manage(&self) -> bool {
        self.role.can_manage()
    }

    /// 管理角色可操作任意作业, 操作工只能操作分派给自己的作业
    pub fn can_operate(&self, job: &JobRecord) -> bool {
        self.can_manage() || job.is_assigned_to(&self.name) || job.is_assigned_to(&self.id)
    }
}
