// ==========================================
// 染整车间生产流程引擎 - 接口权限校验
// ==========================================
// owner/admin/shiftincharge: 建单、回修、追加物料、调序
// operator: 只能开工/暂停/停机分派给自己的作业
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::actor::Actor;
use crate::domain::job::JobRecord;
use crate::domain::types::Role;

/// 管理角色
pub fn require_manager(actor: &Actor) -> ApiResult<()> {
    if actor.can_manage() {
        Ok(())
    } else {
        Err(forbidden(actor))
    }
}

/// 仅 owner / admin (删除作业)
pub fn require_owner_or_admin(actor: &Actor) -> ApiResult<()> {
    match actor.role {
        Role::Owner | Role::Admin => Ok(()),
        _ => Err(forbidden(actor)),
    }
}

/// 可操作指定作业
pub fn require_operate(actor: &Actor, job: &JobRecord) -> ApiResult<()> {
    if actor.can_operate(job) {
        Ok(())
    } else {
        tracing::warn!(actor = %actor.id, job_id = %job.job_id, "操作人员无权操作该作业");
        Err(ApiError::Forbidden(format!(
            "作业{}未分派给{}",
            job.receiver_no,
            actor.display_name()
        )))
    }
}

fn forbidden(actor: &Actor) -> ApiError {
    tracing::warn!(actor = %actor.id, role = %actor.role, "角色权限不足");
    ApiError::Forbidden(format!("角色{}权限不足", actor.role))
}
