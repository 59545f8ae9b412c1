// ==========================================
// 染整车间生产流程引擎 - 引擎层错误类型
// ==========================================
// 分类: 校验失败 / 未找到 / 冲突 / 状态转换非法 / 存储失败
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务冲突: {0}")]
    Conflict(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    pub(crate) fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        EngineError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
