use thiserror::Error;

/// 计时引擎错误
#[derive(Debug, Error)]
pub enum TimerError {
    /// 当前状态不允许该操作
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// 实体约束不成立
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl TimerError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// 调用方的请求错误（对应 HTTP 4xx），重试前需要修正请求
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::PreconditionFailed(_) | Self::Validation(_) | Self::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TimerError>;
