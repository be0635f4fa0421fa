//! SDK 统一错误类型
//!
//! 同步编排层只关心错误的大类（解码 / 传输 / 认证 / 本地存储），
//! 据此决定跳过、保留 dirty 还是中止本轮。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldOpsSDKError {
    /// 本地数据库错误（单条记录的同步中止，其他类型不受影响）
    #[error("Database error: {0}")]
    Database(String),

    /// 数据库迁移 / 版本校验错误
    #[error("Migration error: {0}")]
    Migration(String),

    /// wire 记录解码失败（跳过该条，继续批次）
    #[error("Decode error: {0}")]
    Decode(String),

    /// 网络 / 传输错误（推送记录保持 dirty，拉取跳过本轮）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 认证失败（不在本地重试，交回认证协作方重新登录）
    #[error("Authentication error: {0}")]
    Auth(String),

    /// JSON 序列化 / 反序列化错误
    #[error("JSON error: {0}")]
    Json(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(String),

    /// 参数错误
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 记录不存在
    #[error("Not found: {0}")]
    NotFound(String),

    /// store actor 已停止（正常关闭后调用方仍在发命令）
    #[error("Store is shut down")]
    StoreClosed,

    #[error("Other error: {0}")]
    Other(String),
}

impl FieldOpsSDKError {
    /// 是否认证错误（编排层据此转交认证协作方，而不是重试）
    pub fn is_auth(&self) -> bool {
        matches!(self, FieldOpsSDKError::Auth(_))
    }

    /// 是否解码错误（批次内逐条跳过）
    pub fn is_decode(&self) -> bool {
        matches!(self, FieldOpsSDKError::Decode(_))
    }
}

impl From<rusqlite::Error> for FieldOpsSDKError {
    fn from(e: rusqlite::Error) -> Self {
        FieldOpsSDKError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for FieldOpsSDKError {
    fn from(e: serde_json::Error) -> Self {
        FieldOpsSDKError::Json(e.to_string())
    }
}

impl From<std::io::Error> for FieldOpsSDKError {
    fn from(e: std::io::Error) -> Self {
        FieldOpsSDKError::Io(e.to_string())
    }
}

impl From<reqwest::Error> for FieldOpsSDKError {
    fn from(e: reqwest::Error) -> Self {
        FieldOpsSDKError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FieldOpsSDKError>;
