//! 认证协作方契约
//!
//! token 的获取、刷新、重新登录都在 SDK 外部；同步层只做两件事：
//! 取 token 上行、遇到认证失败时把球交回去（绝不本地重试）。

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FieldOpsSDKError, Result};

/// 认证协作方（由宿主应用实现）
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// 当前有效 token；拿不到时返回 Auth 错误
    async fn token(&self) -> Result<String>;

    /// 当前登录用户 id（未登录为 None）
    fn current_user_id(&self) -> Option<String>;

    /// 同步遇到认证失败时回调；实现方应触发重新登录流程
    async fn on_auth_required(&self);
}

/// 固定 token 的简单实现（开发与测试用）
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
    user_id: Option<String>,
    auth_required: AtomicBool,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            user_id: Some(user_id.into()),
            auth_required: AtomicBool::new(false),
        }
    }

    /// 无 token 状态（token() 一律返回 Auth 错误）
    pub fn logged_out() -> Self {
        Self::default()
    }

    /// 是否收到过 on_auth_required 回调
    pub fn auth_was_required(&self) -> bool {
        self.auth_required.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String> {
        self.token
            .clone()
            .ok_or_else(|| FieldOpsSDKError::Auth("未登录".to_string()))
    }

    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    async fn on_auth_required(&self) {
        self.auth_required.store(true, Ordering::SeqCst);
    }
}
