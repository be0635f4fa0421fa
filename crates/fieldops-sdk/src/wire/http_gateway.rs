//! RemoteGateway 的 HTTP 实现
//!
//! 传输职责（超时、token 注入、响应包装形态）全部收在这里，
//! 编排层只看到 fetch/push 的成功失败。
//!
//! no-code 平台的响应包装不稳定：列表有时是裸数组，有时包在
//! `{"records": [...]}` 或 `{"data": [...]}` 里；单条推送的回显同理。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthProvider;
use crate::error::{FieldOpsSDKError, Result};
use crate::storage::entities::is_local_id;
use crate::sync::entity_type::EntityKind;
use crate::sync::SyncScope;
use crate::wire::decode;
use crate::wire::{RemoteGateway, WireRecord};

/// 默认单次请求超时
const DEFAULT_TIMEOUT_SECS: u64 = 20;

pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        Self::with_timeout(base_url, auth, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FieldOpsSDKError::Transport(format!("构建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, kind: EntityKind, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{}/{}", self.base_url, kind.resource(), id),
            None => format!("{}/{}", self.base_url, kind.resource()),
        }
    }

    async fn bearer(&self) -> Result<String> {
        self.auth.token().await
    }

    fn map_status(status: StatusCode, body: &str) -> FieldOpsSDKError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                FieldOpsSDKError::Auth(format!("HTTP {}: {}", status.as_u16(), body))
            }
            _ => FieldOpsSDKError::Transport(format!("HTTP {}: {}", status.as_u16(), body)),
        }
    }
}

/// 列表响应拆包：裸数组 / {"records": []} / {"data": []}
fn unwrap_records(body: Value) -> Result<Vec<WireRecord>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            for key in ["records", "data", "items"] {
                if let Some(Value::Array(items)) = obj.remove(key) {
                    return Ok(items);
                }
            }
            Err(FieldOpsSDKError::Decode(
                "列表响应既不是数组也没有 records/data/items 包装".to_string(),
            ))
        }
        other => Err(FieldOpsSDKError::Decode(format!(
            "意外的列表响应形态: {}",
            other
        ))),
    }
}

/// 单条响应拆包：裸对象 / {"record": {}} / {"data": {}}
fn unwrap_record(body: Value) -> Result<WireRecord> {
    match body {
        Value::Object(ref obj) => {
            for key in ["record", "data"] {
                if let Some(inner @ Value::Object(_)) = obj.get(key) {
                    return Ok(inner.clone());
                }
            }
            Ok(body)
        }
        other => Err(FieldOpsSDKError::Decode(format!(
            "意外的单条响应形态: {}",
            other
        ))),
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch(&self, kind: EntityKind, scope: &SyncScope) -> Result<Vec<WireRecord>> {
        let token = self.bearer().await?;
        let mut request = self.http.get(self.url(kind, None)).bearer_auth(token);
        if let SyncScope::Company(company_id) = scope {
            request = request.query(&[("company", company_id.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &body));
        }

        let records = unwrap_records(response.json::<Value>().await?)?;
        debug!(kind = kind.as_str(), count = records.len(), "fetch 完成");
        Ok(records)
    }

    async fn push(&self, kind: EntityKind, record: WireRecord) -> Result<WireRecord> {
        let token = self.bearer().await?;
        // 有服务端 id → PATCH 更新；没有（本地新建，payload 已去掉占位 id）→ POST 创建
        let remote_id = decode::opt_id(&record).filter(|id| !is_local_id(id));
        let request = match &remote_id {
            Some(id) => self.http.patch(self.url(kind, Some(id))),
            None => self.http.post(self.url(kind, None)),
        };

        let response = request.bearer_auth(token).json(&record).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                kind = kind.as_str(),
                id = remote_id.as_deref().unwrap_or("<new>"),
                status = status.as_u16(),
                "push 失败"
            );
            return Err(Self::map_status(status, &body));
        }

        unwrap_record(response.json::<Value>().await?)
    }
}
