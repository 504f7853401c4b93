//! 远端文档存储 HTTP API 客户端
//!
//! 每种实体对应一个远端集合，文档 ID 由服务端生成。

use crate::gym::error::SyncError;
use crate::gym::sync::models::SyncEntity;
use crate::gym::types::{
    ensure_ok, handle_http_response, AllDocumentsResp, CreateDocumentResp, DocumentResp,
    ERR_CODE_RECORD_NOT_FOUND,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::{debug, info};
use uuid::Uuid;

/// 远端存储接口
///
/// `read_all` 失败时必须返回错误，不能用空列表代替：
/// 调用方无法区分"远端确实为空"与"拉取失败"。
#[async_trait]
pub trait RemoteStore<T: SyncEntity>: Send + Sync {
    /// 新建文档，返回服务端分配的 ID
    async fn create(&self, payload: &T) -> Result<String>;

    async fn read_all(&self) -> Result<Vec<(String, T)>>;

    /// 文档不存在时返回 `Ok(None)`
    async fn read_by_id(&self, id: &str) -> Result<Option<T>>;

    /// 文档不存在时返回携带 `SyncError::NotFound` 的错误
    async fn update(&self, id: &str, payload: &T) -> Result<()>;

    /// 文档已不存在视为删除成功
    async fn delete(&self, id: &str) -> Result<()>;
}

/// 基于 HTTP 的远端存储
pub struct HttpRemoteStore<T> {
    client: reqwest::Client,
    api_base_url: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SyncEntity> HttpRemoteStore<T> {
    /// 创建新的远端存储客户端
    ///
    /// `client` 应该已经在外部配置好认证 header
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            _marker: PhantomData,
        }
    }

    fn url(&self, op: &str) -> String {
        format!("{}/{}/{}", self.api_base_url, T::KIND.collection(), op)
    }

    async fn post<R: DeserializeOwned>(
        &self,
        op: &str,
        body: serde_json::Value,
    ) -> Result<crate::gym::types::ApiResponse<R>> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url(op);
        debug!("[RemoteAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&body)
            .send()
            .await
            .context("请求失败")?;

        let operation_name = format!("{}/{}", T::KIND.collection(), op);
        handle_http_response(response, &operation_name).await
    }
}

#[async_trait]
impl<T: SyncEntity> RemoteStore<T> for HttpRemoteStore<T> {
    async fn create(&self, payload: &T) -> Result<String> {
        info!("[RemoteAPI] 📡 新建 {} 文档", T::KIND);
        let resp = self
            .post::<CreateDocumentResp>("create", serde_json::json!({ "data": payload }))
            .await?;
        ensure_ok(&resp, "新建文档")?;
        let data = resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;
        if data.id.is_empty() {
            anyhow::bail!("服务端返回的文档 ID 为空");
        }
        info!("[RemoteAPI] ✅ 新建 {} 文档成功，ID: {}", T::KIND, data.id);
        Ok(data.id)
    }

    async fn read_all(&self) -> Result<Vec<(String, T)>> {
        info!("[RemoteAPI] 📡 请求全量 {} 文档", T::KIND);
        let resp = self
            .post::<AllDocumentsResp<T>>("get_all", serde_json::json!({}))
            .await?;
        ensure_ok(&resp, "全量文档")?;
        let data = resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;
        info!(
            "[RemoteAPI] ✅ 全量 {} 文档响应，条目数: {}",
            T::KIND,
            data.documents.len()
        );
        Ok(data
            .documents
            .into_iter()
            .map(|d| (d.id, d.data))
            .collect())
    }

    async fn read_by_id(&self, id: &str) -> Result<Option<T>> {
        let resp = self
            .post::<DocumentResp<T>>("get", serde_json::json!({ "id": id }))
            .await?;
        if resp.err_code == ERR_CODE_RECORD_NOT_FOUND {
            debug!("[RemoteAPI] {} 文档 {} 不存在", T::KIND, id);
            return Ok(None);
        }
        ensure_ok(&resp, "单个文档")?;
        Ok(resp.data.and_then(|d| d.document).map(|d| d.data))
    }

    async fn update(&self, id: &str, payload: &T) -> Result<()> {
        info!("[RemoteAPI] 📡 更新 {} 文档 {}", T::KIND, id);
        let resp = self
            .post::<serde_json::Value>("update", serde_json::json!({ "id": id, "data": payload }))
            .await?;
        if resp.err_code == ERR_CODE_RECORD_NOT_FOUND {
            return Err(SyncError::NotFound(format!("{} 文档 {}", T::KIND, id)).into());
        }
        ensure_ok(&resp, "更新文档")
    }

    async fn delete(&self, id: &str) -> Result<()> {
        info!("[RemoteAPI] 📡 删除 {} 文档 {}", T::KIND, id);
        let resp = self
            .post::<serde_json::Value>("delete", serde_json::json!({ "id": id }))
            .await?;
        if resp.err_code == ERR_CODE_RECORD_NOT_FOUND {
            debug!("[RemoteAPI] {} 文档 {} 已不存在，视为删除成功", T::KIND, id);
            return Ok(());
        }
        ensure_ok(&resp, "删除文档")
    }
}
