use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error};

/// 远端"文档不存在"错误码
pub const ERR_CODE_RECORD_NOT_FOUND: i32 = 1004;

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 统一的 API 响应包装结构体（包含 errCode、errMsg、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg", default)]
    pub err_msg: String,
    pub data: Option<T>,
}

/// 远端文档：服务端生成的 ID + 负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDocument<T> {
    pub id: String,
    pub data: T,
}

/// 新建文档响应
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentResp {
    pub id: String,
}

/// 全量文档响应
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct AllDocumentsResp<T> {
    #[serde(deserialize_with = "deserialize_vec_or_null", default = "Vec::new")]
    pub documents: Vec<RemoteDocument<T>>,
}

/// 单个文档响应
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentResp<T> {
    #[serde(default = "Option::default")]
    pub document: Option<RemoteDocument<T>>,
}

/// 通用 HTTP 响应处理函数：读取 body，校验 HTTP 状态并反序列化为 `ApiResponse<T>`
///
/// 非零错误码不在这里判定为失败，由调用方决定（例如"文档不存在"需要转换为 None）
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    use anyhow::Context;

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    Ok(api_resp)
}

/// 检查错误码，非零即视为服务器错误
pub fn ensure_ok<T>(api_resp: &ApiResponse<T>, operation_name: &str) -> anyhow::Result<()> {
    if api_resp.err_code != 0 {
        error!(
            "[HTTP] {}服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
        return Err(anyhow::anyhow!(
            "服务器错误 {}: {}",
            api_resp.err_code,
            api_resp.err_msg
        ));
    }
    Ok(())
}
