//! 网络连通性判断
//!
//! 每次调用都重新探测，不做缓存：连通性可能在两次调用之间变化。

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// 连通性判断接口
#[async_trait]
pub trait ConnectivityOracle: Send + Sync {
    /// 当前是否存在可以访问远端存储的网络
    async fn is_online(&self) -> bool;
}

/// 通过 TCP 探测远端 API 主机判断是否在线
pub struct TcpProbeConnectivity {
    /// `host:port`
    addr: String,
    timeout: Duration,
}

impl TcpProbeConnectivity {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    /// 从 API 基础 URL 推导探测地址（缺省端口按协议取 80/443）
    pub fn from_base_url(api_base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let url = reqwest::Url::parse(api_base_url)
            .map_err(|e| anyhow::anyhow!("无效的 API 地址 {}: {}", api_base_url, e))?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("API 地址缺少主机名: {}", api_base_url))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("无法确定 API 端口: {}", api_base_url))?;
        Ok(Self::new(format!("{}:{}", host, port), timeout))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ConnectivityOracle for TcpProbeConnectivity {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("[Network] 探测 {} 失败: {}", self.addr, e);
                false
            }
            Err(_) => {
                debug!("[Network] 探测 {} 超时", self.addr);
                false
            }
        }
    }
}

/// 手动切换的连通性（命令行 `--offline`、测试）
#[derive(Debug, Default)]
pub struct ManualConnectivity {
    online: AtomicBool,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityOracle for ManualConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_addr_from_url() {
        let probe =
            TcpProbeConnectivity::from_base_url("https://api.example.com/v1", Duration::from_secs(1))
                .unwrap();
        assert_eq!(probe.addr(), "api.example.com:443");

        let probe =
            TcpProbeConnectivity::from_base_url("http://localhost:10002", Duration::from_secs(1))
                .unwrap();
        assert_eq!(probe.addr(), "localhost:10002");
    }

    #[test]
    fn test_probe_rejects_bad_url() {
        assert!(TcpProbeConnectivity::from_base_url("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_probe_reaches_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let probe = TcpProbeConnectivity::new(addr.to_string(), Duration::from_millis(500));
        assert!(probe.is_online().await);

        drop(listener);
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn test_manual_toggle() {
        let oracle = ManualConnectivity::new(false);
        assert!(!oracle.is_online().await);
        oracle.set_online(true);
        assert!(oracle.is_online().await);
    }
}
