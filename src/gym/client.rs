//! 客户端入口：组装本地缓存、远端存储、连通性判断与同步管理器

use crate::gym::db::create_sqlite_pool_with_migration;
use crate::gym::entities::{GymClass, Teacher, User};
use crate::gym::network::{ConnectivityOracle, ManualConnectivity, TcpProbeConnectivity};
use crate::gym::schema::TableMigration;
use crate::gym::sync::api::HttpRemoteStore;
use crate::gym::sync::dao::SqliteLocalStore;
use crate::gym::sync::listener::{EmptySyncListener, SyncListener};
use crate::gym::sync::manager::SyncManager;
use crate::gym::sync::models::SyncEntity;
use crate::gym::sync::service::EntitySyncer;
use anyhow::{Context, Result};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 客户端配置
#[derive(Debug, Clone)]
pub struct GymClientConfig {
    /// 远端文档存储 API 基础地址
    pub api_base_url: String,
    /// 认证 token
    pub token: String,
    /// 本地 SQLite 数据库 URL
    ///
    /// 例如：`sqlite://gym.db?mode=rwc`
    pub db_url: String,
    /// 连通性探测超时（毫秒）
    pub probe_timeout_ms: u64,
    /// 强制离线（不探测网络，所有操作走本地缓存）
    pub offline: bool,
}

impl GymClientConfig {
    /// 创建默认配置
    pub fn new(token: String) -> Self {
        Self {
            api_base_url: "http://localhost:10002".to_string(),
            token,
            db_url: "sqlite://gym.db?mode=rwc".to_string(),
            probe_timeout_ms: 1500,
            offline: false,
        }
    }

    /// 默认配置 + 环境变量覆盖
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(lookup("GYM_TOKEN").unwrap_or_default());
        if let Some(url) = lookup("GYM_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(db_url) = lookup("GYM_DB_URL") {
            config.db_url = db_url;
        }
        if let Some(ms) = lookup("GYM_PROBE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.probe_timeout_ms = ms;
        }
        config
    }
}

/// 健身房数据客户端
pub struct GymClient {
    config: GymClientConfig,
    db: Pool<Sqlite>,
    manager: Arc<SyncManager>,
    migrations: Vec<TableMigration>,
}

impl GymClient {
    /// 打开本地库、执行迁移并创建同步管理器（不会触发同步）
    pub async fn connect(config: GymClientConfig) -> Result<Self> {
        Self::connect_with_listener(config, Arc::new(EmptySyncListener)).await
    }

    pub async fn connect_with_listener(
        config: GymClientConfig,
        listener: Arc<dyn SyncListener>,
    ) -> Result<Self> {
        info!(
            "[GymClient] 初始化 - API: {}, DB: {}, 强制离线: {}",
            config.api_base_url, config.db_url, config.offline
        );
        let (db, migrations) = create_sqlite_pool_with_migration(&config.db_url).await?;

        // 带认证 header 的 HTTP 客户端（token 通过 default_headers 自动添加）
        let http_client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("token"),
                    reqwest::header::HeaderValue::from_str(&config.token)
                        .context("无效的 token")?,
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")?;

        let network: Arc<dyn ConnectivityOracle> = if config.offline {
            Arc::new(ManualConnectivity::new(false))
        } else {
            Arc::new(TcpProbeConnectivity::from_base_url(
                &config.api_base_url,
                Duration::from_millis(config.probe_timeout_ms),
            )?)
        };

        let manager = SyncManager::new(
            Self::syncer::<GymClass>(&config, &db, &http_client, &network, &listener),
            Self::syncer::<Teacher>(&config, &db, &http_client, &network, &listener),
            Self::syncer::<User>(&config, &db, &http_client, &network, &listener),
        );

        Ok(Self {
            config,
            db,
            manager: Arc::new(manager),
            migrations,
        })
    }

    fn syncer<T: SyncEntity>(
        config: &GymClientConfig,
        db: &Pool<Sqlite>,
        http_client: &reqwest::Client,
        network: &Arc<dyn ConnectivityOracle>,
        listener: &Arc<dyn SyncListener>,
    ) -> EntitySyncer<T> {
        EntitySyncer::with_listener(
            Arc::new(SqliteLocalStore::<T>::new(db.clone())),
            Arc::new(HttpRemoteStore::<T>::new(
                http_client.clone(),
                config.api_base_url.clone(),
            )),
            Arc::clone(network),
            Arc::clone(listener),
        )
    }

    pub fn config(&self) -> &GymClientConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.manager
    }

    /// 启动时各表的迁移结果
    pub fn migrations(&self) -> &[TableMigration] {
        &self.migrations
    }

    pub async fn close(self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gym::testing::yoga_class;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("GYM_TOKEN", "secret"),
            ("GYM_API_BASE_URL", "https://api.example.com"),
            ("GYM_PROBE_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let config = GymClientConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.token, "secret");
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.probe_timeout_ms, 250);
        assert_eq!(config.db_url, "sqlite://gym.db?mode=rwc");
    }

    #[test]
    fn test_bad_timeout_keeps_default() {
        let config = GymClientConfig::from_lookup(|k| {
            (k == "GYM_PROBE_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert_eq!(config.probe_timeout_ms, 1500);
        assert_eq!(config.token, "");
    }

    #[tokio::test]
    async fn test_offline_client_serves_local_cache() {
        let mut config = GymClientConfig::new("t".into());
        config.db_url = "sqlite::memory:".into();
        config.offline = true;
        let client = GymClient::connect(config).await.unwrap();
        assert_eq!(client.migrations().len(), 3);

        let manager = client.manager();
        let added = manager.add_class(yoga_class()).await.unwrap();
        assert!(!added.synced);
        let summary = manager.sync_all().await;
        assert!(summary.is_success());
        assert_eq!(manager.get_all_classes().await.unwrap().len(), 1);
        client.close().await;
    }
}
