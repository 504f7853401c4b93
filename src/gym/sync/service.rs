//! 本地缓存与远端存储的对账同步服务
//!
//! 一个 `EntitySyncer` 负责一种实体。同一实体的对账与写操作通过
//! `pass_lock` 串行执行；不同实体互不影响，可以并发。

use crate::gym::error::SyncError;
use crate::gym::network::ConnectivityOracle;
use crate::gym::sync::api::RemoteStore;
use crate::gym::sync::dao::LocalStore;
use crate::gym::sync::listener::{EmptySyncListener, SyncListener};
use crate::gym::sync::models::{Record, SyncEntity, SyncPhase, SyncReport};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// 单一实体类型的同步器
pub struct EntitySyncer<T: SyncEntity> {
    local: Arc<dyn LocalStore<T>>,
    remote: Arc<dyn RemoteStore<T>>,
    network: Arc<dyn ConnectivityOracle>,
    listener: Arc<dyn SyncListener>,
    /// 串行化本实体的对账与写操作
    pass_lock: Mutex<()>,
    phase: watch::Sender<SyncPhase>,
}

impl<T: SyncEntity> EntitySyncer<T> {
    /// 创建新的同步器（使用默认空监听器）
    pub fn new(
        local: Arc<dyn LocalStore<T>>,
        remote: Arc<dyn RemoteStore<T>>,
        network: Arc<dyn ConnectivityOracle>,
    ) -> Self {
        Self::with_listener(local, remote, network, Arc::new(EmptySyncListener))
    }

    /// 创建新的同步器（带自定义监听器）
    pub fn with_listener(
        local: Arc<dyn LocalStore<T>>,
        remote: Arc<dyn RemoteStore<T>>,
        network: Arc<dyn ConnectivityOracle>,
        listener: Arc<dyn SyncListener>,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            local,
            remote,
            network,
            listener,
            pass_lock: Mutex::new(()),
            phase,
        }
    }

    /// 当前同步阶段
    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// 订阅同步阶段变化
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }

    fn partial(&self, report: &SyncReport, e: anyhow::Error) -> SyncError {
        SyncError::PartialSync {
            kind: T::KIND,
            pulled: report.pulled,
            pushed: report.pushed,
            reason: format!("{:#}", e),
        }
    }

    /// 执行一次完整对账
    ///
    /// 离线时直接返回（不是错误）。中途失败时已应用的变更保留，
    /// 未执行的步骤留给下一次对账。
    ///
    /// 监听器回调都在释放 `pass_lock` 之后触发，回调里可以再调用本同步器。
    pub async fn reconcile(&self) -> Result<SyncReport, SyncError> {
        let tag = T::KIND.log_tag();
        info!("{} 🔄 开始对账同步...", tag);
        self.listener.on_sync_start(T::KIND).await;

        let mut pulled_json = None;
        let result = {
            let _guard = self.pass_lock.lock().await;
            let result = self.reconcile_locked(&mut pulled_json).await;
            self.set_phase(SyncPhase::Idle);
            result
        };

        if let Some(json) = pulled_json {
            self.listener.on_records_changed(T::KIND, json).await;
        }
        match &result {
            Ok(report) => {
                info!(
                    "{} ✅ 对账完成 - 拉取: {}, 推送: {}, 远端删除: {}, 离线: {}",
                    tag, report.pulled, report.pushed, report.remote_deleted, report.offline
                );
                self.listener.on_sync_finish(report).await;
            }
            Err(e) => {
                warn!("{} ❌ 对账失败，继续使用本地数据: {}", tag, e);
                self.listener.on_sync_failed(T::KIND, e.to_string()).await;
            }
        }
        result
    }

    async fn reconcile_locked(
        &self,
        pulled_json: &mut Option<String>,
    ) -> Result<SyncReport, SyncError> {
        let tag = T::KIND.log_tag();

        self.set_phase(SyncPhase::CheckingConnectivity);
        if !self.network.is_online().await {
            self.set_phase(SyncPhase::OfflineServe);
            info!("{} 当前离线，跳过同步", tag);
            return Ok(SyncReport::offline(T::KIND));
        }

        let mut report = SyncReport::new(T::KIND);

        self.set_phase(SyncPhase::Pulling);
        report.remote_deleted = self
            .flush_tombstones()
            .await
            .map_err(|e| self.partial(&report, e))?;

        let remote_records = self.remote.read_all().await.map_err(|e| {
            SyncError::RemoteUnavailable(format!("拉取远端 {} 失败: {:#}", T::KIND, e))
        })?;
        let local_records = self
            .local
            .get_all()
            .await
            .map_err(|e| SyncError::LocalCache(format!("{:#}", e)))?;
        let tombstoned: HashSet<String> = self
            .local
            .tombstones()
            .await
            .map_err(|e| SyncError::LocalCache(format!("{:#}", e)))?
            .into_iter()
            .collect();

        self.set_phase(SyncPhase::Diffing);
        debug!(
            "{} 远端记录数: {}, 本地记录数: {}",
            tag,
            remote_records.len(),
            local_records.len()
        );
        let local_remote_ids: HashSet<&str> = local_records
            .iter()
            .filter(|r| r.has_remote_id())
            .map(|r| r.remote_id.as_str())
            .collect();
        let pull_set: Vec<(String, T)> = remote_records
            .into_iter()
            .filter(|(id, _)| !local_remote_ids.contains(id.as_str()) && !tombstoned.contains(id))
            .collect();
        let push_set: Vec<Record<T>> = local_records.into_iter().filter(|r| !r.synced).collect();
        debug!(
            "{} 待拉取: {}, 待推送: {}",
            tag,
            pull_set.len(),
            push_set.len()
        );

        self.set_phase(SyncPhase::Applying);
        let mut pulled = Vec::with_capacity(pull_set.len());
        for (remote_id, payload) in pull_set {
            let mut record = Record::from_remote(remote_id, payload);
            record.local_id = self
                .local
                .insert(&record)
                .await
                .map_err(|e| self.partial(&report, e))?;
            debug!(
                "{}   拉取: remote_id={} -> local_id={}",
                tag, record.remote_id, record.local_id
            );
            report.pulled += 1;
            pulled.push(record);
        }
        if !pulled.is_empty() {
            *pulled_json = serde_json::to_string(&pulled).ok();
        }

        for record in push_set {
            self.push_record(&record)
                .await
                .map_err(|e| self.partial(&report, e))?;
            report.pushed += 1;
        }

        Ok(report)
    }

    /// 补发离线删除；单条失败保留墓碑，等待下一次
    async fn flush_tombstones(&self) -> Result<usize> {
        let tag = T::KIND.log_tag();
        let mut deleted = 0;
        for remote_id in self.local.tombstones().await? {
            match self.remote.delete(&remote_id).await {
                Ok(()) => {
                    self.local.remove_tombstone(&remote_id).await?;
                    info!("{}   已补发离线删除: {}", tag, remote_id);
                    deleted += 1;
                }
                Err(e) => {
                    warn!("{}   补发删除 {} 失败，保留墓碑: {:#}", tag, remote_id, e);
                }
            }
        }
        Ok(deleted)
    }

    /// 推送一条未同步记录并回写 remote_id
    async fn push_record(&self, record: &Record<T>) -> Result<()> {
        let remote_id = self.push_to_remote(record).await?;
        self.local.mark_synced(record.local_id, &remote_id).await?;
        debug!(
            "{}   推送完成: local_id={} -> remote_id={}",
            T::KIND.log_tag(),
            record.local_id,
            remote_id
        );
        Ok(())
    }

    /// 无 remote_id 则新建，否则更新；远端文档已被删除时带着本地修改重新新建
    async fn push_to_remote(&self, record: &Record<T>) -> Result<String> {
        if !record.has_remote_id() {
            return self.remote.create(&record.payload).await;
        }
        match self.remote.update(&record.remote_id, &record.payload).await {
            Ok(()) => Ok(record.remote_id.clone()),
            Err(e) if SyncError::is_not_found(&e) => {
                warn!(
                    "{}   远端文档 {} 已不存在，local_id={} 重新新建",
                    T::KIND.log_tag(),
                    record.remote_id,
                    record.local_id
                );
                self.remote.create(&record.payload).await
            }
            Err(e) => Err(e),
        }
    }

    /// 获取全部记录
    ///
    /// 在线：以远端快照为准并顺带写入本地缓存；离线或远端失败：返回本地缓存。
    pub async fn get_all(&self) -> Result<Vec<Record<T>>> {
        let tag = T::KIND.log_tag();
        if !self.network.is_online().await {
            debug!("{} 离线，返回本地缓存", tag);
            return self.local.get_all().await;
        }

        match self.remote.read_all().await {
            Ok(documents) => {
                let _guard = self.pass_lock.lock().await;
                let tombstoned: HashSet<String> =
                    self.local.tombstones().await?.into_iter().collect();
                let mut snapshot = Vec::with_capacity(documents.len());
                for (remote_id, payload) in documents {
                    if tombstoned.contains(&remote_id) {
                        continue;
                    }
                    snapshot.push(self.absorb_document(remote_id, payload).await?);
                }
                Ok(snapshot)
            }
            Err(e) => {
                warn!("{} 拉取远端失败，返回本地缓存: {:#}", tag, e);
                self.listener
                    .on_sync_failed(T::KIND, format!("{:#}", e))
                    .await;
                self.local.get_all().await
            }
        }
    }

    /// 按远端 ID 获取记录，规则同 `get_all`；远端不存在时返回 None
    pub async fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<Record<T>>> {
        let tag = T::KIND.log_tag();
        if remote_id.is_empty() {
            return Ok(None);
        }
        if self.local.tombstones().await?.iter().any(|t| t == remote_id) {
            return Ok(None);
        }
        if !self.network.is_online().await {
            return self.local.get_by_remote_id(remote_id).await;
        }

        match self.remote.read_by_id(remote_id).await {
            Ok(Some(payload)) => {
                let _guard = self.pass_lock.lock().await;
                self.absorb_document(remote_id.to_string(), payload)
                    .await
                    .map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(
                    "{} 拉取远端 {} 失败，返回本地缓存: {:#}",
                    tag, remote_id, e
                );
                self.local.get_by_remote_id(remote_id).await
            }
        }
    }

    /// 按本地 ID 获取记录；已有远端 ID 且在线时顺带刷新
    ///
    /// 远端查不到时返回本地行：本地行从不因远端缺失而删除。
    pub async fn get_by_local_id(&self, local_id: i64) -> Result<Option<Record<T>>> {
        let Some(cached) = self.local.get_by_local_id(local_id).await? else {
            return Ok(None);
        };
        if !cached.has_remote_id() || !self.network.is_online().await {
            return Ok(Some(cached));
        }

        match self.remote.read_by_id(&cached.remote_id).await {
            Ok(Some(payload)) => {
                let _guard = self.pass_lock.lock().await;
                self.absorb_document(cached.remote_id.clone(), payload)
                    .await
                    .map(Some)
            }
            Ok(None) => Ok(Some(cached)),
            Err(e) => {
                warn!(
                    "{} 刷新 local_id={} 失败，返回本地缓存: {:#}",
                    T::KIND.log_tag(),
                    local_id,
                    e
                );
                Ok(Some(cached))
            }
        }
    }

    /// 将一个远端文档写入本地缓存；带未推送本地修改的行保持不变
    async fn absorb_document(&self, remote_id: String, payload: T) -> Result<Record<T>> {
        match self.local.get_by_remote_id(&remote_id).await? {
            Some(existing) if !existing.synced => {
                debug!(
                    "{} 本地记录 {} 有未推送修改，暂不覆盖",
                    T::KIND.log_tag(),
                    remote_id
                );
                Ok(existing)
            }
            Some(mut existing) => {
                existing.payload = payload;
                existing.synced = true;
                self.local.update(&existing).await?;
                Ok(existing)
            }
            None => {
                let record = Record::from_remote(remote_id, payload);
                let local_id = self.local.insert(&record).await?;
                Ok(self
                    .local
                    .get_by_local_id(local_id)
                    .await?
                    .unwrap_or(Record { local_id, ..record }))
            }
        }
    }

    /// 新增记录：先写本地，在线时再写远端
    pub async fn add(&self, payload: T) -> Result<Record<T>> {
        let _guard = self.pass_lock.lock().await;
        let tag = T::KIND.log_tag();

        let mut record = Record::new_local(payload);
        record.local_id = self.local.insert(&record).await?;
        info!("{} 本地新增记录 local_id={}", tag, record.local_id);

        if self.network.is_online().await {
            match self.remote.create(&record.payload).await {
                Ok(remote_id) => {
                    self.local.mark_synced(record.local_id, &remote_id).await?;
                    info!(
                        "{} 远端新增成功 local_id={} -> remote_id={}",
                        tag, record.local_id, remote_id
                    );
                }
                Err(e) => warn!(
                    "{} 远端新增失败，记录 local_id={} 等待下次同步: {:#}",
                    tag, record.local_id, e
                ),
            }
        } else {
            debug!("{} 离线，local_id={} 等待下次同步", tag, record.local_id);
        }

        Ok(self
            .local
            .get_by_local_id(record.local_id)
            .await?
            .unwrap_or(record))
    }

    /// 更新记录：按 local_id 或 remote_id 定位，找不到时返回 None
    pub async fn update(&self, mut record: Record<T>) -> Result<Option<Record<T>>> {
        let _guard = self.pass_lock.lock().await;
        let tag = T::KIND.log_tag();

        record.synced = false;
        if self.local.update(&record).await? == 0 {
            debug!("{} 更新目标不存在: local_id={}", tag, record.local_id);
            return Ok(None);
        }
        let current = if record.local_id > 0 {
            self.local.get_by_local_id(record.local_id).await?
        } else {
            self.local.get_by_remote_id(&record.remote_id).await?
        };
        let Some(current) = current else {
            return Ok(None);
        };

        if self.network.is_online().await {
            match self.push_to_remote(&current).await {
                Ok(remote_id) => {
                    self.local.mark_synced(current.local_id, &remote_id).await?;
                }
                Err(e) => warn!(
                    "{} 远端更新失败，记录 local_id={} 等待下次同步: {:#}",
                    tag, current.local_id, e
                ),
            }
        }

        self.local.get_by_local_id(current.local_id).await
    }

    /// 删除记录：先删本地；远端删除失败或离线时写入墓碑，由下次对账补发
    pub async fn delete(&self, local_id: i64) -> Result<bool> {
        let _guard = self.pass_lock.lock().await;
        let tag = T::KIND.log_tag();

        let Some(existing) = self.local.get_by_local_id(local_id).await? else {
            return Ok(false);
        };
        self.local.delete(local_id).await?;
        info!("{} 本地删除 local_id={}", tag, local_id);

        if !existing.has_remote_id() {
            return Ok(true);
        }

        if self.network.is_online().await {
            match self.remote.delete(&existing.remote_id).await {
                Ok(()) => return Ok(true),
                Err(e) => warn!(
                    "{} 远端删除 {} 失败，记录墓碑: {:#}",
                    tag, existing.remote_id, e
                ),
            }
        }
        self.local.add_tombstone(&existing.remote_id).await?;
        Ok(true)
    }
}
