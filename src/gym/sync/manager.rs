//! 同步管理器：统一调度课程、教练、用户三类实体的同步

use crate::gym::entities::{GymClass, Teacher, User};
use crate::gym::error::SyncError;
use crate::gym::sync::models::{EntityKind, Record, SyncReport, SyncSummary};
use crate::gym::sync::service::EntitySyncer;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 同步管理器
///
/// 每种实体一个独立的 `EntitySyncer`，一种实体失败不影响其他实体。
pub struct SyncManager {
    classes: EntitySyncer<GymClass>,
    teachers: EntitySyncer<Teacher>,
    users: EntitySyncer<User>,
}

impl SyncManager {
    pub fn new(
        classes: EntitySyncer<GymClass>,
        teachers: EntitySyncer<Teacher>,
        users: EntitySyncer<User>,
    ) -> Self {
        Self {
            classes,
            teachers,
            users,
        }
    }

    pub fn classes(&self) -> &EntitySyncer<GymClass> {
        &self.classes
    }

    pub fn teachers(&self) -> &EntitySyncer<Teacher> {
        &self.teachers
    }

    pub fn users(&self) -> &EntitySyncer<User> {
        &self.users
    }

    /// 同步单个实体类型
    pub async fn sync_kind(&self, kind: EntityKind) -> Result<SyncReport, SyncError> {
        match kind {
            EntityKind::Class => self.classes.reconcile().await,
            EntityKind::Teacher => self.teachers.reconcile().await,
            EntityKind::User => self.users.reconcile().await,
        }
    }

    /// 依次同步全部实体（课程 → 教练 → 用户）
    pub async fn sync_all(&self) -> SyncSummary {
        info!("[SyncManager] 🔄 开始全量同步...");
        let mut summary = SyncSummary::default();
        for kind in EntityKind::ALL {
            let result = self.sync_kind(kind).await;
            summary.push(kind, result);
        }
        Self::log_summary(&summary);
        summary
    }

    /// 并发同步全部实体
    pub async fn sync_all_concurrently(&self) -> SyncSummary {
        info!("[SyncManager] 🔄 开始并发全量同步...");
        let (classes, teachers, users) = futures_util::join!(
            self.classes.reconcile(),
            self.teachers.reconcile(),
            self.users.reconcile()
        );
        let mut summary = SyncSummary::default();
        summary.push(EntityKind::Class, classes);
        summary.push(EntityKind::Teacher, teachers);
        summary.push(EntityKind::User, users);
        Self::log_summary(&summary);
        summary
    }

    /// 在后台任务中执行全量同步（应用启动时调用，不阻塞界面）
    pub fn spawn_sync_all(self: &Arc<Self>) -> tokio::task::JoinHandle<SyncSummary> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.sync_all().await })
    }

    fn log_summary(summary: &SyncSummary) {
        if summary.is_success() {
            info!(
                "[SyncManager] ✅ 全量同步完成 - 拉取: {}, 推送: {}",
                summary.total_pulled(),
                summary.total_pushed()
            );
        } else if summary.failures_are_transient() {
            warn!(
                "[SyncManager] ⚠️ 部分实体同步失败: {:?}，其余已完成，下次同步重试",
                summary.failed_kinds()
            );
        } else {
            error!(
                "[SyncManager] ❌ 部分实体同步失败且需要人工处理: {:?}",
                summary.failed_kinds()
            );
        }
    }

    // ========== 课程 ==========

    pub async fn get_all_classes(&self) -> Result<Vec<Record<GymClass>>> {
        self.classes.get_all().await
    }

    pub async fn get_class_by_id(&self, remote_id: &str) -> Result<Option<Record<GymClass>>> {
        self.classes.get_by_remote_id(remote_id).await
    }

    pub async fn add_class(&self, class: GymClass) -> Result<Record<GymClass>> {
        self.classes.add(class).await
    }

    pub async fn update_class(
        &self,
        record: Record<GymClass>,
    ) -> Result<Option<Record<GymClass>>> {
        self.classes.update(record).await
    }

    pub async fn delete_class(&self, local_id: i64) -> Result<bool> {
        self.classes.delete(local_id).await
    }

    // ========== 教练 ==========

    pub async fn get_all_teachers(&self) -> Result<Vec<Record<Teacher>>> {
        self.teachers.get_all().await
    }

    pub async fn get_teacher_by_id(&self, remote_id: &str) -> Result<Option<Record<Teacher>>> {
        self.teachers.get_by_remote_id(remote_id).await
    }

    pub async fn add_teacher(&self, teacher: Teacher) -> Result<Record<Teacher>> {
        self.teachers.add(teacher).await
    }

    pub async fn update_teacher(
        &self,
        record: Record<Teacher>,
    ) -> Result<Option<Record<Teacher>>> {
        self.teachers.update(record).await
    }

    pub async fn delete_teacher(&self, local_id: i64) -> Result<bool> {
        self.teachers.delete(local_id).await
    }

    // ========== 用户 ==========

    pub async fn get_all_users(&self) -> Result<Vec<Record<User>>> {
        self.users.get_all().await
    }

    pub async fn get_user_by_id(&self, remote_id: &str) -> Result<Option<Record<User>>> {
        self.users.get_by_remote_id(remote_id).await
    }

    pub async fn add_user(&self, user: User) -> Result<Record<User>> {
        self.users.add(user).await
    }

    pub async fn update_user(&self, record: Record<User>) -> Result<Option<Record<User>>> {
        self.users.update(record).await
    }

    pub async fn delete_user(&self, local_id: i64) -> Result<bool> {
        self.users.delete(local_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gym::network::ManualConnectivity;
    use crate::gym::sync::dao::SqliteLocalStore;
    use crate::gym::testing::{init_test_logger, migrated_pool, yoga_class, MemoryRemoteStore};

    struct Harness {
        manager: Arc<SyncManager>,
        classes: Arc<MemoryRemoteStore<GymClass>>,
        teachers: Arc<MemoryRemoteStore<Teacher>>,
        users: Arc<MemoryRemoteStore<User>>,
        network: Arc<ManualConnectivity>,
    }

    async fn harness(online: bool) -> Harness {
        let db = migrated_pool().await;
        let network = Arc::new(ManualConnectivity::new(online));
        let classes = Arc::new(MemoryRemoteStore::<GymClass>::new());
        let teachers = Arc::new(MemoryRemoteStore::<Teacher>::new());
        let users = Arc::new(MemoryRemoteStore::<User>::new());
        let manager = SyncManager::new(
            EntitySyncer::new(
                Arc::new(SqliteLocalStore::<GymClass>::new(db.clone())),
                classes.clone(),
                network.clone(),
            ),
            EntitySyncer::new(
                Arc::new(SqliteLocalStore::<Teacher>::new(db.clone())),
                teachers.clone(),
                network.clone(),
            ),
            EntitySyncer::new(
                Arc::new(SqliteLocalStore::<User>::new(db)),
                users.clone(),
                network.clone(),
            ),
        );
        Harness {
            manager: Arc::new(manager),
            classes,
            teachers,
            users,
            network,
        }
    }

    fn teacher(name: &str) -> Teacher {
        Teacher {
            name: name.into(),
            age: 30,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_one_kind_failing_does_not_stop_others() {
        init_test_logger();
        let h = harness(true).await;
        h.classes.seed("c1", yoga_class());
        h.users.seed("u1", User::default());
        h.teachers.set_failing(true);

        let summary = h.manager.sync_all().await;
        assert!(!summary.is_success());
        assert_eq!(summary.failed_kinds(), vec![EntityKind::Teacher]);
        assert!(summary.failures_are_transient());
        assert_eq!(summary.total_pulled(), 2);
        assert_eq!(h.manager.get_all_classes().await.unwrap().len(), 1);
        assert_eq!(h.manager.get_all_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sync_covers_every_kind() {
        let h = harness(true).await;
        h.classes.seed("c1", yoga_class());
        h.teachers.seed("t1", teacher("Lia"));
        h.users.seed("u1", User::default());

        let summary = h.manager.sync_all_concurrently().await;
        assert!(summary.is_success());
        assert_eq!(summary.total_pulled(), 3);
        for kind in EntityKind::ALL {
            assert!(summary.result(kind).is_some());
        }
    }

    #[tokio::test]
    async fn test_background_sync_after_offline_work() {
        let h = harness(false).await;
        h.manager.add_teacher(teacher("Lia")).await.unwrap();
        h.manager.add_class(yoga_class()).await.unwrap();

        let offline = h.manager.spawn_sync_all().await.unwrap();
        assert!(offline.is_success());
        assert_eq!(offline.total_pushed(), 0);
        assert_eq!(h.teachers.calls.total(), 0);

        h.network.set_online(true);
        let online = h.manager.spawn_sync_all().await.unwrap();
        assert!(online.is_success());
        assert_eq!(online.total_pushed(), 2);
        assert_eq!(h.teachers.snapshot().len(), 1);
        assert_eq!(h.classes.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_typed_operations_route_to_their_store() {
        let h = harness(true).await;
        let added = h.manager.add_teacher(teacher("Lia")).await.unwrap();
        assert!(added.synced);

        let fetched = h
            .manager
            .get_teacher_by_id(&added.remote_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.payload.name, "Lia");
        assert!(h.classes.snapshot().is_empty());

        assert!(h.manager.delete_teacher(added.local_id).await.unwrap());
        assert!(h.teachers.snapshot().is_empty());
    }
}
