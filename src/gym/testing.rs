//! 测试辅助：内存数据库、内存远端存储、测试日志

use crate::gym::entities::GymClass;
use crate::gym::error::SyncError;
use crate::gym::network::ManualConnectivity;
use crate::gym::schema::migrate_all;
use crate::gym::sync::api::RemoteStore;
use crate::gym::sync::dao::SqliteLocalStore;
use crate::gym::sync::models::SyncEntity;
use crate::gym::sync::service::EntitySyncer;
use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

static INIT_LOGGER: Once = Once::new();

pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,gym_sdk_core_rust=debug,sqlx=warn");
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// 单连接的内存库（多连接时每个连接各自是一个空库）
pub async fn memory_pool() -> Pool<Sqlite> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite")
}

pub async fn migrated_pool() -> Pool<Sqlite> {
    let pool = memory_pool().await;
    migrate_all(&pool).await.expect("migrate in-memory sqlite");
    pool
}

pub fn yoga_class() -> GymClass {
    GymClass {
        day_of_week: "Monday".into(),
        time: "18:30".into(),
        capacity: 20,
        duration: 60,
        price: 12.5,
        class_type: "yoga".into(),
        description: "Yoga101".into(),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct CallCounts {
    create: AtomicUsize,
    read_all: AtomicUsize,
    read_by_id: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
}

impl CallCounts {
    pub fn create(&self) -> usize {
        self.create.load(Ordering::SeqCst)
    }

    pub fn update(&self) -> usize {
        self.update.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        [
            &self.create,
            &self.read_all,
            &self.read_by_id,
            &self.update,
            &self.delete,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

/// 内存远端存储，带调用计数与故障注入
pub struct MemoryRemoteStore<T> {
    docs: Mutex<BTreeMap<String, T>>,
    queued_ids: Mutex<VecDeque<String>>,
    next_id: AtomicUsize,
    failing: AtomicBool,
    failing_deletes: AtomicBool,
    /// 允许成功的 create 次数，之后全部失败
    create_budget: Mutex<Option<usize>>,
    pub calls: CallCounts,
}

impl<T: SyncEntity> Default for MemoryRemoteStore<T> {
    fn default() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
            queued_ids: Mutex::new(VecDeque::new()),
            next_id: AtomicUsize::new(1),
            failing: AtomicBool::new(false),
            failing_deletes: AtomicBool::new(false),
            create_budget: Mutex::new(None),
            calls: CallCounts::default(),
        }
    }
}

impl<T: SyncEntity> MemoryRemoteStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入远端文档（不计入调用次数）
    pub fn seed(&self, id: &str, payload: T) {
        self.docs.lock().unwrap().insert(id.to_string(), payload);
    }

    /// 模拟其他设备删除远端文档（不计入调用次数）
    pub fn remove(&self, id: &str) {
        self.docs.lock().unwrap().remove(id);
    }

    /// 指定下一次 create 分配的 ID
    pub fn queue_id(&self, id: &str) {
        self.queued_ids.lock().unwrap().push_back(id.to_string());
    }

    pub fn snapshot(&self) -> BTreeMap<String, T> {
        self.docs.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    pub fn fail_creates_after(&self, successes: usize) {
        *self.create_budget.lock().unwrap() = Some(successes);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("remote unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl<T: SyncEntity> RemoteStore<T> for MemoryRemoteStore<T> {
    async fn create(&self, payload: &T) -> Result<String> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        {
            let mut budget = self.create_budget.lock().unwrap();
            if let Some(left) = budget.as_mut() {
                if *left == 0 {
                    bail!("create rejected");
                }
                *left -= 1;
            }
        }
        let id = match self.queued_ids.lock().unwrap().pop_front() {
            Some(id) => id,
            None => format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
        };
        self.docs.lock().unwrap().insert(id.clone(), payload.clone());
        Ok(id)
    }

    async fn read_all(&self) -> Result<Vec<(String, T)>> {
        self.calls.read_all.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn read_by_id(&self, id: &str) -> Result<Option<T>> {
        self.calls.read_by_id.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.docs.lock().unwrap().get(id).cloned())
    }

    async fn update(&self, id: &str, payload: &T) -> Result<()> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        match self.docs.lock().unwrap().get_mut(id) {
            Some(doc) => {
                *doc = payload.clone();
                Ok(())
            }
            None => Err(SyncError::NotFound(format!("document {}", id)).into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.failing_deletes.load(Ordering::SeqCst) {
            bail!("delete rejected");
        }
        self.docs.lock().unwrap().remove(id);
        Ok(())
    }
}

pub struct Fixture<T: SyncEntity> {
    pub syncer: EntitySyncer<T>,
    pub local: Arc<SqliteLocalStore<T>>,
    pub remote: Arc<MemoryRemoteStore<T>>,
    pub network: Arc<ManualConnectivity>,
    pub db: Pool<Sqlite>,
}

/// 内存库 + 内存远端 + 手动网络状态组装的同步器
pub async fn fixture<T: SyncEntity>(online: bool) -> Fixture<T> {
    let db = migrated_pool().await;
    let local = Arc::new(SqliteLocalStore::<T>::new(db.clone()));
    let remote = Arc::new(MemoryRemoteStore::<T>::new());
    let network = Arc::new(ManualConnectivity::new(online));
    let syncer = EntitySyncer::new(local.clone(), remote.clone(), network.clone());
    Fixture {
        syncer,
        local,
        remote,
        network,
        db,
    }
}
