//! 同步层模型定义

use crate::gym::error::SyncError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use std::fmt;

/// 参与同步的实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Class,
    Teacher,
    User,
}

impl EntityKind {
    /// 同步顺序：课程 → 教练 → 用户
    pub const ALL: [EntityKind; 3] = [EntityKind::Class, EntityKind::Teacher, EntityKind::User];

    /// 本地缓存表名
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Class => "local_classes",
            EntityKind::Teacher => "local_teachers",
            EntityKind::User => "local_users",
        }
    }

    /// 远端文档集合名
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Class => "classes",
            EntityKind::Teacher => "teachers",
            EntityKind::User => "users",
        }
    }

    /// 日志前缀
    pub fn log_tag(&self) -> &'static str {
        match self {
            EntityKind::Class => "[ClassSync]",
            EntityKind::Teacher => "[TeacherSync]",
            EntityKind::User => "[UserSync]",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Teacher => "teacher",
            EntityKind::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 本地缓存中的一行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    /// 本地自增 ID，未入库前为 0
    #[serde(rename = "localID")]
    pub local_id: i64,
    /// 远端文档 ID，未被远端接受前为空
    #[serde(rename = "remoteID")]
    pub remote_id: String,
    /// 本地字段是否与远端一致
    pub synced: bool,
    /// 行创建时间（毫秒），由本地缓存填充
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    pub payload: T,
}

impl<T> Record<T> {
    /// 本地新建（离线可用）的记录
    pub fn new_local(payload: T) -> Self {
        Self {
            local_id: 0,
            remote_id: String::new(),
            synced: false,
            created_at: 0,
            payload,
        }
    }

    /// 从远端文档构造的记录，视为已同步
    pub fn from_remote(remote_id: String, payload: T) -> Self {
        Self {
            local_id: 0,
            remote_id,
            synced: true,
            created_at: 0,
            payload,
        }
    }

    pub fn has_remote_id(&self) -> bool {
        !self.remote_id.is_empty()
    }
}

/// 列定义：列名与 SQLite 类型声明
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub decl: &'static str,
}

impl ColumnDef {
    pub const fn new(name: &'static str, decl: &'static str) -> Self {
        Self { name, decl }
    }
}

/// 绑定到 SQL 语句的值
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

/// 可同步实体：声明自己的本地列结构以及与 SQLite 行之间的转换
pub trait SyncEntity:
    Clone + Send + Sync + Serialize + DeserializeOwned + fmt::Debug + 'static
{
    const KIND: EntityKind;

    /// 负载列（不含 local_id / remote_id / synced / created_at）
    fn columns() -> &'static [ColumnDef];

    /// 按 `columns()` 的顺序导出列值
    fn to_values(&self) -> anyhow::Result<Vec<SqlValue>>;

    /// 从查询行读取负载
    fn from_row(row: &SqliteRow) -> anyhow::Result<Self>;
}

/// 单次同步的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Idle,
    CheckingConnectivity,
    OfflineServe,
    Pulling,
    Diffing,
    Applying,
}

/// 单个实体类型一次同步的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub kind: Option<EntityKind>,
    /// 从远端拉取并写入本地的条数
    pub pulled: usize,
    /// 推送到远端（新建或更新）的条数
    pub pushed: usize,
    /// 补发到远端的离线删除条数
    pub remote_deleted: usize,
    /// 离线时直接结束，未做任何改动
    pub offline: bool,
}

impl SyncReport {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn offline(kind: EntityKind) -> Self {
        Self {
            kind: Some(kind),
            offline: true,
            ..Default::default()
        }
    }
}

/// 三种实体一轮同步的汇总，每种类型独立成功或失败
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub results: Vec<(EntityKind, Result<SyncReport, SyncError>)>,
}

impl SyncSummary {
    pub fn push(&mut self, kind: EntityKind, result: Result<SyncReport, SyncError>) {
        self.results.push((kind, result));
    }

    pub fn result(&self, kind: EntityKind) -> Option<&Result<SyncReport, SyncError>> {
        self.results
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, r)| r)
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }

    /// 失败的类型是否都能在下次同步时重试（无本地缓存或结构错误）
    pub fn failures_are_transient(&self) -> bool {
        self.results
            .iter()
            .filter_map(|(_, r)| r.as_ref().err())
            .all(SyncError::is_transient)
    }

    pub fn failed_kinds(&self) -> Vec<EntityKind> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn total_pulled(&self) -> usize {
        self.results
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .map(|r| r.pulled)
            .sum()
    }

    pub fn total_pushed(&self) -> usize {
        self.results
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .map(|r| r.pushed)
            .sum()
    }
}
