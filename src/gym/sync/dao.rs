//! 本地缓存数据访问层（DAO）
//!
//! 每种实体一张表，主键为自增 local_id，remote_id 为可空唯一列。
//! 空 remote_id 以 NULL 入库，因此任意多条离线新建记录可以共存。

use crate::gym::sync::models::{Record, SqlValue, SyncEntity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::marker::PhantomData;
use tracing::debug;

/// 本地缓存接口
#[async_trait]
pub trait LocalStore<T: SyncEntity>: Send + Sync {
    /// 插入记录；remote_id 已存在时原地更新并返回原 local_id
    async fn insert(&self, record: &Record<T>) -> Result<i64>;

    /// 按 local_id（>0）或 remote_id（非空）定位并更新，返回受影响行数
    async fn update(&self, record: &Record<T>) -> Result<u64>;

    async fn get_by_local_id(&self, local_id: i64) -> Result<Option<Record<T>>>;

    async fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<Record<T>>>;

    async fn get_all(&self) -> Result<Vec<Record<T>>>;

    /// 删除记录，返回受影响行数
    async fn delete(&self, local_id: i64) -> Result<u64>;

    /// 远端确认后回写 remote_id 并标记已同步
    async fn mark_synced(&self, local_id: i64, remote_id: &str) -> Result<u64>;

    /// 记录一条尚未传播到远端的删除
    async fn add_tombstone(&self, remote_id: &str) -> Result<()>;

    async fn tombstones(&self) -> Result<Vec<String>>;

    async fn remove_tombstone(&self, remote_id: &str) -> Result<()>;
}

/// 基于 sqlx 的本地缓存实现
pub struct SqliteLocalStore<T> {
    db: Pool<Sqlite>,
    table: &'static str,
    insert_sql: String,
    update_by_local_sql: String,
    update_by_remote_sql: String,
    select_sql: String,
    _marker: PhantomData<fn() -> T>,
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: Vec<SqlValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Integer(i) => query.bind(i),
            SqlValue::Real(f) => query.bind(f),
        };
    }
    query
}

fn remote_id_param(remote_id: &str) -> Option<String> {
    if remote_id.is_empty() {
        None
    } else {
        Some(remote_id.to_string())
    }
}

impl<T: SyncEntity> SqliteLocalStore<T> {
    /// 创建新的本地缓存 DAO（表结构由 `schema::migrate_all` 负责）
    pub fn new(db: Pool<Sqlite>) -> Self {
        let table = T::KIND.table_name();
        let names: Vec<&str> = T::columns().iter().map(|c| c.name).collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        let assignments = names
            .iter()
            .map(|n| format!("{} = ?", n))
            .collect::<Vec<_>>()
            .join(", ");
        let upserts = names
            .iter()
            .map(|n| format!("{} = excluded.{}", n, n))
            .collect::<Vec<_>>()
            .join(", ");

        let insert_sql = format!(
            "INSERT INTO {table} ({cols}, remote_id, synced) VALUES ({placeholders}, ?, ?)
             ON CONFLICT(remote_id) DO UPDATE SET {upserts}, synced = excluded.synced
             RETURNING local_id",
            table = table,
            cols = names.join(", "),
            placeholders = placeholders,
            upserts = upserts,
        );
        let update_by_local_sql = format!(
            "UPDATE {} SET {}, remote_id = COALESCE(?, remote_id), synced = ? WHERE local_id = ?",
            table, assignments
        );
        let update_by_remote_sql = format!(
            "UPDATE {} SET {}, synced = ? WHERE remote_id = ?",
            table, assignments
        );
        let select_sql = format!(
            "SELECT local_id, remote_id, synced, created_at, {} FROM {}",
            names.join(", "),
            table
        );

        Self {
            db,
            table,
            insert_sql,
            update_by_local_sql,
            update_by_remote_sql,
            select_sql,
            _marker: PhantomData,
        }
    }

    fn record_from_row(row: &SqliteRow) -> Result<Record<T>> {
        let remote_id: Option<String> = row.try_get("remote_id")?;
        let synced: i64 = row.try_get("synced")?;
        Ok(Record {
            local_id: row.try_get("local_id")?,
            remote_id: remote_id.unwrap_or_default(),
            synced: synced != 0,
            created_at: row.try_get("created_at")?,
            payload: T::from_row(row)?,
        })
    }
}

#[async_trait]
impl<T: SyncEntity> LocalStore<T> for SqliteLocalStore<T> {
    async fn insert(&self, record: &Record<T>) -> Result<i64> {
        let values = record.payload.to_values()?;
        let row = bind_values(sqlx::query(&self.insert_sql), values)
            .bind(remote_id_param(&record.remote_id))
            .bind(record.synced)
            .fetch_one(&self.db)
            .await
            .with_context(|| format!("插入 {} 记录失败", self.table))?;
        let local_id: i64 = row.try_get("local_id")?;
        debug!(
            "[LocalStore/{}] 插入记录 local_id={}, remote_id={:?}, synced={}",
            self.table, local_id, record.remote_id, record.synced
        );
        Ok(local_id)
    }

    async fn update(&self, record: &Record<T>) -> Result<u64> {
        let values = record.payload.to_values()?;
        let result = if record.local_id > 0 {
            bind_values(sqlx::query(&self.update_by_local_sql), values)
                .bind(remote_id_param(&record.remote_id))
                .bind(record.synced)
                .bind(record.local_id)
                .execute(&self.db)
                .await
        } else if record.has_remote_id() {
            bind_values(sqlx::query(&self.update_by_remote_sql), values)
                .bind(record.synced)
                .bind(&record.remote_id)
                .execute(&self.db)
                .await
        } else {
            debug!(
                "[LocalStore/{}] 更新记录缺少 local_id 与 remote_id，忽略",
                self.table
            );
            return Ok(0);
        };
        let affected = result
            .with_context(|| format!("更新 {} 记录失败", self.table))?
            .rows_affected();
        Ok(affected)
    }

    async fn get_by_local_id(&self, local_id: i64) -> Result<Option<Record<T>>> {
        let sql = format!("{} WHERE local_id = ?", self.select_sql);
        let row = sqlx::query(&sql)
            .bind(local_id)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("按 local_id 查询 {} 失败", self.table))?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<Record<T>>> {
        if remote_id.is_empty() {
            return Ok(None);
        }
        let sql = format!("{} WHERE remote_id = ?", self.select_sql);
        let row = sqlx::query(&sql)
            .bind(remote_id)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("按 remote_id 查询 {} 失败", self.table))?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Record<T>>> {
        let sql = format!("{} ORDER BY local_id", self.select_sql);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("查询 {} 列表失败", self.table))?;
        let records = rows
            .iter()
            .map(Self::record_from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "[LocalStore/{}] 获取本地记录，共 {} 条",
            self.table,
            records.len()
        );
        Ok(records)
    }

    async fn delete(&self, local_id: i64) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE local_id = ?", self.table);
        let result = sqlx::query(&sql)
            .bind(local_id)
            .execute(&self.db)
            .await
            .with_context(|| format!("删除 {} 记录失败", self.table))?;
        Ok(result.rows_affected())
    }

    async fn mark_synced(&self, local_id: i64, remote_id: &str) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET remote_id = ?, synced = 1 WHERE local_id = ?",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(remote_id_param(remote_id))
            .bind(local_id)
            .execute(&self.db)
            .await
            .with_context(|| format!("标记 {} 已同步失败", self.table))?;
        Ok(result.rows_affected())
    }

    async fn add_tombstone(&self, remote_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_tombstones (table_name, remote_id, deleted_at)
            VALUES (?, ?, ?)
            ON CONFLICT(table_name, remote_id) DO UPDATE SET
                deleted_at = excluded.deleted_at
            "#,
        )
        .bind(self.table)
        .bind(remote_id)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.db)
        .await
        .context("写入删除墓碑失败")?;
        Ok(())
    }

    async fn tombstones(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT remote_id FROM local_tombstones WHERE table_name = ? ORDER BY deleted_at",
        )
        .bind(self.table)
        .fetch_all(&self.db)
        .await
        .context("查询删除墓碑失败")?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("remote_id").map_err(anyhow::Error::from))
            .collect()
    }

    async fn remove_tombstone(&self, remote_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_tombstones WHERE table_name = ? AND remote_id = ?")
            .bind(self.table)
            .bind(remote_id)
            .execute(&self.db)
            .await
            .context("删除墓碑失败")?;
        Ok(())
    }
}
