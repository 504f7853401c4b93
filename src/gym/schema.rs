//! 本地缓存表结构与版本迁移
//!
//! 每张实体表单独记录版本。版本落后时先尝试追加列；追加失败则退回到
//! "重命名旧表 → 建新表 → 逐行复制重叠列 → 删除旧表" 的重建流程。
//! 重建中的失败只记录日志，不阻止应用启动。

use crate::gym::entities::{GymClass, Teacher, User};
use crate::gym::error::SyncError;
use crate::gym::sync::models::{ColumnDef, SyncEntity};
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// 当前表结构版本：v1 为不含 remote_id / synced 的旧表
pub const SCHEMA_VERSION: i64 = 2;

/// created_at 默认值：当前时间（毫秒）
const CREATED_AT_DEFAULT: &str =
    "INTEGER NOT NULL DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER))";

/// 同步相关的固定列
const SYNC_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("remote_id", "TEXT"),
    ColumnDef::new("synced", "INTEGER NOT NULL DEFAULT 0"),
    ColumnDef::new("created_at", CREATED_AT_DEFAULT),
];

/// 单张表的迁移结果
#[derive(Debug, Clone)]
pub enum MigrationOutcome {
    /// 新建
    Created,
    /// 已是最新版本
    UpToDate,
    /// 追加列完成
    Migrated { added: Vec<String> },
    /// 走了重建流程，`failed` 为复制失败的行数
    Rebuilt { copied: usize, failed: usize },
    /// 重建本身失败，表保持当前状态
    Failed(SyncError),
}

#[derive(Debug, Clone)]
pub struct TableMigration {
    pub table: &'static str,
    pub outcome: MigrationOutcome,
}

/// 初始化辅助表并迁移全部实体表
pub async fn migrate_all(db: &Pool<Sqlite>) -> Result<Vec<TableMigration>> {
    info!("[Schema] 开始检查本地缓存表结构");
    init_support_tables(db).await?;

    let results = vec![
        migrate_entity::<GymClass>(db).await,
        migrate_entity::<Teacher>(db).await,
        migrate_entity::<User>(db).await,
    ];

    for r in &results {
        match &r.outcome {
            MigrationOutcome::Failed(e) => error!("[Schema] {} 迁移失败: {}", r.table, e),
            other => debug!("[Schema] {} -> {:?}", r.table, other),
        }
    }
    info!("[Schema] 表结构检查完成");
    Ok(results)
}

/// 版本表与删除墓碑表
async fn init_support_tables(db: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS local_schema_versions (
            table_name TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(db)
    .await
    .context("创建版本表失败")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS local_tombstones (
            table_name TEXT NOT NULL,
            remote_id TEXT NOT NULL,
            deleted_at INTEGER NOT NULL,
            PRIMARY KEY (table_name, remote_id)
        )
        "#,
    )
    .execute(db)
    .await
    .context("创建删除墓碑表失败")?;
    Ok(())
}

/// 迁移单个实体表，失败被转换为 `MigrationOutcome::Failed`
pub async fn migrate_entity<T: SyncEntity>(db: &Pool<Sqlite>) -> TableMigration {
    let table = T::KIND.table_name();
    let outcome = match migrate_table(db, table, T::columns()).await {
        Ok(outcome) => outcome,
        Err(e) => MigrationOutcome::Failed(SyncError::SchemaMigration {
            table: table.to_string(),
            reason: format!("{:#}", e),
        }),
    };
    TableMigration { table, outcome }
}

async fn migrate_table(
    db: &Pool<Sqlite>,
    table: &'static str,
    payload: &[ColumnDef],
) -> Result<MigrationOutcome> {
    if !table_exists(db, table).await? {
        create_table(db, table, payload).await?;
        save_version(db, table, SCHEMA_VERSION).await?;
        info!("[Schema] 新建表 {}", table);
        return Ok(MigrationOutcome::Created);
    }

    // 存在表但没有版本记录，视为 v1 旧表
    let version = load_version(db, table).await?.unwrap_or(1);
    if version >= SCHEMA_VERSION {
        create_index(db, table).await?;
        return Ok(MigrationOutcome::UpToDate);
    }

    info!(
        "[Schema] 表 {} 版本 {} 落后于 {}，尝试追加列",
        table, version, SCHEMA_VERSION
    );
    match add_missing_columns(db, table, payload).await {
        Ok(added) => {
            save_version(db, table, SCHEMA_VERSION).await?;
            info!("[Schema] 表 {} 追加列完成: {:?}", table, added);
            Ok(MigrationOutcome::Migrated { added })
        }
        Err(e) => {
            warn!(
                "[Schema] 表 {} 追加列失败（{:#}），改为备份重建",
                table, e
            );
            let (copied, failed) = rebuild_table(db, table, payload).await?;
            save_version(db, table, SCHEMA_VERSION).await?;
            Ok(MigrationOutcome::Rebuilt { copied, failed })
        }
    }
}

fn all_columns(payload: &[ColumnDef]) -> Vec<ColumnDef> {
    payload.iter().chain(SYNC_COLUMNS.iter()).copied().collect()
}

fn create_table_sql(table: &str, payload: &[ColumnDef]) -> String {
    let cols: Vec<String> = all_columns(payload)
        .iter()
        .map(|c| format!("{} {}", c.name, c.decl))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    local_id INTEGER PRIMARY KEY AUTOINCREMENT,\n    {}\n)",
        table,
        cols.join(",\n    ")
    )
}

async fn create_table(db: &Pool<Sqlite>, table: &str, payload: &[ColumnDef]) -> Result<()> {
    sqlx::query(&create_table_sql(table, payload))
        .execute(db)
        .await
        .with_context(|| format!("创建表 {} 失败", table))?;
    create_index(db, table).await
}

/// remote_id 唯一索引（NULL 不参与唯一性比较）
async fn create_index(db: &Pool<Sqlite>, table: &str) -> Result<()> {
    let sql = format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_{}_remote_id ON {}(remote_id)",
        table, table
    );
    sqlx::query(&sql)
        .execute(db)
        .await
        .with_context(|| format!("创建 {} remote_id 唯一索引失败", table))?;
    Ok(())
}

async fn add_missing_columns(
    db: &Pool<Sqlite>,
    table: &str,
    payload: &[ColumnDef],
) -> Result<Vec<String>> {
    let existing = table_columns(db, table).await?;
    if !existing.contains("local_id") {
        anyhow::bail!("缺少主键列 local_id，无法追加");
    }

    let mut added = Vec::new();
    for col in all_columns(payload) {
        if existing.contains(col.name) {
            continue;
        }
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col.name, col.decl);
        sqlx::query(&sql)
            .execute(db)
            .await
            .with_context(|| format!("追加列 {}.{} 失败", table, col.name))?;
        debug!("[Schema]   已追加列 {}.{}", table, col.name);
        added.push(col.name.to_string());
    }
    create_index(db, table).await?;
    Ok(added)
}

/// 备份重建：返回（复制成功行数，复制失败行数）
async fn rebuild_table(
    db: &Pool<Sqlite>,
    table: &str,
    payload: &[ColumnDef],
) -> Result<(usize, usize)> {
    let backup = format!(
        "{}_backup_{}",
        table,
        chrono::Utc::now().timestamp_millis()
    );

    sqlx::query(&format!("ALTER TABLE {} RENAME TO {}", table, backup))
        .execute(db)
        .await
        .with_context(|| format!("重命名 {} 为 {} 失败", table, backup))?;

    // 旧表上的同名索引跟随重命名，先删掉以免新表建索引时冲突
    sqlx::query(&format!("DROP INDEX IF EXISTS idx_{}_remote_id", table))
        .execute(db)
        .await
        .context("删除旧索引失败")?;

    create_table(db, table, payload).await?;

    let old_columns = table_columns(db, &backup).await?;
    let overlap: Vec<&str> = std::iter::once("local_id")
        .chain(all_columns(payload).iter().map(|c| c.name))
        .filter(|c| old_columns.contains(*c))
        .collect();
    if overlap.is_empty() {
        warn!(
            "[Schema] {} 与新结构没有重叠列，保留备份表 {}",
            table, backup
        );
        return Ok((0, 0));
    }
    let col_list = overlap.join(", ");

    let rowids: Vec<i64> = sqlx::query(&format!("SELECT rowid FROM {} ORDER BY rowid", backup))
        .fetch_all(db)
        .await
        .with_context(|| format!("读取备份表 {} 失败", backup))?
        .into_iter()
        .map(|r| r.try_get::<i64, _>(0))
        .collect::<std::result::Result<_, _>>()?;

    let copy_sql = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} WHERE rowid = ?",
        table, col_list, col_list, backup
    );
    let mut copied = 0;
    let mut failed = 0;
    for rowid in rowids {
        match sqlx::query(&copy_sql).bind(rowid).execute(db).await {
            Ok(_) => copied += 1,
            Err(e) => {
                warn!(
                    "[Schema]   复制 {} 第 {} 行失败: {}",
                    backup, rowid, e
                );
                failed += 1;
            }
        }
    }

    carry_sequence(db, table, &backup).await?;

    if failed == 0 {
        sqlx::query(&format!("DROP TABLE {}", backup))
            .execute(db)
            .await
            .with_context(|| format!("删除备份表 {} 失败", backup))?;
        info!("[Schema] 表 {} 重建完成，复制 {} 行", table, copied);
    } else {
        error!(
            "[Schema] 表 {} 重建完成但有 {} 行复制失败，备份保留在 {}",
            table, failed, backup
        );
    }
    Ok((copied, failed))
}

/// 把 AUTOINCREMENT 高水位从备份表带到新表，已删除的 local_id 不会再被分配
async fn carry_sequence(db: &Pool<Sqlite>, table: &str, backup: &str) -> Result<()> {
    let backup_seq: i64 = sqlx::query("SELECT seq FROM sqlite_sequence WHERE name = ?")
        .bind(backup)
        .fetch_optional(db)
        .await
        .context("读取备份表自增序列失败")?
        .map(|r| r.try_get::<i64, _>("seq"))
        .transpose()?
        .unwrap_or(0);
    let old_max: i64 = sqlx::query(&format!(
        "SELECT COALESCE(MAX(rowid), 0) AS m FROM {}",
        backup
    ))
    .fetch_one(db)
    .await
    .with_context(|| format!("读取 {} 最大行号失败", backup))?
    .try_get("m")?;
    let new_max: i64 = sqlx::query(&format!(
        "SELECT COALESCE(MAX(local_id), 0) AS m FROM {}",
        table
    ))
    .fetch_one(db)
    .await
    .with_context(|| format!("读取 {} 最大 local_id 失败", table))?
    .try_get("m")?;

    let high = backup_seq.max(old_max).max(new_max);
    if high == 0 {
        return Ok(());
    }
    sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
        .bind(table)
        .execute(db)
        .await
        .context("重置自增序列失败")?;
    sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)")
        .bind(table)
        .bind(high)
        .execute(db)
        .await
        .context("写入自增序列失败")?;
    debug!("[Schema]   表 {} 自增序列设为 {}", table, high);
    Ok(())
}

async fn table_exists(db: &Pool<Sqlite>, table: &str) -> Result<bool> {
    let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(table)
        .fetch_optional(db)
        .await
        .context("查询表是否存在失败")?;
    Ok(row.is_some())
}

async fn table_columns(db: &Pool<Sqlite>, table: &str) -> Result<HashSet<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info('{}')", table))
        .fetch_all(db)
        .await
        .with_context(|| format!("读取 {} 列信息失败", table))?;
    rows.iter()
        .map(|r| r.try_get::<String, _>("name").map_err(anyhow::Error::from))
        .collect()
}

async fn load_version(db: &Pool<Sqlite>, table: &str) -> Result<Option<i64>> {
    let row = sqlx::query("SELECT version FROM local_schema_versions WHERE table_name = ?")
        .bind(table)
        .fetch_optional(db)
        .await
        .context("查询表版本失败")?;
    row.map(|r| r.try_get::<i64, _>("version"))
        .transpose()
        .map_err(anyhow::Error::from)
}

async fn save_version(db: &Pool<Sqlite>, table: &str, version: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO local_schema_versions (table_name, version) VALUES (?, ?)
        ON CONFLICT(table_name) DO UPDATE SET version = excluded.version
        "#,
    )
    .bind(table)
    .bind(version)
    .execute(db)
    .await
    .context("保存表版本失败")?;
    Ok(())
}
