//! SQLite 数据库工具：统一创建连接池并执行本地表结构迁移

use crate::gym::schema::{migrate_all, MigrationOutcome, TableMigration};
use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::{info, warn};

/// 创建 SQLite 连接池并迁移所有本地缓存表
///
/// 单表迁移失败不会中断其他表，结果逐表返回。
pub async fn create_sqlite_pool_with_migration(
    db_url: &str,
) -> Result<(Pool<Sqlite>, Vec<TableMigration>)> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(|| format!("打开本地数据库失败: {}", db_url))?;

    let migrations = migrate_all(&pool).await?;
    for m in &migrations {
        match &m.outcome {
            MigrationOutcome::Failed(e) => warn!("[DB] ⚠️ 表 {} 迁移失败: {}", m.table, e),
            outcome => info!("[DB] 表 {} 迁移结果: {:?}", m.table, outcome),
        }
    }

    Ok((pool, migrations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_opens_and_migrates_every_table() {
        let (pool, migrations) = create_sqlite_pool_with_migration("sqlite::memory:")
            .await
            .unwrap();
        assert_eq!(migrations.len(), 3);
        assert!(migrations
            .iter()
            .all(|m| matches!(m.outcome, MigrationOutcome::Created)));
        pool.close().await;
    }
}
