//! 健身房数据 CLI
//!
//! 用于在命令行下检查本地缓存、手动触发同步、离线录入课程

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gym_sdk_core_rust::gym::schema::MigrationOutcome;
use gym_sdk_core_rust::{
    EntityKind, GymClass, GymClient, GymClientConfig, Record, SyncError, SyncListener,
    SyncReport,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 健身房数据 CLI
#[derive(Parser, Debug)]
#[command(name = "gym-cli")]
#[command(about = "健身房本地缓存 / 远端同步 CLI", long_about = None)]
struct Args {
    /// 本地数据库 URL（默认取 GYM_DB_URL 或 sqlite://gym.db?mode=rwc）
    #[arg(long, global = true)]
    db: Option<String>,

    /// 远端 API 地址（默认取 GYM_API_BASE_URL）
    #[arg(long, global = true)]
    api: Option<String>,

    /// 认证 token（默认取 GYM_TOKEN）
    #[arg(long, global = true)]
    token: Option<String>,

    /// 强制离线，只使用本地缓存
    #[arg(long, global = true)]
    offline: bool,

    /// 日志级别
    #[arg(long, global = true, default_value = "info,gym_sdk_core_rust=debug")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 依次同步课程、教练、用户
    Sync,
    /// 列出某类记录
    List {
        #[arg(value_enum)]
        kind: KindArg,
    },
    /// 新增课程（离线时仅写入本地，等待下次同步）
    AddClass {
        #[arg(long)]
        day: String,
        #[arg(long)]
        time: String,
        #[arg(long, default_value_t = 20)]
        capacity: i64,
        #[arg(long, default_value_t = 60)]
        duration: i64,
        #[arg(long, default_value_t = 0.0)]
        price: f64,
        #[arg(long = "type", default_value = "")]
        class_type: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        instructor: String,
    },
    /// 按本地 ID 删除课程
    DeleteClass { local_id: i64 },
    /// 检查并迁移本地表结构
    Migrate,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Class,
    Teacher,
    User,
}

/// 初始化日志（同时输出到 stderr 和文件，stdout 留给命令结果）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("gym-debug.log")
        .context("无法创建日志文件 gym-debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// 把同步事件打到日志
struct CliSyncListener;

#[async_trait::async_trait]
impl SyncListener for CliSyncListener {
    async fn on_sync_start(&self, kind: EntityKind) {
        info!("[CLI/Sync] 🔄 {} 同步开始", kind);
    }

    async fn on_sync_finish(&self, report: &SyncReport) {
        info!(
            "[CLI/Sync] ✅ 同步完成: 拉取 {}, 推送 {}",
            report.pulled, report.pushed
        );
    }

    async fn on_sync_failed(&self, kind: EntityKind, message: String) {
        error!("[CLI/Sync] ❌ {} 同步失败，显示本地数据: {}", kind, message);
    }

    async fn on_records_changed(&self, kind: EntityKind, records_json: String) {
        info!("[CLI/Sync] 🆕 {} 新记录: {}", kind, records_json);
    }
}

fn print_records<T: Serialize>(records: &[Record<T>]) -> Result<()> {
    for record in records {
        println!("{}", serde_json::to_string(record)?);
    }
    println!("共 {} 条", records.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let mut config = GymClientConfig::from_env();
    if let Some(db) = args.db {
        config.db_url = db;
    }
    if let Some(api) = args.api {
        config.api_base_url = api;
    }
    if let Some(token) = args.token {
        config.token = token;
    }
    config.offline = args.offline;

    let client = GymClient::connect_with_listener(config, Arc::new(CliSyncListener)).await?;
    let manager = client.manager();

    match args.command {
        Command::Sync => {
            let summary = manager.sync_all().await;
            for (kind, result) in &summary.results {
                match result {
                    Ok(report) if report.offline => println!("{}: 离线，未同步", kind),
                    Ok(report) => println!(
                        "{}: 拉取 {}, 推送 {}, 远端删除 {}",
                        kind, report.pulled, report.pushed, report.remote_deleted
                    ),
                    Err(e) if e.is_transient() => {
                        println!("{}: 失败（下次同步重试）- {}", kind, e)
                    }
                    Err(e) => println!("{}: 失败 - {}", kind, e),
                }
            }
        }
        Command::List { kind } => match kind {
            KindArg::Class => print_records(&manager.get_all_classes().await?)?,
            KindArg::Teacher => print_records(&manager.get_all_teachers().await?)?,
            KindArg::User => print_records(&manager.get_all_users().await?)?,
        },
        Command::AddClass {
            day,
            time,
            capacity,
            duration,
            price,
            class_type,
            description,
            instructor,
        } => {
            let record = manager
                .add_class(GymClass {
                    day_of_week: day,
                    time,
                    capacity,
                    duration,
                    price,
                    class_type,
                    description,
                    instructor_id: instructor,
                    created_time: chrono::Utc::now().timestamp_millis(),
                })
                .await?;
            println!("{}", serde_json::to_string(&record)?);
        }
        Command::DeleteClass { local_id } => {
            if manager.delete_class(local_id).await? {
                println!("已删除 local_id={}", local_id);
            } else {
                warn!(
                    "[CLI] {}",
                    SyncError::NotFound(format!("课程 local_id={}", local_id))
                );
            }
        }
        Command::Migrate => {
            for m in client.migrations() {
                match &m.outcome {
                    MigrationOutcome::Failed(e) => println!("{}: 失败 - {}", m.table, e),
                    outcome => println!("{}: {:?}", m.table, outcome),
                }
            }
        }
    }

    client.close().await;
    Ok(())
}
