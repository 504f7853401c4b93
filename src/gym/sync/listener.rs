//! 同步监听器回调接口

use crate::gym::sync::models::{EntityKind, SyncReport};
use async_trait::async_trait;

/// 同步监听器（由界面层实现，用于展示同步状态）
#[async_trait]
pub trait SyncListener: Send + Sync {
    /// 某实体类型开始同步
    async fn on_sync_start(&self, kind: EntityKind);

    /// 某实体类型同步完成
    async fn on_sync_finish(&self, report: &SyncReport);

    /// 某实体类型同步失败，界面应提示"同步失败，显示本地数据"
    async fn on_sync_failed(&self, kind: EntityKind, message: String);

    /// 拉取到新记录，参数为 JSON 数组字符串
    async fn on_records_changed(&self, kind: EntityKind, records_json: String);
}

/// 默认空实现（无操作）
pub struct EmptySyncListener;

#[async_trait]
impl SyncListener for EmptySyncListener {
    async fn on_sync_start(&self, _kind: EntityKind) {}
    async fn on_sync_finish(&self, _report: &SyncReport) {}
    async fn on_sync_failed(&self, _kind: EntityKind, _message: String) {}
    async fn on_records_changed(&self, _kind: EntityKind, _records_json: String) {}
}
