//! 同步错误分类
//!
//! DAO 与 HTTP 层内部统一使用 `anyhow::Result`，
//! 这里的 `SyncError` 只用于对外汇报同步结果与迁移结果。

use crate::gym::sync::models::EntityKind;
use thiserror::Error;

/// 同步过程中对外暴露的错误
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// 网络不可用或远端调用失败（可恢复：读走本地缓存，写留待下次同步）
    #[error("远端不可用: {0}")]
    RemoteUnavailable(String),

    /// 请求的键在存储中不存在
    #[error("记录不存在: {0}")]
    NotFound(String),

    /// 表结构迁移失败（已尝试备份重建）
    #[error("表 {table} 结构迁移失败: {reason}")]
    SchemaMigration { table: String, reason: String },

    /// 某个实体类型的同步在中途失败，已应用的变更保留
    #[error("{kind} 同步中断（已拉取 {pulled}，已推送 {pushed}）: {reason}")]
    PartialSync {
        kind: EntityKind,
        pulled: usize,
        pushed: usize,
        reason: String,
    },

    /// 本地缓存错误（约束冲突等，属于程序或结构问题）
    #[error("本地缓存错误: {0}")]
    LocalCache(String),
}

impl SyncError {
    /// 是否为可通过本地缓存兜底的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteUnavailable(_) | SyncError::PartialSync { .. }
        )
    }

    /// anyhow 错误链中是否携带 `SyncError::NotFound`
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<SyncError>(), Some(SyncError::NotFound(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(SyncError::RemoteUnavailable("timeout".into()).is_transient());
        assert!(SyncError::PartialSync {
            kind: EntityKind::Class,
            pulled: 1,
            pushed: 0,
            reason: "boom".into(),
        }
        .is_transient());
        assert!(!SyncError::LocalCache("constraint".into()).is_transient());
        assert!(!SyncError::SchemaMigration {
            table: "local_users".into(),
            reason: "rename".into(),
        }
        .is_transient());
    }

    #[test]
    fn test_not_found_survives_anyhow_context() {
        use anyhow::Context;

        let err: anyhow::Error = SyncError::NotFound("x1".into()).into();
        assert!(SyncError::is_not_found(&err));
        let wrapped = Err::<(), _>(err).context("更新文档").unwrap_err();
        assert!(SyncError::is_not_found(&wrapped));
        assert!(!SyncError::is_not_found(&anyhow::anyhow!("服务器错误 500")));
    }
}
