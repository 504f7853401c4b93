pub mod gym;

// 重新导出常用类型和函数，方便外部使用
pub use gym::{
    client::{GymClient, GymClientConfig},
    entities::{Cart, CartItem, GymClass, Teacher, User},
    error::SyncError,
    network::{ConnectivityOracle, ManualConnectivity, TcpProbeConnectivity},
    sync::{EntityKind, Record, SyncListener, SyncManager, SyncReport, SyncSummary},
};
