pub mod api;
pub mod dao;
pub mod listener;
pub mod manager;
pub mod models;
pub mod service;

pub use api::{HttpRemoteStore, RemoteStore};
pub use dao::{LocalStore, SqliteLocalStore};
pub use listener::{EmptySyncListener, SyncListener};
pub use manager::SyncManager;
pub use models::{EntityKind, Record, SyncEntity, SyncPhase, SyncReport, SyncSummary};
pub use service::EntitySyncer;
