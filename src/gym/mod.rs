pub mod client;
pub mod db;
pub mod entities;
pub mod error;
pub mod network;
pub mod schema;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出常用类型
pub use client::{GymClient, GymClientConfig};
pub use entities::{Cart, CartItem, GymClass, Teacher, User};
pub use error::SyncError;
