//! 查询生命周期管理

#[allow(clippy::module_inception)]
pub mod manager;
pub mod record;

pub use manager::QueryManager;
pub use record::{InvalidTransition, QueryRecord};
