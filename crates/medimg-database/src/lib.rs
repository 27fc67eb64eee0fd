//! # 数据库模块
//!
//! 负责患者、诊断、检查类型和用户资料的持久化，提供 PostgreSQL 实现和开发用的内存实现。

pub mod connection;
pub mod memory;
pub mod models;
pub mod queries;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use memory::MemoryRepository;
pub use queries::PgRepository;
