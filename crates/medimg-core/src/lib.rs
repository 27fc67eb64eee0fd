//! # MedImg Core
//!
//! 影像诊断后台的核心模块，提供基础数据结构、错误定义、存储接口、配置和通用工具。

pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod utils;

pub use config::AppConfig;
pub use error::{MedError, Result};
pub use models::*;
pub use repository::Repository;
