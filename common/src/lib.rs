//! Text2SQL 服务公共模块
//!
//! 提供配置加载、统一错误类型、响应封装、中间件、共享模型以及 SQL 语句分类。

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
