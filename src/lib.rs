// precisionFDA 分片上传客户端核心库

// 远程服务 API 模块
pub mod api;

// 命令行命令模块
pub mod commands;

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 分片上传模块
pub mod uploader;

#[cfg(test)]
mod testing;

// 导出常用类型
pub use api::{ApiError, PfdaClient, RetryPolicy};
pub use config::{AppConfig, Credentials};
pub use uploader::{UploadEngine, UploadError, UploadKind, UploadOutcome, UploadTarget};
