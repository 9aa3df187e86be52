// 配置管理模块

pub mod credentials;

use crate::uploader::policy::{DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub use credentials::Credentials;

/// 默认服务器
pub const DEFAULT_SERVER: &str = "precision.fda.gov";

/// 默认 User-Agent
pub const DEFAULT_USER_AGENT: &str =
    "Asset and File Uploader/2.0 (precisionFDA) pfda-uploader (Rust)";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 远程服务配置
    #[serde(default)]
    pub service: ServiceConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 重试配置
    #[serde(default)]
    pub retry: RetryConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 远程服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// 服务器地址，不带协议时默认使用 https
    #[serde(default = "default_server")]
    pub server: String,
    /// 是否跳过 TLS 证书校验
    #[serde(default)]
    pub skip_verify: bool,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 请求使用的 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            skip_verify: false,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ServiceConfig {
    /// 服务根地址
    ///
    /// `precision.fda.gov` -> `https://precision.fda.gov`；
    /// 已带协议的地址原样使用（去掉末尾的 `/`）
    pub fn base_url(&self) -> String {
        let server = self.server.trim().trim_end_matches('/');
        if server.starts_with("https://") || server.starts_with("http://") {
            server.to_string()
        } else {
            format!("https://{}", server)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 上传配置（用户请求值，实际生效值由上传策略计算）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 分片大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// 最大上传线程数
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_threads() -> usize {
    DEFAULT_WORKERS
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            threads: default_threads(),
        }
    }
}

/// 重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 最小退避等待（毫秒）
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: u64,
    /// 最大退避等待（毫秒）
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// 最大重试次数（不含首次请求）
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_min_wait_ms() -> u64 {
    1000
}

fn default_max_wait_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: default_min_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否写入日志文件
    #[serde(default)]
    pub enabled: bool,
    /// 日志文件目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

// 进度标记输出到 stdout，默认只把告警写到 stderr
fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_max_file_size() -> u64 {
    20 * 1024 * 1024 // 20MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))?;

        tracing::debug!("已加载配置文件: {:?}", path);
        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
            }
        }

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;

        Ok(())
    }

    /// 加载配置，文件不存在或无效时使用默认配置
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(path).await {
            Ok(config) => config,
            Err(e) => {
                // 日志系统此时尚未初始化
                eprintln!("⚠️  配置文件无效，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }

    /// 默认配置文件路径：~/.config/pfda/config.toml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pfda")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.service.server, "precision.fda.gov");
        assert!(!config.service.skip_verify);
        assert_eq!(config.upload.chunk_size, 64 * 1024 * 1024);
        assert_eq!(config.upload.threads, 10);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.min_wait_ms, 1000);
        assert_eq!(config.retry.max_wait_ms, 30_000);
        assert!(!config.log.enabled);
    }

    #[test]
    fn test_base_url() {
        let mut service = ServiceConfig::default();
        assert_eq!(service.base_url(), "https://precision.fda.gov");

        service.server = "staging.example.org/".to_string();
        assert_eq!(service.base_url(), "https://staging.example.org");

        // 已带协议时原样使用（本地测试服务）
        service.server = "http://127.0.0.1:8080".to_string();
        assert_eq!(service.base_url(), "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.toml");

        let mut config = AppConfig::default();
        config.service.server = "example.org".to_string();
        config.upload.threads = 4;
        config.retry.max_retries = 2;

        config.save_to_file(&path).await.unwrap();
        let loaded = AppConfig::load_from_file(&path).await.unwrap();

        assert_eq!(loaded.service.server, "example.org");
        assert_eq!(loaded.upload.threads, 4);
        assert_eq!(loaded.retry.max_retries, 2);
        assert_eq!(loaded.upload.chunk_size, config.upload.chunk_size);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        tokio::fs::write(&path, "[upload]\nthreads = 3\n").await.unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.upload.threads, 3);
        assert_eq!(config.upload.chunk_size, 64 * 1024 * 1024);
        assert_eq!(config.service.server, "precision.fda.gov");
    }

    #[tokio::test]
    async fn test_load_or_default_on_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        tokio::fs::write(&path, "this is = = not toml").await.unwrap();

        let config = AppConfig::load_or_default(&path).await;
        assert_eq!(config.upload.threads, 10);

        let missing = AppConfig::load_or_default(temp_dir.path().join("missing.toml")).await;
        assert_eq!(missing.service.server, "precision.fda.gov");
    }
}
