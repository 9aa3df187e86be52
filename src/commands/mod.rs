// 命令行定义与命令分发

pub mod api_route;
pub mod upload;

use crate::api::{PfdaClient, RetryPolicy};
use crate::config::{AppConfig, Credentials};
use crate::uploader::UploadEngine;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

/// precisionFDA 文件与资源包上传工具
#[derive(Debug, Parser)]
#[command(name = "pfda")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Authorization key. Required if a saved key does not exist.
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Server to connect and make requests to
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Size of each upload chunk in bytes (min 5 MiB, max 4 GiB)
    #[arg(long, global = true)]
    pub chunksize: Option<u64>,

    /// Maximum number of upload threads (max 100)
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub skipverify: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a single file
    UploadFile {
        /// Path to the file
        #[arg(long)]
        file: PathBuf,
    },

    /// Archive a folder and upload it as an app asset
    UploadAsset {
        /// Asset name, must end with '.tar' or '.tar.gz'
        #[arg(long)]
        name: String,

        /// Root folder of the asset
        #[arg(long)]
        root: PathBuf,

        /// Readme file, used as the asset description
        #[arg(long)]
        readme: PathBuf,
    },

    /// Call an API route with an optional JSON payload
    Api {
        /// Name of the API route
        #[arg(long)]
        route: String,

        /// JSON payload
        #[arg(long)]
        json: Option<String>,

        /// Write the response to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// 配置文件路径
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(AppConfig::default_path)
    }

    /// 命令行参数覆盖配置文件中的值
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(server) = &self.server {
            config.service.server = server.clone();
        }
        if self.skipverify {
            config.service.skip_verify = true;
        }
        if let Some(chunk_size) = self.chunksize {
            config.upload.chunk_size = chunk_size;
        }
        if let Some(threads) = self.threads {
            config.upload.threads = threads;
        }
    }
}

/// 确定授权密钥：命令行优先，其次是凭证文件
pub async fn resolve_key(cli_key: Option<&str>, credentials_path: &Path) -> Result<String> {
    if let Some(key) = cli_key.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    match Credentials::load(credentials_path).await? {
        Some(credentials) if !credentials.key.trim().is_empty() => Ok(credentials.key),
        _ => bail!(
            "未提供授权密钥，且凭证文件 '{}' 不存在。请通过 --key <KEY> 提供",
            credentials_path.display()
        ),
    }
}

/// 执行命令
///
/// # 参数
/// * `cli` - 命令行参数
/// * `config` - 已合并命令行覆盖的配置
/// * `credentials_path` - 凭证文件路径
pub async fn run(cli: Cli, config: AppConfig, credentials_path: &Path) -> Result<()> {
    let auth_key = resolve_key(cli.key.as_deref(), credentials_path).await?;

    let client = PfdaClient::new(&config.service, auth_key.clone(), RetryPolicy::from(&config.retry))
        .context("创建服务客户端失败")?;

    match &cli.command {
        Command::UploadFile { file } => {
            let engine = UploadEngine::new(client, config.upload.clone());
            upload::upload_file(&engine, file).await?;
        }
        Command::UploadAsset { name, root, readme } => {
            let engine = UploadEngine::new(client, config.upload.clone());
            upload::upload_asset(&engine, name, root, readme).await?;
        }
        Command::Api {
            route,
            json,
            output,
        } => {
            api_route::call_route(&client, route, json.as_deref(), output.as_deref()).await?;
        }
    }

    // 命令成功后才保存命令行提供的密钥
    if cli.key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
        Credentials::new(auth_key).save(credentials_path).await?;
        info!("授权密钥已保存: {:?}", credentials_path);
        println!(
            "Saved authorization key in config file '{}'.",
            credentials_path.display()
        );
    }

    Ok(())
}
