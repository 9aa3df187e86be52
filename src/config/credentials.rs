// 授权密钥持久化
//
// 密钥保存在 ~/.pfda_config，JSON 格式：{"Key": "..."}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 凭证文件名
pub const CREDENTIALS_FILE_NAME: &str = ".pfda_config";

/// 保存的授权凭证
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "Key", alias = "key")]
    pub key: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// 默认凭证文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CREDENTIALS_FILE_NAME)
    }

    /// 读取凭证文件
    ///
    /// 文件不存在时返回 `Ok(None)`，其余读取或解析错误直接返回
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("读取凭证文件失败: {:?}", path));
            }
        };

        let credentials: Credentials = serde_json::from_slice(&content)
            .with_context(|| format!("解析凭证文件失败: {:?}", path))?;

        Ok(Some(credentials))
    }

    /// 写入凭证文件
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec(self).context("序列化凭证失败")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("写入凭证文件失败: {:?}", path))?;

        tracing::debug!("授权密钥已保存: {:?}", path);
        Ok(())
    }
}
