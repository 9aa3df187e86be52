//! 资源包文件夹扫描
//!
//! 负责:
//! - 递归扫描资源包根目录
//! - 收集相对路径（create_asset 的 paths 字段）
//! - 累加打包前的文件大小

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// 扫描到的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// 本地路径
    pub local_path: PathBuf,
    /// 相对于根目录的路径
    pub relative_path: String,
    /// 大小（字节）
    pub size: u64,
}

/// 扫描结果
#[derive(Debug, Clone, Default)]
pub struct FolderScan {
    /// 按相对路径排序
    pub files: Vec<ScannedFile>,
    /// 打包前大小之和
    pub total_size: u64,
}

impl FolderScan {
    pub fn relative_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.relative_path.clone()).collect()
    }
}

/// 递归扫描文件夹
///
/// 目录本身不计入结果，其他条目（包括符号链接）都按自身大小计入，
/// 与 tar 打包时看到的条目一致
///
/// # 参数
/// - `root`: 资源包根目录
pub fn scan_folder<P: AsRef<Path>>(root: P) -> Result<FolderScan> {
    let root = root.as_ref();

    if !root.exists() {
        anyhow::bail!("扫描路径不存在: {}", root.display());
    }
    if !root.is_dir() {
        anyhow::bail!("扫描路径不是文件夹: {}", root.display());
    }

    info!("开始扫描文件夹: {}", root.display());

    let mut scan = FolderScan::default();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("遍历目录失败: {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        let metadata = entry
            .metadata()
            .with_context(|| format!("读取文件元数据失败: {}", entry.path().display()))?;

        let relative_path = entry
            .path()
            .strip_prefix(root)
            .with_context(|| {
                format!(
                    "计算相对路径失败: {} (root: {})",
                    entry.path().display(),
                    root.display()
                )
            })?
            .to_string_lossy()
            .into_owned();

        debug!("扫描到文件: {} ({})", relative_path, format_bytes(metadata.len()));

        scan.total_size += metadata.len();
        scan.files.push(ScannedFile {
            local_path: entry.path().to_path_buf(),
            relative_path,
            size: metadata.len(),
        });
    }

    scan.files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    info!(
        "文件夹扫描完成: {} 个文件，总大小 {}",
        scan.files.len(),
        format_bytes(scan.total_size)
    );

    Ok(scan)
}

/// 读取 readme 作为资源包描述
pub async fn read_readme(path: &Path) -> Result<String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("readme 文件不存在: {}", path.display()))?;
    if metadata.is_dir() {
        anyhow::bail!("readme 不能是文件夹: {}", path.display());
    }

    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("读取 readme 失败: {}", path.display()))
}

/// 格式化字节大小
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
