// upload-file / upload-asset 命令

use crate::uploader::{UploadEngine, UploadKind, UploadOutcome};
use anyhow::{Context, Result};
use std::path::Path;

/// 上传单个文件
pub async fn upload_file(engine: &UploadEngine, path: &Path) -> Result<UploadOutcome> {
    let outcome = engine
        .upload_file(path)
        .await
        .with_context(|| format!("上传文件 '{}' 失败", path.display()))?;

    print_done(UploadKind::File, &outcome);
    Ok(outcome)
}

/// 打包并上传资源包
pub async fn upload_asset(engine: &UploadEngine, name: &str, root: &Path, readme: &Path) -> Result<UploadOutcome> {
    let outcome = engine
        .upload_asset(name, root, readme)
        .await
        .with_context(|| format!("上传资源包 '{}' ({}) 失败", name, root.display()))?;

    print_done(UploadKind::Asset, &outcome);
    Ok(outcome)
}

fn print_done(kind: UploadKind, outcome: &UploadOutcome) {
    println!(">> Done! Access your {} at {}", kind.label(), outcome.url);
}
