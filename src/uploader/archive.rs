// 资源包打包
//
// 启动 `tar -c[z] -C <root> .`，标准输出直接作为上传数据源

use crate::uploader::error::UploadError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 打包程序
const TAR_PROGRAM: &str = "tar";

/// tar 命令参数
pub fn command_args(root: &Path, gzip: bool) -> Vec<OsString> {
    let mode = if gzip { "-cz" } else { "-c" };
    vec![
        OsString::from(mode),
        OsString::from("-C"),
        root.as_os_str().to_os_string(),
        OsString::from("."),
    ]
}

/// 运行中的打包进程
pub struct Archiver {
    root: PathBuf,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl Archiver {
    /// 启动打包进程
    ///
    /// 进程对象被丢弃时自动终止
    pub fn spawn(root: &Path, gzip: bool) -> Result<Self, UploadError> {
        let args = command_args(root, gzip);
        debug!("启动打包进程: {} {:?}", TAR_PROGRAM, args);

        let mut child = Command::new(TAR_PROGRAM)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| UploadError::Archive(format!("无法启动 {}: {}", TAR_PROGRAM, e)))?;

        let stdout = child.stdout.take();

        // 持续读取 stderr，避免管道写满阻塞 tar
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text).await;
                text
            })
        });

        info!("打包进程已启动: root={}, gzip={}", root.display(), gzip);

        Ok(Self {
            root: root.to_path_buf(),
            child,
            stdout,
            stderr,
        })
    }

    /// 取出标准输出（只能取一次）
    pub fn take_stdout(&mut self) -> Result<ChildStdout, UploadError> {
        self.stdout
            .take()
            .ok_or_else(|| UploadError::Archive("打包进程的标准输出不可用".to_string()))
    }

    /// 等待进程退出并检查退出状态
    pub async fn finish(mut self) -> Result<(), UploadError> {
        // 丢弃未读完的输出，避免进程阻塞在写管道上
        drop(self.stdout.take());

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| UploadError::Archive(format!("等待打包进程失败: {}", e)))?;

        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(UploadError::Archive(format!(
                "打包 {} 失败（{}）: {}",
                self.root.display(),
                status,
                stderr.trim()
            )));
        }

        debug!("打包进程正常退出: {}", self.root.display());
        Ok(())
    }
}
