// 上传进度输出

use crate::uploader::task::UploadKind;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// 进度回调，每个分片上传成功后调用一次
pub trait ProgressReporter: Send + Sync {
    /// 开始传输
    fn start(&self, _kind: UploadKind, _total_size: u64) {}

    /// 一个分片上传完成
    fn chunk_uploaded(&self, index: u64, size: u64);

    /// 开始打包资源包
    fn archiving(&self) {}

    /// 传输结束（所有分片成功），接下来关闭远程实体
    fn finish(&self, _kind: UploadKind) {}
}

/// 控制台进度：每个分片打印一个 `=`
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    chunks: AtomicU64,
    bytes: AtomicU64,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for ConsoleProgress {
    fn start(&self, kind: UploadKind, _total_size: u64) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, ">> Uploading {} |", kind.label());
        let _ = out.flush();
    }

    fn chunk_uploaded(&self, _index: u64, size: u64) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);

        let mut out = std::io::stdout().lock();
        let _ = write!(out, "=");
        let _ = out.flush();
    }

    fn archiving(&self) {
        println!(">> Archiving asset...");
    }

    fn finish(&self, kind: UploadKind) {
        println!(">| Uploaded 100%");
        println!(">> Finalizing {}...", kind.label());
    }
}

/// 不输出任何内容
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn chunk_uploaded(&self, _index: u64, _size: u64) {}
}
