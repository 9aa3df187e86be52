// 分片上传模块
//
// - 生产者把数据源切分为定长分片，写入有界队列
// - 固定数量的 worker 从队列取分片并发上传
// - create → 上传分片 → close 两阶段提交

pub mod archive;
pub mod chunk;
pub mod engine;
pub mod error;
pub mod folder;
pub mod policy;
pub mod pool;
pub mod progress;
pub mod task;

pub use archive::Archiver;
pub use chunk::{Chunk, ChunkProducer, ProducerStats};
pub use engine::UploadEngine;
pub use error::UploadError;
pub use folder::{scan_folder, FolderScan, ScannedFile};
pub use policy::{
    EffectivePolicy, PolicyError, PolicyLimits, DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS,
    MAX_CHUNK_SIZE, MAX_FILE_SIZE, MAX_WORKERS, MIN_CHUNK_SIZE, MIN_WORKERS,
};
pub use pool::{ChunkUploader, PoolStats};
pub use progress::{ConsoleProgress, ProgressReporter, SilentProgress};
pub use task::{UploadKind, UploadOutcome, UploadState, UploadTarget, UploadTask};
