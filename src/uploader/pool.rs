// 分片上传线程池
//
// - N 个 worker 共享同一个有界队列的接收端，直到队列关闭且取空
// - 每个分片：计算 MD5 → 获取上传地址 → PUT 数据
// - 重试只发生在 HTTP 层，这里不再额外重试
// - 任一分片失败立即中止其余 worker 并返回该错误

use crate::api::PfdaClient;
use crate::uploader::chunk::Chunk;
use crate::uploader::error::UploadError;
use crate::uploader::progress::ProgressReporter;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// 线程池统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub chunks: u64,
    pub bytes: u64,
}

impl std::ops::AddAssign for PoolStats {
    fn add_assign(&mut self, other: Self) {
        self.chunks += other.chunks;
        self.bytes += other.bytes;
    }
}

/// 分片上传器
#[derive(Clone)]
pub struct ChunkUploader {
    client: PfdaClient,
    progress: Arc<dyn ProgressReporter>,
}

impl ChunkUploader {
    pub fn new(client: PfdaClient, progress: Arc<dyn ProgressReporter>) -> Self {
        Self { client, progress }
    }

    /// 上传单个分片
    ///
    /// # 返回
    /// 分片字节数
    pub async fn upload_chunk(&self, entity_id: &str, chunk: Chunk) -> Result<u64, UploadError> {
        let descriptor = chunk.descriptor(entity_id);
        debug!(
            "[分片#{}] 开始上传: size={}, md5={}",
            descriptor.index, descriptor.size, descriptor.md5
        );

        let destination = self.client.get_upload_url(&descriptor).await?;
        self.client.put_chunk(&destination, chunk.data).await?;

        self.progress.chunk_uploaded(descriptor.index, descriptor.size);
        debug!("[分片#{}] 上传完成", descriptor.index);
        Ok(descriptor.size)
    }

    /// 启动 worker 并等待队列取空
    ///
    /// # 参数
    /// * `worker_count` - worker 数量（已由策略限制）
    /// * `receiver` - 分片队列接收端
    /// * `entity_id` - 远程实体 ID
    pub async fn run_pool(
        self,
        worker_count: usize,
        receiver: mpsc::Receiver<Chunk>,
        entity_id: String,
    ) -> Result<PoolStats, UploadError> {
        let worker_count = worker_count.max(1);
        let receiver = Arc::new(Mutex::new(receiver));
        let entity_id: Arc<str> = Arc::from(entity_id);

        info!("[上传线程池] 启动 {} 个 worker: id={}", worker_count, entity_id);

        let mut join_set: JoinSet<Result<PoolStats, UploadError>> = JoinSet::new();
        for worker_id in 0..worker_count {
            let uploader = self.clone();
            let receiver = receiver.clone();
            let entity_id = entity_id.clone();

            join_set.spawn(async move {
                let mut stats = PoolStats::default();
                loop {
                    // 同一时刻只有一个 worker 等待队列
                    let next = { receiver.lock().await.recv().await };
                    let Some(chunk) = next else {
                        break;
                    };

                    let size = uploader.upload_chunk(&entity_id, chunk).await?;
                    stats.chunks += 1;
                    stats.bytes += size;
                }
                debug!("[worker#{}] 队列已取空，退出: {} 个分片", worker_id, stats.chunks);
                Ok(stats)
            });
        }
        drop(receiver);

        let mut total = PoolStats::default();
        while let Some(result) = join_set.join_next().await {
            let failure = match result {
                Ok(Ok(stats)) => {
                    total += stats;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => UploadError::Worker(e.to_string()),
            };

            error!("[上传线程池] 分片上传失败，中止所有 worker: {}", failure);
            // 等待所有 worker 退出，队列接收端随之释放
            join_set.shutdown().await;
            return Err(failure);
        }

        info!(
            "[上传线程池] 全部完成: {} 个分片, {} bytes",
            total.chunks, total.bytes
        );
        Ok(total)
    }
}
