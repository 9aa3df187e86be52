// 上传分片
//
// 分片规则：
// - 按顺序读取数据源，每个分片填满 chunk_size 后才发出
// - 最后一个分片可以更短
// - 空数据源恰好发出一个空分片（序号 1）
// - 序号从 1 开始连续递增

use crate::api::ChunkUploadDescriptor;
use crate::uploader::error::UploadError;
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

/// 上传分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 分片序号（从 1 开始）
    pub index: u64,
    /// 分片数据
    pub data: Bytes,
}

impl Chunk {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// 分片数据的 MD5（小写十六进制）
    pub fn checksum(&self) -> String {
        format!("{:x}", md5::compute(&self.data))
    }

    /// 构造 get_upload_url 请求体
    pub fn descriptor(&self, entity_id: &str) -> ChunkUploadDescriptor {
        ChunkUploadDescriptor {
            id: entity_id.to_string(),
            size: self.size(),
            index: self.index,
            md5: self.checksum(),
        }
    }
}

/// 生产者统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub chunks: u64,
    pub bytes: u64,
}

/// 分片生产者
///
/// 对数据源只读一遍，按顺序切分为定长分片
pub struct ChunkProducer<R> {
    reader: R,
    chunk_size: usize,
    next_index: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> ChunkProducer<R> {
    /// # 参数
    /// * `reader` - 数据源
    /// * `chunk_size` - 分片大小（已经过策略校验）
    pub fn new(reader: R, chunk_size: u64) -> Self {
        Self {
            reader,
            chunk_size: usize::try_from(chunk_size).unwrap_or(usize::MAX).max(1),
            next_index: 1,
            finished: false,
        }
    }

    /// 读取下一个分片
    ///
    /// # 返回
    /// 数据源读完后返回 `None`；读取错误（EOF 以外）原样返回
    pub async fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        if self.finished {
            return Ok(None);
        }

        let mut buffer = BytesMut::with_capacity(self.chunk_size);
        while buffer.len() < self.chunk_size {
            let remaining = (self.chunk_size - buffer.len()) as u64;
            let n = (&mut self.reader).take(remaining).read_buf(&mut buffer).await?;
            if n == 0 {
                self.finished = true;
                break;
            }
        }

        // 数据恰好是 chunk_size 的整数倍时，最后一次读取为空
        if buffer.is_empty() && self.next_index > 1 {
            self.finished = true;
            return Ok(None);
        }

        let chunk = Chunk {
            index: self.next_index,
            data: buffer.freeze(),
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }

    /// 把所有分片依次送入有界队列
    ///
    /// 队列满时挂起；返回时 `sender` 被丢弃，队列随之关闭
    pub async fn produce_into(mut self, sender: mpsc::Sender<Chunk>) -> Result<ProducerStats, UploadError> {
        let mut stats = ProducerStats::default();

        while let Some(chunk) = self.next_chunk().await.map_err(UploadError::Source)? {
            let size = chunk.size();
            let index = chunk.index;

            sender.send(chunk).await.map_err(|_| UploadError::QueueClosed)?;

            stats.chunks += 1;
            stats.bytes += size;
            debug!("分片 #{} 已入队: {} bytes", index, size);
        }

        Ok(stats)
    }
}
