// 分片大小与并发度策略
//
// 纯函数：不做任何网络请求，所有边界通过 PolicyLimits 显式传入

use thiserror::Error;

/// 默认分片大小 64 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 1 << 26;
/// 最小分片大小 5 MiB
pub const MIN_CHUNK_SIZE: u64 = 5 << 20;
/// 最大分片大小 4 GiB
pub const MAX_CHUNK_SIZE: u64 = 1 << 32;
/// 默认上传线程数
pub const DEFAULT_WORKERS: usize = 10;
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 100;
/// 单个文件/资源包的最大大小 5 TiB
pub const MAX_FILE_SIZE: u64 = 5 << 40;

/// 策略边界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyLimits {
    pub min_chunk_size: u64,
    pub max_chunk_size: u64,
    pub min_workers: usize,
    pub max_workers: usize,
    pub max_file_size: u64,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            min_chunk_size: MIN_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            min_workers: MIN_WORKERS,
            max_workers: MAX_WORKERS,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

/// 策略校验错误（输入错误，不会发出任何请求）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("分片大小 {value} 超出范围，允许 [{min}, {max}] 字节")]
    ChunkSizeOutOfRange { value: u64, min: u64, max: u64 },

    #[error("上传线程数 {value} 超出范围，允许 [{min}, {max}]")]
    WorkerCountOutOfRange { value: usize, min: usize, max: usize },

    #[error("大小 {size} 字节超过上限 {max} 字节")]
    FileTooLarge { size: u64, max: u64 },
}

/// 最终生效的上传参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub chunk_size: u64,
    pub worker_count: usize,
}

impl EffectivePolicy {
    /// 校验请求参数并推导实际的线程数
    ///
    /// # 参数
    /// * `chunk_size` - 请求的分片大小
    /// * `requested_workers` - 请求的线程数
    /// * `total_size` - 上传内容的总大小
    /// * `limits` - 策略边界
    ///
    /// # 返回
    /// 线程数不超过分片数，且至少为 1（空文件也有一个分片）
    pub fn resolve(
        chunk_size: u64,
        requested_workers: usize,
        total_size: u64,
        limits: &PolicyLimits,
    ) -> Result<Self, PolicyError> {
        check_total_size(total_size, limits)?;

        if chunk_size < limits.min_chunk_size || chunk_size > limits.max_chunk_size {
            return Err(PolicyError::ChunkSizeOutOfRange {
                value: chunk_size,
                min: limits.min_chunk_size,
                max: limits.max_chunk_size,
            });
        }

        if requested_workers < limits.min_workers || requested_workers > limits.max_workers {
            return Err(PolicyError::WorkerCountOutOfRange {
                value: requested_workers,
                min: limits.min_workers,
                max: limits.max_workers,
            });
        }

        let worker_count = requested_workers
            .min(usize::try_from(chunk_count(total_size, chunk_size)).unwrap_or(usize::MAX))
            .max(1);

        Ok(Self {
            chunk_size,
            worker_count,
        })
    }

    /// 预计分片数
    pub fn chunk_count(&self, total_size: u64) -> u64 {
        chunk_count(total_size, self.chunk_size)
    }
}

/// 只校验总大小（在任何网络请求之前调用）
pub fn check_total_size(total_size: u64, limits: &PolicyLimits) -> Result<(), PolicyError> {
    if total_size > limits.max_file_size {
        return Err(PolicyError::FileTooLarge {
            size: total_size,
            max: limits.max_file_size,
        });
    }
    Ok(())
}

/// ceil(size / chunk)，空内容记为 1 个分片
fn chunk_count(total_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 1;
    }
    total_size.div_ceil(chunk_size).max(1)
}
