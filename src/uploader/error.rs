// 上传错误

use crate::api::ApiError;
use crate::uploader::policy::PolicyError;
use thiserror::Error;

/// 上传流程的终止性错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 输入无效（在任何网络请求之前发现）
    #[error("输入无效: {0}")]
    Input(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// 读取数据源失败
    #[error("读取上传数据失败: {0}")]
    Source(#[source] std::io::Error),

    /// 打包进程失败
    #[error("打包失败: {0}")]
    Archive(String),

    /// 分片队列在生产者结束前被关闭（上传线程已退出）
    #[error("分片队列已关闭")]
    QueueClosed,

    /// 上传线程 panic 或被取消
    #[error("上传线程异常退出: {0}")]
    Worker(String),
}

impl UploadError {
    pub(crate) fn input(message: impl Into<String>) -> Self {
        UploadError::Input(message.into())
    }

    /// 是否为输入错误（不涉及网络）
    pub fn is_input_error(&self) -> bool {
        matches!(self, UploadError::Input(_) | UploadError::Policy(_))
    }
}
