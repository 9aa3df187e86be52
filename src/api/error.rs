// 远程服务调用错误

use reqwest::StatusCode;
use thiserror::Error;

/// 错误分类（决定是否重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 网络错误（可重试）
    Network,
    /// 超时（可重试）
    Timeout,
    /// 服务器错误（可重试）
    ServerError,
    /// 限流（可重试）
    RateLimited,
    /// 参数错误（不可重试）
    BadRequest,
    /// 认证失败（不可重试）
    Unauthorized,
    /// 权限不足（不可重试）
    Forbidden,
    /// 资源不存在（不可重试）
    NotFound,
    /// 证书错误（不可重试）
    Tls,
    /// 响应不符合协议（不可重试）
    Protocol,
    /// 未知错误
    Unknown,
}

impl ApiErrorKind {
    /// 是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ApiErrorKind::Network
                | ApiErrorKind::Timeout
                | ApiErrorKind::ServerError
                | ApiErrorKind::RateLimited
        )
    }

    /// 从 HTTP 状态码转换
    ///
    /// 501 Not Implemented 不会因为重试而改变，归为未知错误
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => ApiErrorKind::RateLimited,
            501 => ApiErrorKind::Unknown,
            500..=599 => ApiErrorKind::ServerError,
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            404 => ApiErrorKind::NotFound,
            400..=499 => ApiErrorKind::BadRequest,
            _ => ApiErrorKind::Unknown,
        }
    }

    /// 传输层错误分类
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return ApiErrorKind::Timeout;
        }
        if error.is_builder() || error.is_redirect() {
            return ApiErrorKind::BadRequest;
        }

        // 证书问题重试也不会恢复，rustls 的错误只能从错误链的文本判断
        let mut source: Option<&dyn std::error::Error> = Some(error);
        while let Some(e) = source {
            let text = e.to_string().to_lowercase();
            if text.contains("certificate") || text.contains("invalidcertificate") {
                return ApiErrorKind::Tls;
            }
            source = e.source();
        }

        if error.is_connect() || error.is_request() || error.is_body() {
            ApiErrorKind::Network
        } else {
            ApiErrorKind::Unknown
        }
    }
}

/// 远程服务调用的终止性错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 请求无法构建（不会发出）
    #[error("{method} 请求 '{url}' 构建失败: {message}")]
    InvalidRequest {
        method: String,
        url: String,
        message: String,
    },

    /// 网络层失败，重试耗尽或不可重试
    #[error("{method} 请求 '{url}' 失败（共尝试 {attempts} 次）: {source}")]
    Transport {
        method: String,
        url: String,
        attempts: u32,
        kind: ApiErrorKind,
        #[source]
        source: reqwest::Error,
    },

    /// 最终响应为非 2xx
    #[error(
        "{method} 请求 '{url}' 失败，状态码 {status}（共尝试 {attempts} 次）{}",
        status_hint(.status)
    )]
    Status {
        method: String,
        url: String,
        status: StatusCode,
        attempts: u32,
        body: String,
    },

    /// 响应内容违反协议（缺少字段、JSON 无法解析等）
    #[error("{method} 请求 '{url}' 的响应无效: {message}")]
    Protocol {
        method: String,
        url: String,
        message: String,
    },
}

fn status_hint(status: &StatusCode) -> &'static str {
    if status.is_client_error() {
        "。4xx 状态请检查提供的授权密钥是否仍然有效"
    } else {
        ""
    }
}

impl ApiError {
    /// 错误分类
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            ApiError::InvalidRequest { .. } => ApiErrorKind::BadRequest,
            ApiError::Transport { kind, .. } => *kind,
            ApiError::Status { status, .. } => ApiErrorKind::from_status(*status),
            ApiError::Protocol { .. } => ApiErrorKind::Protocol,
        }
    }

    /// 最终响应状态码（如果有）
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 出错的请求地址
    pub fn url(&self) -> &str {
        match self {
            ApiError::InvalidRequest { url, .. }
            | ApiError::Transport { url, .. }
            | ApiError::Status { url, .. }
            | ApiError::Protocol { url, .. } => url,
        }
    }

    pub(crate) fn protocol(method: &str, url: &str, message: impl Into<String>) -> Self {
        ApiError::Protocol {
            method: method.to_string(),
            url: url.to_string(),
            message: message.into(),
        }
    }
}
