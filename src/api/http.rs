// 带重试的 HTTP 客户端
//
// 所有远程调用都经过这里：
// - 网络错误、超时、429、5xx（501 除外）按指数退避重试
// - 429/503 携带 Retry-After 时按服务端要求等待（不超过最大等待）
// - 重试耗尽或最终状态非 2xx 时返回终止性错误，由上层直接中止上传
//
// Client 内部是共享连接池，clone 后可在多个上传任务间并发使用。
// Client 本身只设连接超时；整体超时按请求指定，分片 PUT 不设整体超时

use crate::api::error::{ApiError, ApiErrorKind};
use crate::config::{RetryConfig, ServiceConfig};
use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::{debug, error, warn};

/// 建立连接的超时
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最小等待
    pub min_wait: Duration,
    /// 最大等待
    pub max_wait: Duration,
    /// 最大重试次数（不含首次请求）
    pub max_retries: u32,
    /// 哪些错误类型需要重试
    pub retry_if: fn(ApiErrorKind) -> bool,
}

/// 默认重试判定：网络错误、超时、429、5xx（501 除外）
pub fn default_retry_if(kind: ApiErrorKind) -> bool {
    kind.is_retriable()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            min_wait: Duration::from_millis(config.min_wait_ms),
            max_wait: Duration::from_millis(config.max_wait_ms.max(config.min_wait_ms)),
            max_retries: config.max_retries,
            retry_if: default_retry_if,
        }
    }
}

impl RetryPolicy {
    /// 计算第 `retry` 次重试前的退避延迟
    ///
    /// # 延迟序列（默认配置）
    /// - retry=0: 1s
    /// - retry=1: 2s
    /// - retry=2: 4s
    /// - 最大: 30s
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.min_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }

    /// 是否还能针对该错误类型重试
    fn should_retry(&self, kind: ApiErrorKind, retry: u32) -> bool {
        (self.retry_if)(kind) && retry < self.max_retries
    }

    /// 结合 Retry-After 的实际等待时间
    fn wait_for(&self, retry: u32, status: Option<StatusCode>, retry_after: Option<Duration>) -> Duration {
        match (status, retry_after) {
            (Some(StatusCode::TOO_MANY_REQUESTS), Some(wait))
            | (Some(StatusCode::SERVICE_UNAVAILABLE), Some(wait)) => wait.min(self.max_wait),
            _ => self.backoff(retry),
        }
    }
}

/// HTTP 响应
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// 带重试的 HTTP 客户端
#[derive(Debug, Clone)]
pub struct RetryingHttpClient {
    client: Client,
    policy: RetryPolicy,
    request_timeout: Duration,
}

impl RetryingHttpClient {
    /// 根据服务配置创建客户端
    pub fn new(service: &ServiceConfig, policy: RetryPolicy) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(service.user_agent.clone())
            .connect_timeout(CONNECT_TIMEOUT);

        if service.skip_verify {
            warn!("已关闭 TLS 证书校验: {}", service.base_url());
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("创建 HTTP 客户端失败")?;

        Ok(Self {
            client,
            policy,
            request_timeout: service.timeout(),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 服务接口请求的整体超时
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// 发送请求（带重试）
    ///
    /// # 参数
    /// * `timeout` - 单次尝试的整体超时（含发送请求体）；`None` 表示只受连接超时约束
    ///
    /// 成功时返回 2xx 响应；其余情况返回终止性错误
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, ApiError> {
        let mut retry = 0u32;

        loop {
            let attempts = retry + 1;
            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(headers.clone())
                .body(body.clone());
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            let result = request.send().await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        match response.bytes().await {
                            Ok(body) => {
                                debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());
                                return Ok(HttpResponse { status, body });
                            }
                            Err(e) => {
                                // 响应体读取中断，按网络错误处理
                                if self.policy.should_retry(ApiErrorKind::Network, retry) {
                                    let wait = self.policy.backoff(retry);
                                    warn!(
                                        "{} {} 读取响应失败，{}ms 后重试 ({}/{}): {}",
                                        method,
                                        url,
                                        wait.as_millis(),
                                        retry + 1,
                                        self.policy.max_retries,
                                        e
                                    );
                                    tokio::time::sleep(wait).await;
                                    retry += 1;
                                    continue;
                                }
                                return Err(self.transport_error(&method, url, attempts, e));
                            }
                        }
                    }

                    let kind = ApiErrorKind::from_status(status);
                    if self.policy.should_retry(kind, retry) {
                        let retry_after = parse_retry_after(response.headers());
                        let wait = self.policy.wait_for(retry, Some(status), retry_after);
                        warn!(
                            "{} {} 返回 {}，{}ms 后重试 ({}/{})",
                            method,
                            url,
                            status,
                            wait.as_millis(),
                            retry + 1,
                            self.policy.max_retries
                        );
                        tokio::time::sleep(wait).await;
                        retry += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    error!(
                        "{} {} 失败: status={}, attempts={}, body={}",
                        method, url, status, attempts, body
                    );
                    return Err(ApiError::Status {
                        method: method.to_string(),
                        url: url.to_string(),
                        status,
                        attempts,
                        body,
                    });
                }
                Err(e) => {
                    let kind = ApiErrorKind::from_transport(&e);
                    if kind == ApiErrorKind::BadRequest && e.is_builder() {
                        return Err(ApiError::InvalidRequest {
                            method: method.to_string(),
                            url: url.to_string(),
                            message: e.to_string(),
                        });
                    }

                    if self.policy.should_retry(kind, retry) {
                        let wait = self.policy.backoff(retry);
                        warn!(
                            "{} {} 请求失败（{:?}），{}ms 后重试 ({}/{}): {}",
                            method,
                            url,
                            kind,
                            wait.as_millis(),
                            retry + 1,
                            self.policy.max_retries,
                            e
                        );
                        tokio::time::sleep(wait).await;
                        retry += 1;
                        continue;
                    }

                    return Err(self.transport_error(&method, url, attempts, e));
                }
            }
        }
    }

    fn transport_error(&self, method: &Method, url: &str, attempts: u32, e: reqwest::Error) -> ApiError {
        let kind = ApiErrorKind::from_transport(&e);
        error!(
            "{} {} 失败: kind={:?}, attempts={}, error={}",
            method, url, kind, attempts, e
        );
        ApiError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            attempts,
            kind,
            source: e,
        }
    }
}

/// 解析 Retry-After（仅支持秒数形式）
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
