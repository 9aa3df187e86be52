// precisionFDA 服务客户端
//
// 对 RetryingHttpClient 的类型化封装，每个远程路由一个方法

use crate::api::error::ApiError;
use crate::api::http::{HttpResponse, RetryPolicy, RetryingHttpClient};
use crate::api::types::{ChunkUploadDescriptor, CreateEntityRequest, EntityId, UploadDestination};
use crate::config::ServiceConfig;
use crate::uploader::{UploadKind, UploadTarget};
use anyhow::Result;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, info};

/// 分片上传地址路由
const UPLOAD_URL_ROUTE: &str = "get_upload_url";

/// precisionFDA 服务客户端
#[derive(Debug, Clone)]
pub struct PfdaClient {
    http: RetryingHttpClient,
    base_url: String,
    auth_key: String,
}

impl PfdaClient {
    /// 创建客户端
    ///
    /// # 参数
    /// * `service` - 服务配置（地址、TLS、超时）
    /// * `auth_key` - 授权密钥
    /// * `policy` - 重试策略
    pub fn new(service: &ServiceConfig, auth_key: impl Into<String>, policy: RetryPolicy) -> Result<Self> {
        let http = RetryingHttpClient::new(service, policy)?;
        let base_url = service.base_url();

        info!("初始化服务客户端: {}", base_url);

        Ok(Self {
            http,
            base_url,
            auth_key: auth_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// API 路由地址
    pub fn api_url(&self, route: &str) -> String {
        format!("{}/api/{}", self.base_url, route)
    }

    /// 上传完成后的访问地址
    pub fn entity_url(&self, kind: UploadKind, entity_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.access_path(), entity_id)
    }

    /// 服务接口公共请求头
    fn service_headers(&self, url: &str) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Key {}", self.auth_key)).map_err(|_| {
            ApiError::InvalidRequest {
                method: Method::POST.to_string(),
                url: url.to_string(),
                message: "授权密钥包含非法字符".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// POST 原始 JSON 到 API 路由
    async fn post_raw(&self, route: &str, body: Bytes) -> Result<(String, HttpResponse), ApiError> {
        let url = self.api_url(route);
        let headers = self.service_headers(&url)?;
        let timeout = Some(self.http.request_timeout());
        let response = self
            .http
            .execute(Method::POST, &url, headers, body, timeout)
            .await?;
        Ok((url, response))
    }

    /// POST 结构体到 API 路由
    async fn post_json<T: Serialize>(&self, route: &str, payload: &T) -> Result<(String, HttpResponse), ApiError> {
        let body = serde_json::to_vec(payload).map_err(|e| ApiError::InvalidRequest {
            method: Method::POST.to_string(),
            url: self.api_url(route),
            message: format!("序列化请求体失败: {}", e),
        })?;
        self.post_raw(route, Bytes::from(body)).await
    }

    /// 创建远程实体（文件或资源包）
    ///
    /// # 返回
    /// 实体 ID；响应中缺少 ID 属于协议错误
    pub async fn create_entity(&self, kind: UploadKind, target: &UploadTarget) -> Result<String, ApiError> {
        let request = CreateEntityRequest {
            name: target.name(),
            description: target.description(),
            paths: target.paths(),
        };

        let (url, response) = self.post_json(kind.create_route(), &request).await?;

        let entity: EntityId = serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::protocol("POST", &url, format!("解析创建响应失败: {}", e)))?;

        match entity.id {
            Some(id) if !id.is_empty() => {
                info!("已创建远程{}: name={}, id={}", kind, target.name(), id);
                Ok(id)
            }
            _ => Err(ApiError::protocol("POST", &url, "响应中缺少 id")),
        }
    }

    /// 获取分片上传地址
    pub async fn get_upload_url(&self, descriptor: &ChunkUploadDescriptor) -> Result<UploadDestination, ApiError> {
        let (url, response) = self.post_json(UPLOAD_URL_ROUTE, descriptor).await?;

        let destination: UploadDestination = serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::protocol("POST", &url, format!("解析上传地址响应失败: {}", e)))?;

        if destination.url.is_empty() {
            return Err(ApiError::protocol("POST", &url, "响应中缺少 url"));
        }

        debug!(
            "[分片#{}] 上传地址: {} ({} 个头部)",
            descriptor.index,
            destination.url,
            destination.headers().count()
        );

        Ok(destination)
    }

    /// 按服务端指定的头部 PUT 分片数据
    ///
    /// 大分片在慢速链路上可能传输很久，只受连接超时约束
    pub async fn put_chunk(&self, destination: &UploadDestination, data: Bytes) -> Result<(), ApiError> {
        let mut headers = HeaderMap::new();
        for (name, value) in destination.headers() {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                ApiError::protocol("PUT", &destination.url, format!("非法的头部名称: {}", name))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                ApiError::protocol("PUT", &destination.url, format!("非法的头部值: {}", name))
            })?;
            headers.insert(header_name, header_value);
        }

        self.http
            .execute(Method::PUT, &destination.url, headers, data, None)
            .await?;
        Ok(())
    }

    /// 关闭（完成）远程实体
    pub async fn close_entity(&self, kind: UploadKind, entity_id: &str) -> Result<(), ApiError> {
        let payload = EntityId {
            id: Some(entity_id.to_string()),
        };
        self.post_json(kind.close_route(), &payload).await?;
        info!("已关闭远程{}: id={}", kind, entity_id);
        Ok(())
    }

    /// 调用任意 API 路由
    ///
    /// 路由名统一转为小写；`payload` 为空时发送空请求体
    pub async fn call_route(&self, route: &str, payload: &str) -> Result<Bytes, ApiError> {
        let route = route.trim().trim_start_matches('/').to_lowercase();
        let (_, response) = self
            .post_raw(&route, Bytes::copy_from_slice(payload.as_bytes()))
            .await?;
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiErrorKind;
    use crate::testing::{FakeBehavior, FakeService};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_create_entity_sends_auth_and_metadata() {
        let service = FakeService::start().await;
        let client = service.client();

        let target = UploadTarget::file("reads.fastq", 10).unwrap();
        let id = client.create_entity(UploadKind::File, &target).await.unwrap();
        assert_eq!(id, "file-1");

        let state = service.snapshot();
        assert_eq!(state.authorizations, vec!["Key test-key".to_string()]);
        assert_eq!(state.create_requests.len(), 1);
        let (route, body) = &state.create_requests[0];
        assert_eq!(route, "create_file");
        assert_eq!(body["name"], "reads.fastq");
        assert_eq!(body["description"], "");
        assert!(body.get("paths").is_none());
    }

    #[tokio::test]
    async fn test_create_entity_without_id_is_protocol_error() {
        let service = FakeService::start_with(FakeBehavior {
            omit_entity_id: true,
            ..Default::default()
        })
        .await;

        let target = UploadTarget::file("a.bin", 1).unwrap();
        let err = service
            .client()
            .create_entity(UploadKind::File, &target)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::Protocol);
        assert!(err.url().ends_with("/api/create_file"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let service = FakeService::start_with(FakeBehavior {
            create_status: Some(400),
            ..Default::default()
        })
        .await;

        let target = UploadTarget::file("a.bin", 1).unwrap();
        let err = service
            .client()
            .create_entity(UploadKind::File, &target)
            .await
            .unwrap_err();

        assert_eq!(err.status().map(|s| s.as_u16()), Some(400));
        assert_eq!(service.snapshot().create_calls, 1);
        let msg = err.to_string();
        assert!(msg.contains("POST"));
        assert!(msg.contains("/api/create_file"));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let service = FakeService::start_with(FakeBehavior {
            transient_upload_url_failures: 2,
            ..Default::default()
        })
        .await;

        let descriptor = ChunkUploadDescriptor {
            id: "file-1".to_string(),
            size: 3,
            index: 1,
            md5: "900150983cd24fb0d6963f7d28e17f72".to_string(),
        };
        let dest = service.client().get_upload_url(&descriptor).await.unwrap();
        assert!(dest.url.ends_with("/store/file-1/1"));

        let state = service.snapshot();
        assert_eq!(state.upload_url_calls, 3);
        assert_eq!(state.chunk_requests, vec![descriptor]);
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let service = FakeService::start_with(FakeBehavior {
            upload_url_status: Some(500),
            ..Default::default()
        })
        .await;
        let client = service.client();
        let max_retries = client.http.policy().max_retries;

        let descriptor = ChunkUploadDescriptor {
            id: "file-1".to_string(),
            size: 0,
            index: 1,
            md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        };
        let err = client.get_upload_url(&descriptor).await.unwrap_err();

        assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
        assert_eq!(service.snapshot().upload_url_calls, max_retries + 1);
        match err {
            ApiError::Status { attempts, .. } => assert_eq!(attempts, max_retries + 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_destination_url_is_protocol_error() {
        let service = FakeService::start_with(FakeBehavior {
            omit_upload_url: true,
            ..Default::default()
        })
        .await;

        let descriptor = ChunkUploadDescriptor {
            id: "file-1".to_string(),
            size: 0,
            index: 1,
            md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        };
        let err = service
            .client()
            .get_upload_url(&descriptor)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_slow_destination_outlives_service_timeout() {
        let service = FakeService::start_with(FakeBehavior {
            store_delay: Some(Duration::from_millis(1500)),
            ..Default::default()
        })
        .await;

        let mut config = service.service_config();
        config.timeout_secs = 1;
        let policy = RetryPolicy {
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(5),
            max_retries: 2,
            ..Default::default()
        };
        let client = PfdaClient::new(&config, "test-key", policy).unwrap();

        let data = Bytes::from_static(b"slow chunk");
        let descriptor = ChunkUploadDescriptor {
            id: "file-1".to_string(),
            size: data.len() as u64,
            index: 1,
            md5: format!("{:x}", md5::compute(&data)),
        };
        let dest = client.get_upload_url(&descriptor).await.unwrap();

        let started = Instant::now();
        client.put_chunk(&dest, data.clone()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1500));

        let state = service.snapshot();
        assert_eq!(state.store_calls, 1);
        assert_eq!(state.stored.get(&1).map(Vec::as_slice), Some(&data[..]));
    }

    #[tokio::test]
    async fn test_retry_predicate_can_disable_retries() {
        let service = FakeService::start_with(FakeBehavior {
            transient_upload_url_failures: 2,
            ..Default::default()
        })
        .await;

        let policy = RetryPolicy {
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(5),
            max_retries: 3,
            retry_if: |_| false,
        };
        let client = PfdaClient::new(&service.service_config(), "test-key", policy).unwrap();

        let descriptor = ChunkUploadDescriptor {
            id: "file-1".to_string(),
            size: 0,
            index: 1,
            md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        };
        let err = client.get_upload_url(&descriptor).await.unwrap_err();
        assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
        assert_eq!(service.snapshot().upload_url_calls, 1);
    }

    #[tokio::test]
    async fn test_call_route_lowercases_and_returns_body() {
        let service = FakeService::start().await;
        let body = service
            .client()
            .call_route("Echo_Route", r#"{"hello":"world"}"#)
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["echo"]["hello"], "world");
        assert_eq!(service.snapshot().route_calls.len(), 1);
    }

    #[test]
    fn test_entity_url() {
        let client = PfdaClient::new(&ServiceConfig::default(), "k", RetryPolicy::default()).unwrap();
        assert_eq!(
            client.entity_url(UploadKind::File, "file-abc"),
            "https://precision.fda.gov/files/file-abc"
        );
        assert_eq!(
            client.entity_url(UploadKind::Asset, "file-xyz"),
            "https://precision.fda.gov/app_assets/file-xyz"
        );
        assert_eq!(
            client.api_url("close_asset"),
            "https://precision.fda.gov/api/close_asset"
        );
    }
}
