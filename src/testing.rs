// 测试用的本地假服务
//
// 在 127.0.0.1 的随机端口上实现 create / get_upload_url / PUT / close 路由，
// 记录收到的请求，并可按配置注入故障

use crate::api::{ChunkUploadDescriptor, PfdaClient, RetryPolicy};
use crate::config::ServiceConfig;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 故障注入
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBehavior {
    /// create 响应不带 id
    pub omit_entity_id: bool,
    /// create 固定返回该状态码
    pub create_status: Option<u16>,
    /// get_upload_url 固定返回该状态码
    pub upload_url_status: Option<u16>,
    /// 前 N 次 get_upload_url 返回 503
    pub transient_upload_url_failures: u32,
    /// get_upload_url 响应不带 url
    pub omit_upload_url: bool,
    /// 分片 PUT 在响应前等待
    pub store_delay: Option<Duration>,
}

/// 假服务收到的请求记录
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeState {
    pub create_calls: u32,
    pub create_requests: Vec<(String, Value)>,
    pub authorizations: Vec<String>,
    /// 包括失败的调用
    pub upload_url_calls: u32,
    /// 成功返回上传地址的请求
    pub chunk_requests: Vec<ChunkUploadDescriptor>,
    /// 分片序号 -> 数据
    pub stored: BTreeMap<u64, Vec<u8>>,
    pub checksum_mismatches: u32,
    /// 收到的分片 PUT 次数
    pub store_calls: u32,
    /// (路由, id)
    pub closed: Vec<(String, String)>,
    pub route_calls: Vec<Value>,
}

struct Shared {
    behavior: FakeBehavior,
    base_url: String,
    next_id: AtomicU64,
    state: Mutex<FakeState>,
}

type SharedState = State<Arc<Shared>>;

pub(crate) struct FakeService {
    shared: Arc<Shared>,
}

impl FakeService {
    pub async fn start() -> Self {
        Self::start_with(FakeBehavior::default()).await
    }

    pub async fn start_with(behavior: FakeBehavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            behavior,
            base_url: format!("http://{}", addr),
            next_id: AtomicU64::new(1),
            state: Mutex::new(FakeState::default()),
        });

        let app = Router::new()
            .route("/api/create_file", post(create_file))
            .route("/api/create_asset", post(create_asset))
            .route("/api/get_upload_url", post(get_upload_url))
            .route("/api/close_file", post(close_file))
            .route("/api/close_asset", post(close_asset))
            .route("/api/echo_route", post(echo_route))
            .route("/store/:id/:index", put(store_chunk))
            .with_state(shared.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { shared }
    }

    pub fn base_url(&self) -> &str {
        &self.shared.base_url
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            server: self.shared.base_url.clone(),
            timeout_secs: 10,
            ..Default::default()
        }
    }

    /// 重试等待缩短到毫秒级的客户端
    pub fn client(&self) -> PfdaClient {
        let policy = RetryPolicy {
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(5),
            max_retries: 3,
            ..Default::default()
        };
        PfdaClient::new(&self.service_config(), "test-key", policy).unwrap()
    }

    pub fn snapshot(&self) -> FakeState {
        self.shared.state.lock().unwrap().clone()
    }

    /// 按分片序号拼接的已存储数据
    pub fn uploaded_bytes(&self) -> Vec<u8> {
        let state = self.shared.state.lock().unwrap();
        state.stored.values().flatten().copied().collect()
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn create(shared: &Shared, route: &str, headers: &HeaderMap, body: Value) -> Response {
    let mut state = shared.state.lock().unwrap();
    state.create_calls += 1;

    if let Some(status) = shared.behavior.create_status {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, Json(json!({ "error": "create failed" }))).into_response();
    }

    state.authorizations.push(header_str(headers, "authorization"));
    state.create_requests.push((route.to_string(), body));

    if shared.behavior.omit_entity_id {
        return Json(json!({})).into_response();
    }

    let id = format!("file-{}", shared.next_id.fetch_add(1, Ordering::SeqCst));
    Json(json!({ "id": id })).into_response()
}

async fn create_file(State(shared): SharedState, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    create(&shared, "create_file", &headers, body)
}

async fn create_asset(State(shared): SharedState, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    create(&shared, "create_asset", &headers, body)
}

async fn get_upload_url(
    State(shared): SharedState,
    Json(descriptor): Json<ChunkUploadDescriptor>,
) -> Response {
    let mut state = shared.state.lock().unwrap();
    state.upload_url_calls += 1;

    if let Some(status) = shared.behavior.upload_url_status {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, "upload url unavailable").into_response();
    }
    if state.upload_url_calls <= shared.behavior.transient_upload_url_failures {
        return (StatusCode::SERVICE_UNAVAILABLE, "try again").into_response();
    }

    let url = format!("{}/store/{}/{}", shared.base_url, descriptor.id, descriptor.index);
    let md5 = descriptor.md5.clone();
    state.chunk_requests.push(descriptor);

    if shared.behavior.omit_upload_url {
        return Json(json!({ "headers": {} })).into_response();
    }

    Json(json!({
        "url": url,
        "headers": {
            "Content-Type": "application/octet-stream",
            "X-Checksum-Md5": md5,
        }
    }))
    .into_response()
}

async fn store_chunk(
    State(shared): SharedState,
    Path((_id, index)): Path<(String, u64)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(delay) = shared.behavior.store_delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = shared.state.lock().unwrap();
    state.store_calls += 1;

    // 服务端指定的头部之外不应带授权信息
    if headers.contains_key("authorization") {
        return (StatusCode::BAD_REQUEST, "unexpected authorization").into_response();
    }

    let expected = header_str(&headers, "x-checksum-md5");
    let actual = format!("{:x}", md5::compute(&body));
    if expected != actual {
        state.checksum_mismatches += 1;
        return (StatusCode::BAD_REQUEST, "checksum mismatch").into_response();
    }

    state.stored.insert(index, body.to_vec());
    StatusCode::OK.into_response()
}

fn close(shared: &Shared, route: &str, body: Value) -> Response {
    let id = body["id"].as_str().unwrap_or_default().to_string();
    shared.state.lock().unwrap().closed.push((route.to_string(), id));
    Json(json!({})).into_response()
}

async fn close_file(State(shared): SharedState, Json(body): Json<Value>) -> Response {
    close(&shared, "close_file", body)
}

async fn close_asset(State(shared): SharedState, Json(body): Json<Value>) -> Response {
    close(&shared, "close_asset", body)
}

async fn echo_route(State(shared): SharedState, body: Bytes) -> Response {
    let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    shared.state.lock().unwrap().route_calls.push(value.clone());
    Json(json!({ "echo": value })).into_response()
}
