// 远程服务 API 模块

pub mod client;
pub mod error;
pub mod http;
pub mod types;

pub use client::PfdaClient;
pub use error::{ApiError, ApiErrorKind};
pub use http::{default_retry_if, HttpResponse, RetryPolicy, RetryingHttpClient};
pub use types::{ChunkUploadDescriptor, CreateEntityRequest, EntityId, UploadDestination};
