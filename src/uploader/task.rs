// 上传任务定义

use crate::uploader::error::UploadError;
use std::fmt;
use tracing::warn;

/// 上传类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// 单个文件
    File,
    /// 资源包（文件夹打包后的 tar 流）
    Asset,
}

impl UploadKind {
    pub fn create_route(&self) -> &'static str {
        match self {
            UploadKind::File => "create_file",
            UploadKind::Asset => "create_asset",
        }
    }

    pub fn close_route(&self) -> &'static str {
        match self {
            UploadKind::File => "close_file",
            UploadKind::Asset => "close_asset",
        }
    }

    /// 控制台输出用的英文名
    pub fn label(&self) -> &'static str {
        match self {
            UploadKind::File => "file",
            UploadKind::Asset => "asset",
        }
    }

    /// 访问地址前缀
    pub fn access_path(&self) -> &'static str {
        match self {
            UploadKind::File => "files",
            UploadKind::Asset => "app_assets",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadKind::File => write!(f, "文件"),
            UploadKind::Asset => write!(f, "资源包"),
        }
    }
}

/// 上传目标，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    kind: UploadKind,
    name: String,
    description: String,
    paths: Option<Vec<String>>,
    size: u64,
}

impl UploadTarget {
    /// 文件上传目标（描述为空）
    pub fn file(name: impl Into<String>, size: u64) -> Result<Self, UploadError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(UploadError::input("文件名不能为空"));
        }

        Ok(Self {
            kind: UploadKind::File,
            name,
            description: String::new(),
            paths: None,
            size,
        })
    }

    /// 资源包上传目标
    ///
    /// # 参数
    /// * `name` - 资源包名称，必须以 `.tar` 或 `.tar.gz` 结尾
    /// * `description` - readme 内容
    /// * `paths` - 包内文件的相对路径
    /// * `size` - 打包前的文件大小之和
    pub fn asset(
        name: impl Into<String>,
        description: impl Into<String>,
        paths: Vec<String>,
        size: u64,
    ) -> Result<Self, UploadError> {
        let name = name.into();
        if !is_archive_name(&name) {
            return Err(UploadError::input(format!(
                "资源包名称 '{}' 必须以 .tar 或 .tar.gz 结尾",
                name
            )));
        }

        Ok(Self {
            kind: UploadKind::Asset,
            name,
            description: description.into(),
            paths: Some(paths),
            size,
        })
    }

    pub fn kind(&self) -> UploadKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn paths(&self) -> Option<&[String]> {
        self.paths.as_deref()
    }

    /// 声明的大小
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 资源包是否需要 gzip 压缩
    pub fn is_gzip(&self) -> bool {
        self.name.ends_with(".tar.gz")
    }
}

fn is_archive_name(name: &str) -> bool {
    let stem_len = if name.ends_with(".tar.gz") {
        ".tar.gz".len()
    } else if name.ends_with(".tar") {
        ".tar".len()
    } else {
        return false;
    };
    name.len() > stem_len
}

/// 上传状态
///
/// Idle → Created → Uploading → Closing → Done，任何非终态都可进入 Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Created,
    Uploading,
    Closing,
    Done,
    Failed,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Done | UploadState::Failed)
    }

    pub fn can_transition_to(&self, next: UploadState) -> bool {
        use UploadState::*;
        match (self, next) {
            (Idle, Created) | (Created, Uploading) | (Uploading, Closing) | (Closing, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// 上传任务（单次上传的生命周期记录）
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub kind: UploadKind,
    pub name: String,
    pub total_size: u64,
    pub state: UploadState,
    /// 远程实体 ID（create 之后）
    pub entity_id: Option<String>,
    /// 已上传分片数
    pub uploaded_chunks: u64,
    /// 已上传字节数
    pub uploaded_bytes: u64,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
}

impl UploadTask {
    pub fn new(target: &UploadTarget) -> Self {
        Self {
            kind: target.kind(),
            name: target.name().to_string(),
            total_size: target.size(),
            state: UploadState::Idle,
            entity_id: None,
            uploaded_chunks: 0,
            uploaded_bytes: 0,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    fn transition(&mut self, next: UploadState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                "忽略非法状态转换: {} {:?} -> {:?}",
                self.name, self.state, next
            );
            return false;
        }
        self.state = next;
        true
    }

    /// 标记为已创建
    pub fn mark_created(&mut self, entity_id: String) {
        if self.transition(UploadState::Created) {
            self.entity_id = Some(entity_id);
        }
    }

    /// 标记为上传中
    pub fn mark_uploading(&mut self) {
        if self.transition(UploadState::Uploading) {
            self.started_at = Some(chrono::Utc::now().timestamp());
        }
    }

    pub fn mark_closing(&mut self, chunks: u64, bytes: u64) {
        if self.transition(UploadState::Closing) {
            self.uploaded_chunks = chunks;
            self.uploaded_bytes = bytes;
        }
    }

    /// 标记为已完成
    pub fn mark_done(&mut self) {
        if self.transition(UploadState::Done) {
            self.completed_at = Some(chrono::Utc::now().timestamp());
        }
    }

    /// 标记为失败
    pub fn mark_failed(&mut self, error: String) {
        if self.transition(UploadState::Failed) {
            self.error = Some(error);
            self.completed_at = Some(chrono::Utc::now().timestamp());
        }
    }

    /// 耗时（秒）
    pub fn elapsed_secs(&self) -> Option<i64> {
        Some(self.completed_at? - self.started_at?)
    }
}

/// 上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub entity_id: String,
    /// 访问地址
    pub url: String,
    pub chunks: u64,
    pub bytes: u64,
}
