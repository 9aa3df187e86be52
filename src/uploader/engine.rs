// 上传引擎
//
// 单次上传的完整流程：
// 1. 校验输入与上传策略（不发任何请求）
// 2. create_file / create_asset 取得实体 ID
// 3. 生产者切分数据源写入有界队列，线程池并发上传
// 4. close_file / close_asset 完成上传
//
// 任何一步失败都直接返回错误，不调用任何清理接口

use crate::api::PfdaClient;
use crate::config::UploadConfig;
use crate::uploader::archive::Archiver;
use crate::uploader::chunk::ChunkProducer;
use crate::uploader::error::UploadError;
use crate::uploader::folder::{format_bytes, read_readme, scan_folder};
use crate::uploader::policy::{check_total_size, EffectivePolicy, PolicyLimits};
use crate::uploader::pool::{ChunkUploader, PoolStats};
use crate::uploader::progress::{ConsoleProgress, ProgressReporter};
use crate::uploader::task::{UploadOutcome, UploadTarget, UploadTask};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{error, info};

/// 上传引擎
pub struct UploadEngine {
    client: PfdaClient,
    settings: UploadConfig,
    limits: PolicyLimits,
    progress: Arc<dyn ProgressReporter>,
}

impl UploadEngine {
    /// 创建上传引擎（默认策略边界，控制台进度）
    pub fn new(client: PfdaClient, settings: UploadConfig) -> Self {
        Self {
            client,
            settings,
            limits: PolicyLimits::default(),
            progress: Arc::new(ConsoleProgress::new()),
        }
    }

    pub fn with_limits(mut self, limits: PolicyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn client(&self) -> &PfdaClient {
        &self.client
    }

    /// 根据声明大小计算实际生效的分片大小与线程数
    pub fn resolve_policy(&self, target: &UploadTarget) -> Result<EffectivePolicy, UploadError> {
        let policy = EffectivePolicy::resolve(
            self.settings.chunk_size,
            self.settings.threads,
            target.size(),
            &self.limits,
        )?;

        info!(
            "上传策略: {} 大小={}, 分片={}, 线程={}",
            target.name(),
            format_bytes(target.size()),
            format_bytes(policy.chunk_size),
            policy.worker_count
        );
        Ok(policy)
    }

    /// 上传本地文件
    ///
    /// 文件名取路径的最后一段，描述为空
    pub async fn upload_file(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| UploadError::input(format!("文件 '{}' 不存在: {}", path.display(), e)))?;
        if metadata.is_dir() {
            return Err(UploadError::input(format!(
                "'{}' 是文件夹，请使用资源包上传",
                path.display()
            )));
        }

        check_total_size(metadata.len(), &self.limits)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::input(format!("无法获取文件名: {}", path.display())))?;

        let target = UploadTarget::file(name, metadata.len())?;
        let policy = self.resolve_policy(&target)?;
        let mut task = UploadTask::new(&target);

        let result = self.file_phases(&target, path, policy, &mut task).await;
        self.settle(&mut task, result)
    }

    /// 上传资源包
    ///
    /// # 参数
    /// * `name` - 资源包名称（`.tar` / `.tar.gz`）
    /// * `root` - 资源包根目录
    /// * `readme` - 说明文件，内容作为描述
    ///
    /// 声明大小为打包前的文件大小之和
    pub async fn upload_asset(&self, name: &str, root: &Path, readme: &Path) -> Result<UploadOutcome, UploadError> {
        let scan_root = root.to_path_buf();
        let scan = tokio::task::spawn_blocking(move || scan_folder(&scan_root))
            .await
            .map_err(|e| UploadError::Worker(format!("扫描目录任务异常: {}", e)))?
            .map_err(|e| UploadError::input(format!("{:#}", e)))?;
        let description = read_readme(readme)
            .await
            .map_err(|e| UploadError::input(format!("{:#}", e)))?;

        let target = UploadTarget::asset(name, description, scan.relative_paths(), scan.total_size)?;
        let policy = self.resolve_policy(&target)?;
        let mut task = UploadTask::new(&target);

        let result = self.asset_phases(&target, root, policy, &mut task).await;
        self.settle(&mut task, result)
    }

    /// 上传任意数据流
    ///
    /// `target.size()` 只用于策略计算，实际字节数以数据流为准
    pub async fn upload_stream<R>(&self, target: &UploadTarget, reader: R) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        let policy = self.resolve_policy(target)?;
        let mut task = UploadTask::new(target);

        let result = self.stream_phases(target, reader, policy, &mut task).await;
        self.settle(&mut task, result)
    }

    async fn stream_phases<R>(
        &self,
        target: &UploadTarget,
        reader: R,
        policy: EffectivePolicy,
        task: &mut UploadTask,
    ) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        let entity_id = self.create(target, task).await?;
        let stats = self.transfer(target, reader, &entity_id, policy, task).await?;
        self.close(target, entity_id, stats, task).await
    }

    async fn file_phases(
        &self,
        target: &UploadTarget,
        path: &Path,
        policy: EffectivePolicy,
        task: &mut UploadTask,
    ) -> Result<UploadOutcome, UploadError> {
        let entity_id = self.create(target, task).await?;

        let file = tokio::fs::File::open(path).await.map_err(UploadError::Source)?;
        let stats = self.transfer(target, file, &entity_id, policy, task).await?;

        if stats.bytes != target.size() {
            return Err(UploadError::Source(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "文件在上传过程中发生变化: 声明 {} bytes，实际读取 {} bytes",
                    target.size(),
                    stats.bytes
                ),
            )));
        }

        self.close(target, entity_id, stats, task).await
    }

    async fn asset_phases(
        &self,
        target: &UploadTarget,
        root: &Path,
        policy: EffectivePolicy,
        task: &mut UploadTask,
    ) -> Result<UploadOutcome, UploadError> {
        let entity_id = self.create(target, task).await?;

        self.progress.archiving();
        let mut archiver = Archiver::spawn(root, target.is_gzip())?;
        let stdout = archiver.take_stdout()?;

        // 出错返回时 archiver 被丢弃，tar 进程随之终止
        let stats = self.transfer(target, stdout, &entity_id, policy, task).await?;
        archiver.finish().await?;

        self.close(target, entity_id, stats, task).await
    }

    /// 阶段一：创建远程实体
    async fn create(&self, target: &UploadTarget, task: &mut UploadTask) -> Result<String, UploadError> {
        let entity_id = self.client.create_entity(target.kind(), target).await?;
        task.mark_created(entity_id.clone());
        Ok(entity_id)
    }

    /// 阶段二：切分并上传
    ///
    /// 生产者与线程池并发运行；线程池出错时它释放队列接收端，
    /// 生产者随之以 QueueClosed 结束，此时返回线程池的错误
    async fn transfer<R>(
        &self,
        target: &UploadTarget,
        reader: R,
        entity_id: &str,
        policy: EffectivePolicy,
        task: &mut UploadTask,
    ) -> Result<PoolStats, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        task.mark_uploading();
        self.progress.start(target.kind(), target.size());

        let (sender, receiver) = mpsc::channel(policy.worker_count);
        let producer = ChunkProducer::new(reader, policy.chunk_size);
        let uploader = ChunkUploader::new(self.client.clone(), self.progress.clone());

        let (produced, uploaded) = tokio::join!(
            producer.produce_into(sender),
            uploader.run_pool(policy.worker_count, receiver, entity_id.to_string())
        );

        let uploaded = uploaded?;
        let produced = produced?;

        if produced.chunks != uploaded.chunks {
            return Err(UploadError::Worker(format!(
                "已生成 {} 个分片，但只上传了 {} 个",
                produced.chunks, uploaded.chunks
            )));
        }

        self.progress.finish(target.kind());
        Ok(uploaded)
    }

    /// 阶段三：关闭远程实体
    async fn close(
        &self,
        target: &UploadTarget,
        entity_id: String,
        stats: PoolStats,
        task: &mut UploadTask,
    ) -> Result<UploadOutcome, UploadError> {
        task.mark_closing(stats.chunks, stats.bytes);
        self.client.close_entity(target.kind(), &entity_id).await?;
        task.mark_done();

        Ok(UploadOutcome {
            url: self.client.entity_url(target.kind(), &entity_id),
            entity_id,
            chunks: stats.chunks,
            bytes: stats.bytes,
        })
    }

    /// 记录最终状态
    fn settle(
        &self,
        task: &mut UploadTask,
        result: Result<UploadOutcome, UploadError>,
    ) -> Result<UploadOutcome, UploadError> {
        match &result {
            Ok(outcome) => info!(
                "{}上传完成: {} -> {} ({} 个分片, {}, 耗时 {}s)",
                task.kind,
                task.name,
                outcome.url,
                outcome.chunks,
                format_bytes(outcome.bytes),
                task.elapsed_secs().unwrap_or(0)
            ),
            Err(e) => {
                task.mark_failed(e.to_string());
                error!(
                    "{}上传失败: {} (状态={:?}, id={:?}): {}",
                    task.kind, task.name, task.state, task.entity_id, e
                );
            }
        }
        result
    }
}
