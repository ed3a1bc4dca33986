//! 文件处理流程 - 流程层
//!
//! 核心职责：定义"一个文件"的完整处理流程
//!
//! 流程顺序：
//! 1. 检查点可复用 → 直接返回
//! 2. 带截止时间调用推理
//! 3. 成功 → 写成功记录
//! 4. 失败 → 分类：瞬时错误交给调用方暂停，其余写失败记录
//!
//! 不修改批次会话，也不推进游标

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::clients::{InferenceFailure, InferenceInvoker};
use crate::config::AnalysisConfig;
use crate::error::StorageError;
use crate::models::{AnalysisRecord, ErrorKind};
use crate::services::{CheckpointStore, ConfigFingerprint, ErrorClassifier};
use crate::utils::truncate_text;
use crate::workflow::file_ctx::FileCtx;

/// 单个文件的处理结果
#[derive(Debug, Clone)]
pub enum FileOutcome {
    /// 复用已有检查点，没有发起推理
    Checkpointed(AnalysisRecord),
    /// 推理成功，记录已写入
    Completed { record: AnalysisRecord, duration_ms: u64 },
    /// 非瞬时失败，失败记录已写入
    Failed {
        record: AnalysisRecord,
        kind: ErrorKind,
        duration_ms: u64,
    },
    /// 瞬时失败，没有写记录，需要暂停后重试同一文件
    Transient {
        kind: ErrorKind,
        failure: InferenceFailure,
        duration_ms: u64,
    },
}

/// 文件处理流程
///
/// - 决定是否需要推理
/// - 把推理结果或失败落到检查点
/// - 只依赖业务能力（services）和外部协作方（clients）
pub struct FileFlow {
    invoker: Arc<dyn InferenceInvoker>,
    checkpoints: CheckpointStore,
    classifier: ErrorClassifier,
    config: AnalysisConfig,
    inference_timeout: Duration,
}

impl FileFlow {
    pub fn new(
        invoker: Arc<dyn InferenceInvoker>,
        checkpoints: CheckpointStore,
        config: AnalysisConfig,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            checkpoints,
            classifier: ErrorClassifier::new(),
            config,
            inference_timeout,
        }
    }

    pub fn model_name(&self) -> &str {
        self.invoker.model_name()
    }

    pub async fn run(
        &self,
        ctx: &FileCtx,
        fingerprint: &ConfigFingerprint,
    ) -> Result<FileOutcome, StorageError> {
        if !self.checkpoints.is_pending(&ctx.file_path, fingerprint).await? {
            if let Some(record) = self.checkpoints.load(&ctx.file_path).await? {
                debug!("{} ♻️ 复用检查点", ctx);
                return Ok(FileOutcome::Checkpointed(record));
            }
        }

        info!("{} 🔍 开始分析", ctx);
        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.inference_timeout,
            self.invoker.invoke(&ctx.file_path, &self.config),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(InferenceFailure::timeout(format!(
                "推理调用超过 {} 秒未返回",
                self.inference_timeout.as_secs()
            ))),
        };
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(output) => {
                let record = AnalysisRecord::success(
                    &ctx.file_path,
                    fingerprint.clone(),
                    output.result_ref,
                    duration_ms,
                );
                self.checkpoints.write(&record).await?;
                info!(
                    "{} ✅ 分析完成 ({} ms, {} 字符)",
                    ctx, duration_ms, output.response_chars
                );
                Ok(FileOutcome::Completed { record, duration_ms })
            }
            Err(failure) => {
                let kind = self.classifier.classify(&failure);
                if kind.is_transient() {
                    warn!("{} ⏸️ 瞬时错误 ({}): {}", ctx, kind, truncate_text(&failure.to_string(), 200));
                    return Ok(FileOutcome::Transient {
                        kind,
                        failure,
                        duration_ms,
                    });
                }

                error!("{} ❌ 分析失败 ({}): {}", ctx, kind, truncate_text(&failure.to_string(), 200));
                let record = AnalysisRecord::failure(
                    &ctx.file_path,
                    fingerprint.clone(),
                    kind,
                    failure.to_string(),
                    duration_ms,
                );
                self.checkpoints.write(&record).await?;
                Ok(FileOutcome::Failed {
                    record,
                    kind,
                    duration_ms,
                })
            }
        }
    }
}
