//! 批量分析编排器 - 编排层
//!
//! ## 职责
//!
//! 1. **启动批次**：创建会话，启动后台工作任务，立即返回 session_id
//! 2. **单会话约束**：同一个编排器同时只允许一个运行中的批次
//! 3. **手动操作**：暂停状态、强制重试、取消、手动暂停 / 恢复
//! 4. **状态查询**：检查点统计 + 暂停状态 + 计时快照
//! 5. **错误清理**：按错误类型把失败记录重置为待处理
//!
//! 所有手动操作都通过同一把会话锁与工作任务串行化

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{ConnectivityProbe, InferenceInvoker};
use crate::config::{AnalysisConfig, BatchSettings};
use crate::error::{BatchError, StorageError};
use crate::infrastructure::RecordStore;
use crate::models::{BatchSession, ErrorKind, SessionHandle, SessionState};
use crate::orchestrator::events::{CompletionCallback, ProgressCallback};
use crate::orchestrator::session_worker::{BatchReport, SessionWorker};
use crate::services::{CheckpointStore, CheckpointSummary, ConfigFingerprint, TimingSnapshot};
use crate::workflow::{FileFlow, PauseController, PauseStatus, RetryOutcome, RetryTrigger};

/// 手动操作的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub ok: bool,
    pub message: String,
}

impl ActionResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// 批次状态
#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub session_id: String,
    pub state: SessionState,
    pub cursor: usize,
    pub total: usize,
    pub summary: CheckpointSummary,
    pub pause: PauseStatus,
    pub timing: TimingSnapshot,
    pub last_error: Option<String>,
}

struct ActiveSession {
    handle: Arc<SessionHandle>,
    worker: Option<JoinHandle<BatchReport>>,
}

/// 批量分析编排器
pub struct BatchOrchestrator {
    invoker: Arc<dyn InferenceInvoker>,
    checkpoints: CheckpointStore,
    controller: Arc<PauseController>,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompletionCallback>,
    current: Mutex<Option<ActiveSession>>,
}

impl BatchOrchestrator {
    pub fn new(
        invoker: Arc<dyn InferenceInvoker>,
        probe: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn RecordStore>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            invoker,
            checkpoints: CheckpointStore::new(store),
            controller: Arc::new(PauseController::new(probe, settings)),
            on_progress: None,
            on_complete: None,
            current: Mutex::new(None),
        }
    }

    /// 设置进度回调（在工作任务中调用）
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// 设置完成回调（在工作任务中调用）
    pub fn with_completion_callback(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// 启动批次，立即返回 session_id
    ///
    /// 已有未结束的批次（或其工作任务尚未退出）时返回 `AlreadyRunning`，不会等待
    pub async fn run(&self, files: Vec<String>, config: &AnalysisConfig) -> Result<String, BatchError> {
        let mut current = self.current.lock().await;

        if let Some(active) = current.as_mut() {
            let (finished, previous_id) = {
                let session = active.handle.session.lock().await;
                (session.state.is_finished(), session.session_id.clone())
            };
            // 工作任务还在就算运行中（包括已取消、仍在等当前文件推理的情况）；
            // 工作任务已退出则以会话状态为准
            let busy = match active.worker.as_ref() {
                Some(worker) => !worker.is_finished(),
                None => !finished,
            };
            if busy {
                return Err(BatchError::AlreadyRunning {
                    session_id: previous_id,
                });
            }
            // 工作任务已退出，这里不会阻塞
            if let Some(worker) = active.worker.take() {
                if let Err(e) = worker.await {
                    warn!("⚠️ [session {}] 上一个工作任务异常退出: {}", previous_id, e);
                }
            }
        }

        let session_id = Uuid::new_v4().to_string();
        let fingerprint = ConfigFingerprint::compute(config);
        info!(
            "🚀 [session {}] 启动批次: {} 个文件，模型 {}，指纹 {}",
            session_id,
            files.len(),
            config.model,
            fingerprint.short()
        );

        let mut session = BatchSession::new(&session_id, files, fingerprint);
        session.state = SessionState::Running;
        session.timing.mark_started();
        let handle = SessionHandle::new(session);

        let flow = FileFlow::new(
            Arc::clone(&self.invoker),
            self.checkpoints.clone(),
            config.clone(),
            self.controller.settings().inference_timeout,
        );
        let worker = SessionWorker::new(
            Arc::clone(&handle),
            flow,
            Arc::clone(&self.controller),
            self.on_progress.clone(),
            self.on_complete.clone(),
        );

        *current = Some(ActiveSession {
            handle,
            worker: Some(tokio::spawn(worker.run())),
        });
        Ok(session_id)
    }

    /// 等待当前批次结束并取回汇总
    pub async fn wait(&self) -> Result<BatchReport, BatchError> {
        let worker = {
            let mut current = self.current.lock().await;
            current
                .as_mut()
                .and_then(|active| active.worker.take())
                .ok_or(BatchError::NoSession)?
        };
        match worker.await {
            Ok(report) => Ok(report),
            Err(e) => {
                let error = BatchError::WorkerFailed(e.to_string());
                if let Some(handle) = self.handle().await {
                    let mut session = handle.session.lock().await;
                    session.state = SessionState::Stopped;
                    session.last_error = Some(error.to_string());
                }
                error!("💥 工作任务异常退出: {}", error);
                Err(error)
            }
        }
    }

    async fn handle(&self) -> Option<Arc<SessionHandle>> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.handle))
    }

    /// 自动暂停状态
    pub async fn pause_status(&self) -> PauseStatus {
        match self.handle().await {
            Some(handle) => {
                let session = handle.session.lock().await;
                self.controller.status(&session)
            }
            None => PauseStatus::inactive(self.controller.settings().max_attempts),
        }
    }

    /// 立即探测一次，不等待计时器
    pub async fn force_retry(&self) -> ActionResult {
        let Some(handle) = self.handle().await else {
            return ActionResult::fail("当前没有批次");
        };

        match self.controller.retry(&handle, RetryTrigger::Manual).await {
            RetryOutcome::Resumed => ActionResult::ok("API 可用，分析已恢复"),
            RetryOutcome::StillUnavailable {
                attempt,
                max_attempts,
            } => ActionResult::fail(format!(
                "API 仍不可用，继续自动等待 (attempt {}/{})",
                attempt, max_attempts
            )),
            RetryOutcome::Exhausted { attempts } => ActionResult::fail(format!(
                "API 仍不可用，重试次数已耗尽 ({} 次)，分析已停止",
                attempts
            )),
            RetryOutcome::NotPaused => ActionResult::fail("当前没有等待中的自动暂停"),
            RetryOutcome::Cancelled => ActionResult::fail("自动暂停已被取消"),
        }
    }

    /// 取消批次
    ///
    /// 自动暂停中立即停止；运行中则在当前文件完成后停止。未处理的文件保持待处理。
    pub async fn cancel(&self) -> ActionResult {
        let Some(handle) = self.handle().await else {
            return ActionResult::fail("当前没有批次");
        };

        let result = {
            let mut session = handle.session.lock().await;
            if self.controller.cancel(&mut session) {
                ActionResult::ok("自动暂停已取消，分析停止")
            } else {
                match session.state {
                    SessionState::Running => {
                        session.state = SessionState::Stopped;
                        info!("🛑 [session {}] 收到取消请求，当前文件完成后停止", session.session_id);
                        ActionResult::ok("分析将在当前文件完成后停止")
                    }
                    SessionState::Paused => {
                        session.manual_pause = false;
                        session.timing.exit_pause();
                        session.state = SessionState::Stopped;
                        info!("🛑 [session {}] 手动暂停中取消，分析停止", session.session_id);
                        ActionResult::ok("分析已停止")
                    }
                    SessionState::Idle | SessionState::Stopped | SessionState::Completed => {
                        ActionResult::fail("没有正在运行的批次")
                    }
                }
            }
        };

        if result.ok {
            handle.wake.notify_one();
        }
        result
    }

    /// 手动暂停，在当前文件完成后生效
    pub async fn pause(&self) -> ActionResult {
        let Some(handle) = self.handle().await else {
            return ActionResult::fail("当前没有批次");
        };

        let mut session = handle.session.lock().await;
        match session.state {
            SessionState::Running => {
                session.manual_pause = true;
                session.state = SessionState::Paused;
                session.timing.enter_pause();
                info!("⏸️ [session {}] 手动暂停", session.session_id);
                ActionResult::ok("分析将在当前文件完成后暂停")
            }
            SessionState::Paused if !session.manual_pause => {
                session.manual_pause = true;
                ActionResult::ok("已处于自动暂停，API 恢复后仍保持暂停")
            }
            SessionState::Paused => ActionResult::fail("分析已处于手动暂停"),
            SessionState::Idle | SessionState::Stopped | SessionState::Completed => {
                ActionResult::fail("没有正在运行的批次")
            }
        }
    }

    /// 从手动暂停恢复；自动暂停只能通过强制重试或计时器解除
    pub async fn resume(&self) -> ActionResult {
        let Some(handle) = self.handle().await else {
            return ActionResult::fail("当前没有批次");
        };

        {
            let mut session = handle.session.lock().await;
            if session.state != SessionState::Paused || !session.manual_pause {
                return ActionResult::fail("分析没有处于手动暂停");
            }
            if session.pause.is_some() {
                return ActionResult::fail("API 自动暂停中，请使用强制重试");
            }
            session.manual_pause = false;
            session.timing.exit_pause();
            session.state = SessionState::Running;
            info!("▶️ [session {}] 手动恢复", session.session_id);
        }

        handle.wake.notify_one();
        ActionResult::ok("分析已恢复")
    }

    /// 当前批次的完整状态
    pub async fn status(&self) -> Result<BatchStatus, BatchError> {
        let handle = self.handle().await.ok_or(BatchError::NoSession)?;

        let (files, fingerprint, mut status) = {
            let session = handle.session.lock().await;
            let status = BatchStatus {
                session_id: session.session_id.clone(),
                state: session.state,
                cursor: session.cursor,
                total: session.files.len(),
                summary: CheckpointSummary::default(),
                pause: self.controller.status(&session),
                timing: session.timing.snapshot(),
                last_error: session.last_error.clone(),
            };
            (session.files.clone(), session.fingerprint.clone(), status)
        };

        status.summary = self.checkpoints.summarize(&files, &fingerprint).await?;
        Ok(status)
    }

    /// 在给定配置下统计文件列表的检查点情况（不启动批次）
    pub async fn summarize(
        &self,
        files: &[String],
        config: &AnalysisConfig,
    ) -> Result<CheckpointSummary, StorageError> {
        self.checkpoints
            .summarize(files, &ConfigFingerprint::compute(config))
            .await
    }

    /// 把指定错误类型的失败记录重置为待处理
    pub async fn clear_errors(&self, kinds: &HashSet<ErrorKind>) -> Result<usize, StorageError> {
        self.checkpoints.clear_by_error_kind(kinds).await
    }
}
