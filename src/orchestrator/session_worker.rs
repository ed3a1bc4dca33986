//! 批次工作任务 - 编排层
//!
//! 每个批次恰好一个工作任务，按顺序处理文件，从不并行
//!
//! 每一轮在会话锁内决定下一步：
//! - 运行中：处理游标指向的文件
//! - 暂停中：等待唤醒；计时器已到期时发起探测
//! - 已停止 / 已完成：收尾

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::error::BatchError;
use crate::models::{AnalysisRecord, BatchSession, PausePhase, SessionHandle, SessionState};
use crate::orchestrator::events::{
    CompletionCallback, ProgressCallback, ProgressEvent, ProgressOutcome,
};
use crate::services::{ConfigFingerprint, TimingReport};
use crate::utils::truncate_text;
use crate::workflow::{FileCtx, FileFlow, FileOutcome, PauseController, RetryTrigger};

/// 推理调用在计时记录中的操作名
const ANALYZE_OPERATION: &str = "analyze_file";

/// 批次结束时的汇总
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub session_id: String,
    pub state: SessionState,
    /// 按文件顺序的结果
    pub results: Vec<AnalysisRecord>,
    pub timing: TimingReport,
    #[serde(skip)]
    pub error: Option<BatchError>,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == crate::models::RecordStatus::Success)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == crate::models::RecordStatus::Failure)
            .count()
    }
}

enum Step {
    Process(FileCtx, ConfigFingerprint),
    Wait,
    Probe,
    Finish,
}

/// 批次工作任务
pub(crate) struct SessionWorker {
    handle: Arc<SessionHandle>,
    flow: FileFlow,
    controller: Arc<PauseController>,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompletionCallback>,
}

impl SessionWorker {
    pub(crate) fn new(
        handle: Arc<SessionHandle>,
        flow: FileFlow,
        controller: Arc<PauseController>,
        on_progress: Option<ProgressCallback>,
        on_complete: Option<CompletionCallback>,
    ) -> Self {
        Self {
            handle,
            flow,
            controller,
            on_progress,
            on_complete,
        }
    }

    pub(crate) async fn run(self) -> BatchReport {
        loop {
            match self.next_step().await {
                Step::Process(ctx, fingerprint) => self.process(ctx, &fingerprint).await,
                Step::Wait => self.handle.wake.notified().await,
                Step::Probe => {
                    self.controller.retry(&self.handle, RetryTrigger::Timer).await;
                }
                Step::Finish => break,
            }
        }
        self.finalize().await
    }

    async fn next_step(&self) -> Step {
        let mut session = self.handle.session.lock().await;
        match session.state {
            SessionState::Running => match session.current_file() {
                Some(file) => {
                    let ctx = FileCtx::new(
                        session.session_id.clone(),
                        session.cursor,
                        session.files.len(),
                        file.to_string(),
                    );
                    Step::Process(ctx, session.fingerprint.clone())
                }
                None => {
                    session.state = SessionState::Completed;
                    info!("🏁 [session {}] 所有文件处理完毕", session.session_id);
                    Step::Finish
                }
            },
            SessionState::Paused => {
                let due = session
                    .pause
                    .as_ref()
                    .is_some_and(|p| p.phase == PausePhase::Waiting && p.retry_due);
                if due {
                    Step::Probe
                } else {
                    Step::Wait
                }
            }
            SessionState::Idle | SessionState::Stopped | SessionState::Completed => Step::Finish,
        }
    }

    /// 处理游标指向的文件；推理期间不持有会话锁
    async fn process(&self, ctx: FileCtx, fingerprint: &ConfigFingerprint) {
        let outcome = self.flow.run(&ctx, fingerprint).await;

        let event = {
            let mut guard = self.handle.session.lock().await;
            let session = &mut *guard;
            match outcome {
                Ok(outcome) => self.apply(session, &ctx, outcome),
                Err(e) => {
                    error!("{} 💥 检查点写入失败，批次停止: {}", ctx, e);
                    session.state = SessionState::Stopped;
                    session.fatal = Some(BatchError::Storage(e));
                    None
                }
            }
        };

        if let (Some(event), Some(callback)) = (event, self.on_progress.as_ref()) {
            callback(&event);
        }
    }

    /// 把文件结果落到会话上，返回需要发出的进度事件
    fn apply(
        &self,
        session: &mut BatchSession,
        ctx: &FileCtx,
        outcome: FileOutcome,
    ) -> Option<ProgressEvent> {
        let model = self.flow.model_name().to_string();

        let progress = match outcome {
            FileOutcome::Checkpointed(record) => {
                session.timing.record_file(&ctx.file_path, 0, true);
                session.results.push(record.clone());
                ProgressOutcome::Checkpointed { record }
            }
            FileOutcome::Completed {
                record,
                duration_ms,
            } => {
                session.timing.record_file(&ctx.file_path, duration_ms, false);
                session
                    .timing
                    .record_call(ANALYZE_OPERATION, model, duration_ms, true);
                session.results.push(record.clone());
                ProgressOutcome::Completed { record }
            }
            FileOutcome::Failed {
                record,
                kind,
                duration_ms,
            } => {
                session
                    .timing
                    .record_call(ANALYZE_OPERATION, model, duration_ms, false);
                let message = record.error_message.clone().unwrap_or_default();
                session.results.push(record);
                ProgressOutcome::Failed { kind, message }
            }
            FileOutcome::Transient {
                kind,
                failure,
                duration_ms,
            } => {
                session
                    .timing
                    .record_call(ANALYZE_OPERATION, model, duration_ms, false);
                if session.state == SessionState::Stopped {
                    info!("{} 批次已停止，文件保持待处理", ctx);
                } else {
                    let reason = format!(
                        "API 限制 ({}): {}",
                        kind,
                        truncate_text(&failure.message, 120)
                    );
                    self.controller.enter(&self.handle, session, kind, reason);
                }
                // 游标不动，恢复后重试同一个文件
                return None;
            }
        };

        session.cursor += 1;
        Some(ProgressEvent {
            session_id: session.session_id.clone(),
            percent: session.percent(),
            index: ctx.index,
            total: ctx.total,
            file_path: ctx.file_path.clone(),
            outcome: progress,
        })
    }

    async fn finalize(self) -> BatchReport {
        let report = {
            let mut session = self.handle.session.lock().await;
            if let Some(pause) = session.pause.as_mut() {
                pause.cancel_timer();
            }
            session.timing.finish();
            let error = session.fatal.take();
            session.last_error = error.as_ref().map(ToString::to_string);

            BatchReport {
                session_id: session.session_id.clone(),
                state: session.state,
                results: session.results.clone(),
                timing: session.timing.report(),
                error,
            }
        };

        match &report.error {
            Some(e) => error!("🛑 [session {}] 批次终止: {}", report.session_id, e),
            None => info!(
                "✓ [session {}] 批次结束 ({:?})：成功 {}，失败 {}，共处理 {} 个文件",
                report.session_id,
                report.state,
                report.success_count(),
                report.failure_count(),
                report.results.len()
            ),
        }

        if let Some(callback) = self.on_complete.as_ref() {
            callback(&report.results, report.error.as_ref());
        }
        report
    }
}
