//! 自动暂停控制 - 流程层
//!
//! 核心职责：瞬时 API 错误（rate_limit / quota_exceeded）下的暂停、定时重试与放弃
//!
//! 状态流转：
//! 1. 运行中 → 等待重试（记录原因，启动可取消的计时器，开始计暂停时间）
//! 2. 等待重试 → 探测中（计时器触发或手动强制重试）
//! 3. 探测成功 → 运行中（重新尝试触发暂停的同一个文件）
//! 4. 探测失败 → 等待重试（attempt + 1）或 耗尽（批次停止）
//! 5. 任意暂停阶段 → 停止（手动取消，剩余文件保持待处理）
//!
//! 计时器只负责标记"该重试了"并唤醒工作任务，探测由工作任务或手动调用方执行

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clients::ConnectivityProbe;
use crate::config::BatchSettings;
use crate::error::BatchError;
use crate::models::{BatchSession, ErrorKind, PauseInfo, PausePhase, SessionHandle, SessionState};

/// 重试的触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTrigger {
    /// 计时器到期
    Timer,
    /// 用户强制重试
    Manual,
}

/// 一次重试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// 服务恢复，批次继续
    Resumed,
    /// 服务仍不可用，已安排下一次重试
    StillUnavailable { attempt: u32, max_attempts: u32 },
    /// 重试次数耗尽，批次停止
    Exhausted { attempts: u32 },
    /// 当前没有处于等待阶段的自动暂停
    NotPaused,
    /// 探测期间暂停被取消
    Cancelled,
}

/// 暂停状态查询结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PauseStatus {
    /// 是否处于自动暂停
    pub active: bool,
    pub reason: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub phase: Option<PausePhase>,
    pub attempts: u32,
    pub max_attempts: u32,
    /// 已暂停的秒数
    pub paused_secs: u64,
    /// 距离下一次自动重试的秒数
    pub seconds_to_next_retry: Option<u64>,
}

impl PauseStatus {
    /// 没有自动暂停时的状态
    pub fn inactive(max_attempts: u32) -> Self {
        Self {
            active: false,
            reason: None,
            error_kind: None,
            phase: None,
            attempts: 0,
            max_attempts,
            paused_secs: 0,
            seconds_to_next_retry: None,
        }
    }
}

/// 自动暂停控制器
///
/// 职责：
/// - 维护 `BatchSession.pause` 子记录
/// - 调度 / 取消重试计时器
/// - 探测连通性并决定恢复、继续等待或放弃
/// - 不处理文件，不写检查点
pub struct PauseController {
    probe: Arc<dyn ConnectivityProbe>,
    settings: BatchSettings,
}

impl PauseController {
    pub fn new(probe: Arc<dyn ConnectivityProbe>, settings: BatchSettings) -> Self {
        Self { probe, settings }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// 进入自动暂停
    ///
    /// 必须在持有会话锁时调用；已经处于自动暂停时返回 false
    pub fn enter(
        &self,
        handle: &Arc<SessionHandle>,
        session: &mut BatchSession,
        kind: ErrorKind,
        reason: impl Into<String>,
    ) -> bool {
        if session.pause.is_some() {
            debug!("[session {}] 重复的暂停信号，忽略", session.session_id);
            return false;
        }

        let mut pause = PauseInfo {
            reason: reason.into(),
            error_kind: kind,
            started_at: Utc::now(),
            attempt: 1,
            max_attempts: self.settings.max_attempts,
            retry_interval: self.settings.retry_interval,
            phase: PausePhase::Waiting,
            next_retry_at: None,
            retry_due: false,
            timer_generation: 0,
            timer: None,
        };

        session.timing.enter_pause();
        session.state = SessionState::Paused;
        self.schedule_timer(handle, &mut pause);

        warn!(
            "⏸️ [session {}] 分析已自动暂停: {}，{} 秒后重试 (attempt {}/{})",
            session.session_id,
            pause.reason,
            pause.retry_interval.as_secs(),
            pause.attempt,
            pause.max_attempts
        );
        session.pause = Some(pause);
        true
    }

    /// 发起一次重试：等待重试 → 探测中 → 恢复 / 继续等待 / 耗尽
    ///
    /// 探测期间不持有会话锁，状态查询和取消可以并发进行
    pub async fn retry(&self, handle: &Arc<SessionHandle>, trigger: RetryTrigger) -> RetryOutcome {
        let (session_id, attempt) = {
            let mut session = handle.session.lock().await;
            let session_id = session.session_id.clone();
            let Some(pause) = session.pause.as_mut() else {
                return RetryOutcome::NotPaused;
            };
            if pause.phase != PausePhase::Waiting {
                return RetryOutcome::NotPaused;
            }
            pause.cancel_timer();
            pause.phase = PausePhase::Retrying;
            (session_id, pause.attempt)
        };

        match trigger {
            RetryTrigger::Timer => info!("🔄 [session {}] 计时器到期，探测 API (attempt {})", session_id, attempt),
            RetryTrigger::Manual => info!("🔄 [session {}] 强制重试，探测 API (attempt {})", session_id, attempt),
        }

        let available = tokio::time::timeout(self.settings.probe_timeout, self.probe.probe())
            .await
            .unwrap_or(false);

        let mut session = handle.session.lock().await;
        let still_retrying = session
            .pause
            .as_ref()
            .is_some_and(|p| p.phase == PausePhase::Retrying);
        if !still_retrying {
            debug!("[session {}] 探测期间暂停已被取消", session_id);
            return RetryOutcome::Cancelled;
        }

        if available {
            session.pause = None;
            if session.manual_pause {
                info!("✅ [session {}] API 已恢复，批次仍处于手动暂停", session_id);
            } else {
                session.timing.exit_pause();
                session.state = SessionState::Running;
                info!("🟢 [session {}] API 已恢复，继续分析", session_id);
            }
            drop(session);
            handle.wake.notify_one();
            return RetryOutcome::Resumed;
        }

        let session_ref = &mut *session;
        let Some(pause) = session_ref.pause.as_mut() else {
            return RetryOutcome::Cancelled;
        };

        if pause.attempt < pause.max_attempts {
            pause.attempt += 1;
            pause.phase = PausePhase::Waiting;
            self.schedule_timer(handle, pause);
            warn!(
                "❌ [session {}] API 仍不可用，{} 秒后再试 (attempt {}/{})",
                session_id,
                pause.retry_interval.as_secs(),
                pause.attempt,
                pause.max_attempts
            );
            return RetryOutcome::StillUnavailable {
                attempt: pause.attempt,
                max_attempts: pause.max_attempts,
            };
        }

        pause.phase = PausePhase::Exhausted;
        let attempts = pause.attempt;
        let kind = pause.error_kind;
        session_ref.timing.exit_pause();
        session_ref.state = SessionState::Stopped;
        session_ref.fatal = Some(BatchError::ExhaustedRetries { kind, attempts });
        error!(
            "🚫 [session {}] 重试次数已耗尽 ({} 次)，分析中止",
            session_id, attempts
        );
        drop(session);
        handle.wake.notify_one();
        RetryOutcome::Exhausted { attempts }
    }

    /// 取消自动暂停并停止批次
    ///
    /// 必须在持有会话锁时调用；没有可取消的暂停时返回 false
    pub fn cancel(&self, session: &mut BatchSession) -> bool {
        let Some(pause) = session.pause.as_mut() else {
            return false;
        };
        if pause.phase == PausePhase::Exhausted {
            return false;
        }

        pause.cancel_timer();
        session.pause = None;
        session.timing.exit_pause();
        session.state = SessionState::Stopped;
        info!("🚫 [session {}] 自动暂停已取消，分析停止", session.session_id);
        true
    }

    /// 暂停状态
    pub fn status(&self, session: &BatchSession) -> PauseStatus {
        match session.pause.as_ref() {
            Some(pause) if pause.phase != PausePhase::Exhausted => {
                let now = Instant::now();
                let paused_secs = (Utc::now() - pause.started_at).num_seconds().max(0) as u64;
                PauseStatus {
                    active: true,
                    reason: Some(pause.reason.clone()),
                    error_kind: Some(pause.error_kind),
                    phase: Some(pause.phase),
                    attempts: pause.attempt,
                    max_attempts: pause.max_attempts,
                    paused_secs,
                    seconds_to_next_retry: pause
                        .next_retry_at
                        .map(|at| at.saturating_duration_since(now).as_secs()),
                }
            }
            Some(pause) => PauseStatus {
                active: false,
                reason: Some(pause.reason.clone()),
                error_kind: Some(pause.error_kind),
                phase: Some(PausePhase::Exhausted),
                attempts: pause.attempt,
                max_attempts: pause.max_attempts,
                paused_secs: 0,
                seconds_to_next_retry: None,
            },
            None => PauseStatus::inactive(self.settings.max_attempts),
        }
    }

    /// 启动新的重试计时器，旧计时器作废
    fn schedule_timer(&self, handle: &Arc<SessionHandle>, pause: &mut PauseInfo) {
        pause.cancel_timer();
        pause.timer_generation += 1;

        let token = CancellationToken::new();
        pause.timer = Some(token.clone());
        pause.next_retry_at = Some(Instant::now() + pause.retry_interval);

        let handle = Arc::clone(handle);
        let interval = pause.retry_interval;
        let generation = pause.timer_generation;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(interval) => {
                    let fired = {
                        let mut session = handle.session.lock().await;
                        match session.pause.as_mut() {
                            Some(p) if p.phase == PausePhase::Waiting && p.timer_generation == generation => {
                                p.retry_due = true;
                                p.timer = None;
                                p.next_retry_at = None;
                                true
                            }
                            _ => false,
                        }
                    };
                    if fired {
                        handle.wake.notify_one();
                    }
                }
            }
        });
    }
}
