//! 批次会话
//!
//! 由 `BatchOrchestrator` 独占持有，所有字段的修改都在同一把锁内完成

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::BatchError;
use crate::models::{AnalysisRecord, ErrorKind};
use crate::services::{ConfigFingerprint, TimingAccumulator};

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    /// 自动暂停或手动暂停
    Paused,
    Stopped,
    Completed,
}

impl SessionState {
    /// 是否已经结束
    pub fn is_finished(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Completed)
    }
}

/// 自动暂停所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PausePhase {
    /// 等待重试计时器
    Waiting,
    /// 正在探测连通性
    Retrying,
    /// 重试次数耗尽
    Exhausted,
}

/// 自动暂停子记录
#[derive(Debug)]
pub struct PauseInfo {
    pub reason: String,
    pub error_kind: ErrorKind,
    pub started_at: DateTime<Utc>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub retry_interval: Duration,
    pub phase: PausePhase,
    /// 下一次计时器触发的时间
    pub next_retry_at: Option<Instant>,
    /// 计时器已触发，等待工作任务发起探测
    pub retry_due: bool,
    /// 当前计时器的代号，过期的计时器触发时会被忽略
    pub timer_generation: u64,
    pub timer: Option<CancellationToken>,
}

impl PauseInfo {
    /// 取消挂起的计时器
    pub fn cancel_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
        self.next_retry_at = None;
        self.retry_due = false;
    }
}

/// 批次会话
#[derive(Debug)]
pub struct BatchSession {
    pub session_id: String,
    pub files: Vec<String>,
    /// 下一个待尝试文件的索引
    pub cursor: usize,
    pub state: SessionState,
    pub fingerprint: ConfigFingerprint,
    pub pause: Option<PauseInfo>,
    /// 用户手动暂停（可与自动暂停叠加）
    pub manual_pause: bool,
    pub timing: TimingAccumulator,
    /// 按文件顺序累积的结果
    pub results: Vec<AnalysisRecord>,
    /// 使批次终止的致命错误，结束时移交给完成回调
    pub fatal: Option<BatchError>,
    /// 最近一次致命错误的描述（供状态查询）
    pub last_error: Option<String>,
}

impl BatchSession {
    pub fn new(session_id: impl Into<String>, files: Vec<String>, fingerprint: ConfigFingerprint) -> Self {
        Self {
            session_id: session_id.into(),
            files,
            cursor: 0,
            state: SessionState::Idle,
            fingerprint,
            pause: None,
            manual_pause: false,
            timing: TimingAccumulator::new(),
            results: Vec::new(),
            fatal: None,
            last_error: None,
        }
    }

    /// 当前游标指向的文件
    pub fn current_file(&self) -> Option<&str> {
        self.files.get(self.cursor).map(String::as_str)
    }

    /// 进度百分比（0..=100）
    pub fn percent(&self) -> u8 {
        if self.files.is_empty() {
            return 100;
        }
        ((self.cursor.min(self.files.len()) * 100) / self.files.len()) as u8
    }
}

/// 会话句柄
///
/// 工作任务、重试计时器与手动操作共享同一把锁；`wake` 用于唤醒挂起的工作任务
#[derive(Debug)]
pub struct SessionHandle {
    pub session: Mutex<BatchSession>,
    pub wake: Notify,
}

impl SessionHandle {
    pub fn new(session: BatchSession) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            wake: Notify::new(),
        })
    }
}
