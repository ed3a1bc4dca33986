//! 计时 - 业务能力层
//!
//! 同时给出两种耗时：
//! - 总耗时（墙钟时间，包含暂停）
//! - 有效耗时（扣除所有暂停）

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::StorageError;

/// 单个文件的耗时
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTiming {
    pub file_path: String,
    pub analysis_time_ms: u64,
    /// 结果来自检查点（未调用推理）
    pub checkpointed: bool,
}

/// 单次推理调用的耗时
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallTiming {
    pub operation: String,
    pub model: String,
    pub duration_ms: u64,
    pub success: bool,
}

/// 计时导出结构（供外部报表使用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingReport {
    pub total_analysis_time_ms: u64,
    pub effective_analysis_time_ms: u64,
    pub total_pause_time_ms: u64,
    pub files: Vec<FileTiming>,
}

/// 状态查询用的计时快照
#[derive(Debug, Clone, Serialize)]
pub struct TimingSnapshot {
    pub total_ms: u64,
    pub effective_ms: u64,
    pub pause_ms: u64,
    pub paused: bool,
    pub files_processed: usize,
    pub checkpointed_files: usize,
    pub llm_calls: usize,
    pub llm_total_ms: u64,
}

/// 计时累加器
///
/// 所有 `*_at` 方法接收显式的时间点，便于在测试中精确控制。
#[derive(Debug, Default)]
pub struct TimingAccumulator {
    start_time: Option<Instant>,
    finished_at: Option<Instant>,
    pause_started_at: Option<Instant>,
    total_pause: Duration,
    per_file: Vec<FileTiming>,
    calls: Vec<CallTiming>,
}

impl TimingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始计时（每个会话只生效一次）
    pub fn mark_started(&mut self) {
        self.mark_started_at(Instant::now());
    }

    pub fn mark_started_at(&mut self, now: Instant) {
        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
    }

    /// 记录一个文件的耗时
    pub fn record_file(&mut self, file_path: impl Into<String>, duration_ms: u64, checkpointed: bool) {
        let file_path = file_path.into();
        let duration_ms = if checkpointed { 0 } else { duration_ms };
        debug!("文件计时: {} -> {}ms (checkpoint: {})", file_path, duration_ms, checkpointed);
        self.per_file.push(FileTiming {
            file_path,
            analysis_time_ms: duration_ms,
            checkpointed,
        });
    }

    /// 记录一次推理调用
    pub fn record_call(
        &mut self,
        operation: impl Into<String>,
        model: impl Into<String>,
        duration_ms: u64,
        success: bool,
    ) {
        self.calls.push(CallTiming {
            operation: operation.into(),
            model: model.into(),
            duration_ms,
            success,
        });
    }

    /// 进入暂停；已经暂停（或尚未开始）时返回 false
    pub fn enter_pause(&mut self) -> bool {
        self.enter_pause_at(Instant::now())
    }

    pub fn enter_pause_at(&mut self, now: Instant) -> bool {
        if self.pause_started_at.is_some() || self.start_time.is_none() || self.finished_at.is_some() {
            return false;
        }
        self.pause_started_at = Some(now);
        true
    }

    /// 退出暂停；未暂停时不做任何事
    pub fn exit_pause(&mut self) -> bool {
        self.exit_pause_at(Instant::now())
    }

    pub fn exit_pause_at(&mut self, now: Instant) -> bool {
        match self.pause_started_at.take() {
            Some(started) => {
                let paused = now.saturating_duration_since(started);
                self.total_pause += paused;
                debug!(
                    "暂停结束: 本次 {}ms，累计 {}ms",
                    paused.as_millis(),
                    self.total_pause.as_millis()
                );
                true
            }
            None => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started_at.is_some()
    }

    /// 结束计时；之后所有读数保持不变
    pub fn finish(&mut self) {
        self.finish_at(Instant::now());
    }

    pub fn finish_at(&mut self, now: Instant) {
        if self.finished_at.is_some() {
            return;
        }
        self.exit_pause_at(now);
        self.mark_started_at(now);
        self.finished_at = Some(now);
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn elapsed_total_ms(&self) -> u64 {
        self.elapsed_total_ms_at(Instant::now())
    }

    pub fn elapsed_total_ms_at(&self, now: Instant) -> u64 {
        match self.start_time {
            Some(start) => {
                let end = self.finished_at.unwrap_or(now);
                millis(end.saturating_duration_since(start))
            }
            None => 0,
        }
    }

    pub fn elapsed_effective_ms(&self) -> u64 {
        self.elapsed_effective_ms_at(Instant::now())
    }

    pub fn elapsed_effective_ms_at(&self, now: Instant) -> u64 {
        self.elapsed_total_ms_at(now)
            .saturating_sub(self.total_pause_ms())
            .saturating_sub(self.current_pause_ms_at(now))
    }

    /// 已结束的暂停累计时长
    pub fn total_pause_ms(&self) -> u64 {
        millis(self.total_pause)
    }

    /// 正在进行中的暂停时长
    pub fn current_pause_ms_at(&self, now: Instant) -> u64 {
        match (self.pause_started_at, self.finished_at) {
            (Some(started), None) => millis(now.saturating_duration_since(started)),
            _ => 0,
        }
    }

    pub fn files(&self) -> &[FileTiming] {
        &self.per_file
    }

    /// 导出结构（暂停时长包含正在进行的暂停）
    pub fn report(&self) -> TimingReport {
        self.report_at(Instant::now())
    }

    pub fn report_at(&self, now: Instant) -> TimingReport {
        TimingReport {
            total_analysis_time_ms: self.elapsed_total_ms_at(now),
            effective_analysis_time_ms: self.elapsed_effective_ms_at(now),
            total_pause_time_ms: self.total_pause_ms() + self.current_pause_ms_at(now),
            files: self.per_file.clone(),
        }
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        let now = Instant::now();
        TimingSnapshot {
            total_ms: self.elapsed_total_ms_at(now),
            effective_ms: self.elapsed_effective_ms_at(now),
            pause_ms: self.total_pause_ms() + self.current_pause_ms_at(now),
            paused: self.is_paused(),
            files_processed: self.per_file.len(),
            checkpointed_files: self.per_file.iter().filter(|f| f.checkpointed).count(),
            llm_calls: self.calls.len(),
            llm_total_ms: self.calls.iter().map(|c| c.duration_ms).sum(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// 计时导出
///
/// 写入 `<export_dir>/timing_<project>.json`（最新）和带时间戳的副本
pub struct TimingExporter {
    export_dir: PathBuf,
}

impl TimingExporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// 导出计时报告，返回"最新"文件的路径
    pub async fn export(&self, project_name: &str, report: &TimingReport) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|e| StorageError::io(&self.export_dir, e))?;

        let content = serde_json::to_string_pretty(report)
            .map_err(|e| StorageError::json(&self.export_dir, e))?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let stamped = self
            .export_dir
            .join(format!("timing_{}_{}.json", project_name, timestamp));
        let latest = self.export_dir.join(format!("timing_{}.json", project_name));

        for path in [&stamped, &latest] {
            fs::write(path, &content)
                .await
                .map_err(|e| StorageError::io(path, e))?;
        }

        info!("计时文件已导出: {}", stamped.display());
        Ok(latest)
    }
}
