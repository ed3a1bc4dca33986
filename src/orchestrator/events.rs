//! 进度与完成事件
//!
//! 回调在工作任务中调用，每个事件恰好一次，按文件顺序；
//! 需要切换到 UI 线程时由调用方自行转发

use std::sync::Arc;

use serde::Serialize;

use crate::error::BatchError;
use crate::models::{AnalysisRecord, ErrorKind};

/// 单个文件的处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressOutcome {
    /// 复用检查点
    Checkpointed { record: AnalysisRecord },
    /// 推理成功
    Completed { record: AnalysisRecord },
    /// 非瞬时失败，批次继续
    Failed { kind: ErrorKind, message: String },
}

/// 进度事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub session_id: String,
    /// 0..=100
    pub percent: u8,
    pub index: usize,
    pub total: usize,
    pub file_path: String,
    pub outcome: ProgressOutcome,
}

impl ProgressEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ProgressOutcome::Failed { .. })
    }
}

/// 进度回调
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// 完成回调：按文件顺序的结果，以及使批次终止的错误（正常完成或取消时为 None）
pub type CompletionCallback = Arc<dyn Fn(&[AnalysisRecord], Option<&BatchError>) + Send + Sync>;
