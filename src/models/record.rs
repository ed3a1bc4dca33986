//! 分析记录（检查点）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ErrorKind;
use crate::services::ConfigFingerprint;

/// 记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// 待处理
    Pending,
    /// 分析成功
    Success,
    /// 分析失败（非瞬时错误）
    Failure,
    /// 成功过，但配置已变更
    Incompatible,
}

/// 单个源文件的分析记录
///
/// 每次尝试都会原地覆盖；只有"按错误类型清理"会把失败记录重置为待处理。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub file_path: String,
    pub status: RecordStatus,
    pub config_fingerprint: ConfigFingerprint,
    /// 仅在 `status = failure` 时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// 产物引用（由推理方持有，这里不解析其内容）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    /// 最近一次推理调用耗时；复用检查点时为 0
    pub timing_ms: u64,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// 成功记录
    pub fn success(
        file_path: impl Into<String>,
        fingerprint: ConfigFingerprint,
        result_ref: impl Into<String>,
        timing_ms: u64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            status: RecordStatus::Success,
            config_fingerprint: fingerprint,
            error_kind: None,
            error_message: None,
            result_ref: Some(result_ref.into()),
            timing_ms,
            updated_at: Utc::now(),
        }
    }

    /// 失败记录
    pub fn failure(
        file_path: impl Into<String>,
        fingerprint: ConfigFingerprint,
        kind: ErrorKind,
        message: impl Into<String>,
        timing_ms: u64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            status: RecordStatus::Failure,
            config_fingerprint: fingerprint,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            result_ref: None,
            timing_ms,
            updated_at: Utc::now(),
        }
    }

    /// 在给定指纹下是否可以直接复用
    pub fn is_reusable(&self, current: &ConfigFingerprint) -> bool {
        self.status == RecordStatus::Success && self.config_fingerprint.is_compatible(current)
    }

    /// 重置为待处理，清除错误信息
    pub fn reset_to_pending(&mut self) {
        self.status = RecordStatus::Pending;
        self.error_kind = None;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    /// 标记为配置不兼容
    pub fn mark_incompatible(&mut self) {
        self.status = RecordStatus::Incompatible;
        self.updated_at = Utc::now();
    }
}
