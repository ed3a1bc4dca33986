//! 错误类型
//!
//! 决定一次失败是"暂停并重试"还是"记录失败并继续"

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 推理失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 请求频率限制（HTTP 429）
    RateLimit,
    /// 配额耗尽 / 无权限（HTTP 403）
    QuotaExceeded,
    /// 显存不足
    Vram,
    /// 请求超时
    Timeout,
    /// 模型不存在
    ModelUnavailable,
    /// 服务端错误（HTTP 5xx）
    ApiError,
    /// 其他错误
    General,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::RateLimit,
        ErrorKind::QuotaExceeded,
        ErrorKind::Vram,
        ErrorKind::Timeout,
        ErrorKind::ModelUnavailable,
        ErrorKind::ApiError,
        ErrorKind::General,
    ];

    /// 是否为瞬时错误（触发自动暂停）
    ///
    /// 只有 `RateLimit` 和 `QuotaExceeded` 是瞬时的，其余都只影响当前文件。
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::QuotaExceeded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::Vram => "vram",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::ApiError => "api_error",
            ErrorKind::General => "general",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("未知错误类型: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limit_and_quota_are_transient() {
        let transient: Vec<ErrorKind> = ErrorKind::ALL
            .into_iter()
            .filter(|k| k.is_transient())
            .collect();
        assert_eq!(transient, vec![ErrorKind::RateLimit, ErrorKind::QuotaExceeded]);
    }

    #[test]
    fn test_from_str_matches_serde_names() {
        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
        assert!("oom".parse::<ErrorKind>().is_err());
    }
}
