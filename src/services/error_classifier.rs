//! 错误分类 - 业务能力层
//!
//! 把一次推理失败（状态码 / 消息）映射到固定的错误类型

use regex::Regex;

use crate::clients::InferenceFailure;
use crate::models::ErrorKind;

const RATE_LIMIT_MARKERS: &[&str] = &[
    "too many requests",
    "rate limit",
    "rate limited",
    "rate_limit",
    "quota exceeded",
    "quota limit",
    "usage limit",
    "limit exceeded",
    "you've reached",
    "hourly usage limit",
    "daily usage limit",
];

const QUOTA_MARKERS: &[&str] = &[
    "forbidden",
    "access denied",
    "billing",
    "payment required",
    "subscription required",
    "plan limit",
    "usage cap",
    "insufficient_quota",
];

const VRAM_MARKERS: &[&str] = &[
    "requires more system memory",
    "vram",
    "out of memory",
    "cuda error",
];

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "deadline exceeded"];

const MODEL_MARKERS: &[&str] = &[
    "model not found",
    "model unavailable",
    "model does not exist",
    "invalid model",
    "unknown model",
];

/// 错误分类器
///
/// 规则按优先级依次匹配：
/// 429/限流 → 403/配额 → 显存 → 超时 → 模型不存在 → 5xx → 其他
pub struct ErrorClassifier {
    status_pattern: Option<Regex>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self {
            // 只认紧跟在 HTTP / status / code / error 之后的三位状态码，
            // 文件名里的数字（如 403.c）不算
            status_pattern: Regex::new(r"(?i)\b(?:http|status|code|error)\b[\s:=(]*([45]\d\d)\b").ok(),
        }
    }

    /// 分类一次失败
    pub fn classify(&self, failure: &InferenceFailure) -> ErrorKind {
        if failure.local {
            return ErrorKind::General;
        }
        let message = failure.message.to_lowercase();
        let codes = self.status_codes(failure);
        let has_code = |code: u16| codes.contains(&code);

        if has_code(429) || contains_any(&message, RATE_LIMIT_MARKERS) {
            return ErrorKind::RateLimit;
        }
        if has_code(403) || contains_any(&message, QUOTA_MARKERS) {
            return ErrorKind::QuotaExceeded;
        }
        if contains_any(&message, VRAM_MARKERS) {
            return ErrorKind::Vram;
        }
        if failure.timed_out || contains_any(&message, TIMEOUT_MARKERS) {
            return ErrorKind::Timeout;
        }
        if contains_any(&message, MODEL_MARKERS)
            || (message.contains("model") && message.contains("not found"))
        {
            return ErrorKind::ModelUnavailable;
        }
        if codes.iter().any(|c| (500..600).contains(c)) {
            return ErrorKind::ApiError;
        }
        ErrorKind::General
    }

    /// 显式状态码加上消息里出现的状态码
    fn status_codes(&self, failure: &InferenceFailure) -> Vec<u16> {
        let mut codes: Vec<u16> = failure.status_code.into_iter().collect();
        if let Some(re) = &self.status_pattern {
            codes.extend(
                re.captures_iter(&failure.message)
                    .filter_map(|cap| cap.get(1))
                    .filter_map(|m| m.as_str().parse::<u16>().ok()),
            );
        }
        codes
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(failure: InferenceFailure) -> ErrorKind {
        ErrorClassifier::new().classify(&failure)
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(classify(InferenceFailure::with_status(429, "slow down")), ErrorKind::RateLimit);
        assert_eq!(classify(InferenceFailure::with_status(403, "nope")), ErrorKind::QuotaExceeded);
        assert_eq!(classify(InferenceFailure::with_status(502, "bad gateway")), ErrorKind::ApiError);
        assert_eq!(classify(InferenceFailure::with_status(400, "bad request")), ErrorKind::General);
    }

    #[test]
    fn test_message_markers() {
        assert_eq!(
            classify(InferenceFailure::new("Erro na geração: 429 - Too Many Requests")),
            ErrorKind::RateLimit
        );
        assert_eq!(
            classify(InferenceFailure::new("You've reached your hourly usage limit")),
            ErrorKind::RateLimit
        );
        assert_eq!(
            classify(InferenceFailure::new("billing hard limit has been reached")),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify(InferenceFailure::new("model requires more system memory (9.1 GiB) than is available")),
            ErrorKind::Vram
        );
        assert_eq!(
            classify(InferenceFailure::new("model 'llama9' not found, try pulling it first")),
            ErrorKind::ModelUnavailable
        );
        assert_eq!(
            classify(InferenceFailure::new("Model not found: llama9")),
            ErrorKind::ModelUnavailable
        );
        assert_eq!(
            classify(InferenceFailure::new("HTTP status server error (503 Service Unavailable)")),
            ErrorKind::ApiError
        );
        assert_eq!(classify(InferenceFailure::new("connection reset")), ErrorKind::General);
    }

    #[test]
    fn test_timeout_flag_and_marker() {
        assert_eq!(classify(InferenceFailure::timeout("deadline")), ErrorKind::Timeout);
        assert_eq!(classify(InferenceFailure::new("request timed out")), ErrorKind::Timeout);
    }

    #[test]
    fn test_priority_order() {
        // 限流优先于超时与 5xx
        assert_eq!(
            classify(InferenceFailure::timeout("429 rate limit while waiting")),
            ErrorKind::RateLimit
        );
        // 显存优先于 5xx
        assert_eq!(
            classify(InferenceFailure::with_status(500, "CUDA error: out of memory")),
            ErrorKind::Vram
        );
        // 超时优先于模型不存在
        assert_eq!(
            classify(InferenceFailure::new("timeout: unknown model")),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn test_local_failures_are_general() {
        let unreadable = InferenceFailure::local("读取源文件失败 /src/403.c: Permission denied");
        assert_eq!(classify(unreadable), ErrorKind::General);
        let write = InferenceFailure::local("写入结果失败 results/429.c.json: disk full, timed out");
        assert_eq!(classify(write), ErrorKind::General);
    }

    #[test]
    fn test_file_names_are_not_status_codes() {
        assert_eq!(
            classify(InferenceFailure::new("failed to open /src/403.c")),
            ErrorKind::General
        );
        assert_eq!(
            classify(InferenceFailure::new("status: 429 on /src/main.c")),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_numbers_inside_words_are_not_status_codes() {
        assert_eq!(
            classify(InferenceFailure::new("line 15003 failed to parse")),
            ErrorKind::General
        );
    }
}
