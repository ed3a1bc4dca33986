use std::path::PathBuf;

use thiserror::Error;

use crate::models::ErrorKind;

/// 检查点存储错误
///
/// 不在本层重试，直接向调用方传播
#[derive(Debug, Error)]
pub enum StorageError {
    /// 持久化层不可用
    #[error("记录存储不可用: {reason}")]
    Unavailable { reason: String },
    /// 读写文件失败
    #[error("记录文件读写失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 记录序列化/反序列化失败
    #[error("记录 JSON 处理失败 ({path}): {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 批处理生命周期错误
#[derive(Debug, Error)]
pub enum BatchError {
    /// 已有正在运行的批次
    #[error("已有批次正在运行 (session: {session_id})")]
    AlreadyRunning { session_id: String },
    /// 当前没有批次
    #[error("当前没有批次")]
    NoSession,
    /// 自动重试次数耗尽
    #[error("API 自动重试已耗尽 ({kind}): 共尝试 {attempts} 次")]
    ExhaustedRetries { kind: ErrorKind, attempts: u32 },
    /// 检查点无法写入，批次无法继续
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// 后台工作任务异常退出
    #[error("批处理工作任务异常退出: {0}")]
    WorkerFailed(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl StorageError {
    /// 创建文件读写错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// 创建 JSON 处理错误
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StorageError::Json {
            path: path.into(),
            source,
        }
    }
}

impl ConfigError {
    /// 创建配置值不合法错误
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
