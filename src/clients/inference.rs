//! 外部协作方接口
//!
//! 推理调用与连通性探测都以 trait 注入，编排层不关心具体后端

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::AnalysisConfig;

/// 推理成功的输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceOutput {
    /// 产物引用（例如结果文件路径）
    pub result_ref: String,
    /// 响应长度（字符数，仅用于日志）
    pub response_chars: usize,
}

/// 推理失败
///
/// 携带足够的信息供错误分类使用
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct InferenceFailure {
    pub status_code: Option<u16>,
    pub message: String,
    /// 请求超过了截止时间
    pub timed_out: bool,
    /// 本地失败（读源文件 / 写产物），与 API 无关
    pub local: bool,
}

impl InferenceFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            timed_out: false,
            local: false,
        }
    }

    pub fn with_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
            timed_out: false,
            local: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            timed_out: true,
            local: false,
        }
    }

    /// 本地 I/O 失败，始终归为 general
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            timed_out: false,
            local: true,
        }
    }

    fn describe(&self) -> String {
        match self.status_code {
            Some(code) => format!("HTTP {}: {}", code, self.message),
            None => self.message.clone(),
        }
    }
}

/// 推理调用方
#[async_trait]
pub trait InferenceInvoker: Send + Sync {
    /// 对单个文件执行推理
    async fn invoke(
        &self,
        file_path: &str,
        config: &AnalysisConfig,
    ) -> Result<InferenceOutput, InferenceFailure>;

    /// 模型名（用于计时记录）
    fn model_name(&self) -> &str;
}

/// 连通性探测
///
/// 只在自动暂停的重试阶段使用，不占用批次名额
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// 读取待分析的源文件
///
/// 读取失败视为该文件的推理失败（会被归为 general）。
/// 非 UTF-8 字节按替换字符处理，旧编码的源文件照样分析。
pub async fn read_source(file_path: &str) -> Result<String, InferenceFailure> {
    let bytes = tokio::fs::read(file_path)
        .await
        .map_err(|e| InferenceFailure::local(format!("读取源文件失败 {}: {}", file_path, e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// 推理产物写入器
///
/// 把模型原始响应写到结果目录，返回的路径作为 `result_ref`
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    results_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub async fn write(
        &self,
        file_path: &str,
        model: &str,
        response: &str,
    ) -> Result<String, InferenceFailure> {
        tokio::fs::create_dir_all(&self.results_dir)
            .await
            .map_err(|e| InferenceFailure::local(format!("创建结果目录失败: {}", e)))?;

        let digest = hex::encode(Sha256::digest(file_path.as_bytes()));
        let base = Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "result".to_string());
        let path = self
            .results_dir
            .join(format!("{}-{}.json", base, &digest[..16]));

        let artifact = json!({
            "file_path": file_path,
            "model": model,
            "response": response,
            "generated_at": Utc::now().to_rfc3339(),
        });
        let content = serde_json::to_string_pretty(&artifact)
            .map_err(|e| InferenceFailure::local(format!("序列化结果失败: {}", e)))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| InferenceFailure::local(format!("写入结果失败 {}: {}", path.display(), e)))?;

        Ok(path.to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        assert_eq!(
            InferenceFailure::with_status(429, "slow down").to_string(),
            "HTTP 429: slow down"
        );
        assert!(InferenceFailure::timeout("deadline").timed_out);
    }

    #[tokio::test]
    async fn test_artifact_writer_returns_path() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("results"));
        let result_ref = writer.write("src/main.c", "codellama:7b", "analysis").await.unwrap();

        assert!(result_ref.contains("main.c-"));
        let content = std::fs::read_to_string(&result_ref).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["response"], "analysis");
        assert_eq!(value["model"], "codellama:7b");
    }

    #[tokio::test]
    async fn test_read_source_missing_file() {
        let err = read_source("/definitely/not/here.c").await.unwrap_err();
        assert!(err.message.contains("读取源文件失败"));
        assert_eq!(err.status_code, None);
        assert!(err.local);
    }

    #[tokio::test]
    async fn test_read_source_accepts_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.c");
        // "/* café */" 的 Latin-1 编码
        std::fs::write(&path, b"/* caf\xe9 */\nint x;\n").unwrap();

        let code = read_source(&path.to_string_lossy()).await.unwrap();
        assert!(code.starts_with("/* caf"));
        assert!(code.contains('\u{FFFD}'));
        assert!(code.contains("int x;"));
    }
}
