//! 程序配置
//!
//! 加载顺序：默认值 → TOML 配置文件（可选）→ 环境变量覆盖 → 校验

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "batch_config.toml";

/// 推理后端
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceBackend {
    /// 本地 Ollama 服务
    Ollama,
    /// 兼容 OpenAI API 的服务
    OpenAiCompatible,
}

impl FromStr for InferenceBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(InferenceBackend::Ollama),
            "openai" | "openai_compatible" => Ok(InferenceBackend::OpenAiCompatible),
            other => Err(ConfigError::invalid("backend", format!("未知后端: {}", other))),
        }
    }
}

/// 影响分析输出的配置
///
/// 只有这里的字段参与配置指纹；纯展示类选项放在 [`Config`] 上。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 模型名称
    pub model: String,
    /// 分析深度（basic / intermediate / detailed）
    pub analysis_level: String,
    /// 是否分析注释
    pub include_comments: bool,
    /// 是否分析依赖关系
    pub analyze_dependencies: bool,
    /// 源码语言
    pub language: String,
    /// 上下文窗口大小
    pub context_size: u32,
    /// 采样温度
    pub temperature: f32,
    /// 其他会改变推理结果的选项
    pub extra_options: BTreeMap<String, serde_json::Value>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "codellama:7b".to_string(),
            analysis_level: "detailed".to_string(),
            include_comments: true,
            analyze_dependencies: true,
            language: "c".to_string(),
            context_size: 4096,
            temperature: 0.7,
            extra_options: BTreeMap::new(),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 分析参数（参与指纹）
    pub analysis: AnalysisConfig,
    /// 推理后端
    pub backend: InferenceBackend,
    /// 推理服务地址
    pub llm_api_base_url: String,
    /// API 密钥（OpenAI 兼容后端使用）
    pub llm_api_key: String,
    /// 待分析的项目目录
    pub project_dir: String,
    /// 项目名称（用于计时导出文件名）
    pub project_name: String,
    /// 检查点与导出文件根目录
    pub storage_dir: String,
    /// 自动暂停后的重试间隔（秒）
    pub retry_interval_secs: u64,
    /// 最大重试次数
    pub max_attempts: u32,
    /// 单次推理调用的超时（秒）
    pub inference_timeout_secs: u64,
    /// 连通性探测超时（秒）
    pub probe_timeout_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            backend: InferenceBackend::Ollama,
            llm_api_base_url: "http://localhost:11434".to_string(),
            llm_api_key: String::new(),
            project_dir: "inspecao".to_string(),
            project_name: "project".to_string(),
            storage_dir: "storage".to_string(),
            retry_interval_secs: 30 * 60,
            max_attempts: 10,
            inference_timeout_secs: 1200,
            probe_timeout_secs: 10,
            verbose_logging: false,
            output_log_file: "analysis_log.txt".to_string(),
        }
    }
}

/// 批处理生命周期参数
///
/// 用 `Duration` 表示，测试中可以使用毫秒级的间隔。
#[derive(Clone, Debug)]
pub struct BatchSettings {
    pub retry_interval: Duration,
    pub max_attempts: u32,
    pub inference_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Config::default().batch_settings()
    }
}

impl Config {
    /// 按 默认值 → 配置文件 → 环境变量 的顺序加载配置
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("BATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let base = if Path::new(&path).exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };

        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 只读取环境变量（其余使用默认值）
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 使用环境变量覆盖配置
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_parse::<InferenceBackend>("LLM_BACKEND")? {
            self.backend = v;
        }
        if let Ok(v) = std::env::var("LLM_API_BASE_URL") {
            self.llm_api_base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            self.llm_api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL_NAME") {
            self.analysis.model = v;
        }
        if let Ok(v) = std::env::var("ANALYSIS_LEVEL") {
            self.analysis.analysis_level = v;
        }
        if let Ok(v) = std::env::var("ANALYSIS_LANGUAGE") {
            self.analysis.language = v;
        }
        if let Some(v) = env_parse("INCLUDE_COMMENTS")? {
            self.analysis.include_comments = v;
        }
        if let Some(v) = env_parse("ANALYZE_DEPENDENCIES")? {
            self.analysis.analyze_dependencies = v;
        }
        if let Ok(v) = std::env::var("PROJECT_DIR") {
            self.project_dir = v;
        }
        if let Ok(v) = std::env::var("PROJECT_NAME") {
            self.project_name = v;
        }
        if let Ok(v) = std::env::var("STORAGE_DIR") {
            self.storage_dir = v;
        }
        if let Some(v) = env_parse("RETRY_INTERVAL_SECS")? {
            self.retry_interval_secs = v;
        }
        if let Some(v) = env_parse("MAX_ATTEMPTS")? {
            self.max_attempts = v;
        }
        if let Some(v) = env_parse("INFERENCE_TIMEOUT_SECS")? {
            self.inference_timeout_secs = v;
        }
        if let Some(v) = env_parse("PROBE_TIMEOUT_SECS")? {
            self.probe_timeout_secs = v;
        }
        if let Some(v) = env_parse("VERBOSE_LOGGING")? {
            self.verbose_logging = v;
        }
        if let Ok(v) = std::env::var("OUTPUT_LOG_FILE") {
            self.output_log_file = v;
        }
        Ok(self)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "至少为 1"));
        }
        if self.retry_interval_secs == 0 {
            return Err(ConfigError::invalid("retry_interval_secs", "必须大于 0"));
        }
        if self.inference_timeout_secs == 0 {
            return Err(ConfigError::invalid("inference_timeout_secs", "必须大于 0"));
        }
        if self.analysis.model.trim().is_empty() {
            return Err(ConfigError::invalid("analysis.model", "模型名称不能为空"));
        }
        Ok(())
    }

    /// 生命周期参数
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            max_attempts: self.max_attempts,
            inference_timeout: Duration::from_secs(self.inference_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        Path::new(&self.storage_dir).join("data")
    }

    pub fn results_dir(&self) -> PathBuf {
        Path::new(&self.storage_dir).join("results")
    }

    pub fn export_dir(&self) -> PathBuf {
        Path::new(&self.storage_dir).join("export")
    }
}

/// 读取并解析环境变量；不存在时返回 `None`
fn env_parse<T: FromStr>(var_name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_interval_secs, 1800);
        assert_eq!(config.max_attempts, 10);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = Config {
            max_attempts: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "max_attempts"
        ));
    }

    #[test]
    fn test_toml_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_config.toml");
        std::fs::write(
            &path,
            r#"
max_attempts = 3
backend = "open_ai_compatible"

[analysis]
model = "qwen2.5-coder"
"#,
        )
        .unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backend, InferenceBackend::OpenAiCompatible);
        assert_eq!(config.analysis.model, "qwen2.5-coder");
        assert_eq!(config.analysis.context_size, 4096);
        assert_eq!(config.retry_interval_secs, 1800);
    }

    #[test]
    fn test_toml_parse_error_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "max_attempts = [").unwrap();

        let err = Config::from_toml_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseFailed { .. }));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Ollama".parse::<InferenceBackend>().unwrap(), InferenceBackend::Ollama);
        assert_eq!(
            "openai".parse::<InferenceBackend>().unwrap(),
            InferenceBackend::OpenAiCompatible
        );
        assert!("bedrock".parse::<InferenceBackend>().is_err());
    }

    #[test]
    fn test_batch_settings_durations() {
        let settings = Config::default().batch_settings();
        assert_eq!(settings.retry_interval, Duration::from_secs(1800));
        assert_eq!(settings.inference_timeout, Duration::from_secs(1200));
    }
}
