//! Ollama 客户端
//!
//! 通过 `/api/generate` 执行分析，通过 `/api/tags` 探测服务是否可用

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::clients::inference::{
    read_source, ArtifactWriter, ConnectivityProbe, InferenceFailure, InferenceInvoker,
    InferenceOutput,
};
use crate::config::{AnalysisConfig, Config};
use crate::services::build_analysis_prompt;
use crate::utils::truncate_text;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama 推理客户端
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model_name: String,
    artifacts: ArtifactWriter,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.inference_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.llm_api_base_url.trim_end_matches('/').to_string(),
            model_name: config.analysis.model.clone(),
            artifacts: ArtifactWriter::new(config.results_dir()),
        }
    }

    async fn generate(&self, prompt: &str, config: &AnalysisConfig) -> Result<String, InferenceFailure> {
        let payload = json!({
            "model": config.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_ctx": config.context_size,
                "temperature": config.temperature,
            }
        });

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceFailure::with_status(status.as_u16(), body));
        }

        let data: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| InferenceFailure::new(format!("解析 Ollama 响应失败: {}", e)))?;
        Ok(data.response)
    }
}

#[async_trait]
impl InferenceInvoker for OllamaClient {
    async fn invoke(
        &self,
        file_path: &str,
        config: &AnalysisConfig,
    ) -> Result<InferenceOutput, InferenceFailure> {
        let code = read_source(file_path).await?;
        let prompt = build_analysis_prompt(file_path, &code, config);
        let full_prompt = format!("{}\n\n{}", prompt.system, prompt.user);

        debug!("调用 Ollama，模型: {}，提示词 {} 字符", config.model, full_prompt.len());
        let start = Instant::now();
        let response = self.generate(&full_prompt, config).await.map_err(|e| {
            warn!("Ollama 调用失败: {}", truncate_text(&e.to_string(), 200));
            e
        })?;
        info!(
            "⏱️ 模型 '{}' 响应耗时: {:.2} 秒",
            config.model,
            start.elapsed().as_secs_f64()
        );

        let result_ref = self.artifacts.write(file_path, &config.model, &response).await?;
        Ok(InferenceOutput {
            result_ref,
            response_chars: response.chars().count(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Ollama 连通性探测
pub struct OllamaProbe {
    client: Client,
    base_url: String,
}

impl OllamaProbe {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.llm_api_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for OllamaProbe {
    async fn probe(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Ollama 探测失败: {}", e);
                false
            }
        }
    }
}

/// reqwest 错误转为推理失败
pub(crate) fn map_request_error(e: reqwest::Error) -> InferenceFailure {
    if e.is_timeout() {
        return InferenceFailure::timeout(format!("请求超时: {}", e));
    }
    match e.status() {
        Some(status) => InferenceFailure::with_status(status.as_u16(), e.to_string()),
        None => InferenceFailure::new(format!("请求失败: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let config = Config {
            llm_api_base_url: "http://localhost:11434/".to_string(),
            ..Config::default()
        };
        let probe = OllamaProbe::new(&config);
        assert_eq!(probe.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_probe_unreachable_server() {
        let config = Config {
            llm_api_base_url: "http://127.0.0.1:9".to_string(),
            probe_timeout_secs: 1,
            ..Config::default()
        };
        assert!(!OllamaProbe::new(&config).probe().await);
    }

    #[tokio::test]
    #[ignore] // 需要本地运行 Ollama
    async fn test_real_ollama_probe() {
        let config = Config::default();
        assert!(OllamaProbe::new(&config).probe().await);
    }
}
