//! OpenAI 兼容客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行对话补全
//! - 连通性探测直接请求 `GET {base}/models`

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::inference::{
    read_source, ArtifactWriter, ConnectivityProbe, InferenceFailure, InferenceInvoker,
    InferenceOutput,
};
use crate::config::{AnalysisConfig, Config};
use crate::services::build_analysis_prompt;
use crate::utils::truncate_text;

/// OpenAI 兼容推理客户端
///
/// 兼容 OpenAI API 的服务（如 Azure、vLLM、Doubao 等）都可以使用
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    artifacts: ArtifactWriter,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.analysis.model.clone(),
            artifacts: ArtifactWriter::new(config.results_dir()),
        }
    }

    async fn chat(
        &self,
        system_message: &str,
        user_message: &str,
        config: &AnalysisConfig,
    ) -> Result<String, InferenceFailure> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(|e| InferenceFailure::new(e.to_string()))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| InferenceFailure::new(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&config.model)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(config.temperature)
            .build()
            .map_err(|e| InferenceFailure::new(e.to_string()))?;

        // 错误信息里带有状态码与 rate limit / quota 等关键字，交给分类器识别
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| InferenceFailure::new(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| InferenceFailure::new("LLM 返回内容为空"))
    }
}

#[async_trait]
impl InferenceInvoker for OpenAiClient {
    async fn invoke(
        &self,
        file_path: &str,
        config: &AnalysisConfig,
    ) -> Result<InferenceOutput, InferenceFailure> {
        let code = read_source(file_path).await?;
        let prompt = build_analysis_prompt(file_path, &code, config);

        debug!("调用 LLM API，模型: {}", config.model);
        let response = self
            .chat(&prompt.system, &prompt.user, config)
            .await
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", truncate_text(&e.to_string(), 200));
                e
            })?;

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

/// OpenAI 兼容服务的连通性探测
pub struct OpenAiProbe {
    client: reqwest::Client,
    models_url: String,
    api_key: String,
}

impl OpenAiProbe {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            models_url: format!("{}/models", config.llm_api_base_url.trim_end_matches('/')),
            api_key: config.llm_api_key.clone(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for OpenAiProbe {
    async fn probe(&self) -> bool {
        let mut request = self.client.get(&self.models_url);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("LLM API 探测失败: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_models_url() {
        let config = Config {
            llm_api_base_url: "https://api.example.com/v1/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            OpenAiProbe::new(&config).models_url,
            "https://api.example.com/v1/models"
        );
    }

    #[test]
    fn test_client_uses_configured_model() {
        let mut config = Config::default();
        config.analysis.model = "gpt-4o-mini".to_string();
        assert_eq!(OpenAiClient::new(&config).model_name(), "gpt-4o-mini");
    }
}
