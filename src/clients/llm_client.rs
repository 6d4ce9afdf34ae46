/// 评分预言机客户端
///
/// 封装与 LLM API 的交互。预言机被视为不可信：这里只负责把请求送出去、
/// 把文本拿回来，结构校验由上层完成。
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::OracleError;

/// 一次结构化请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
}

/// 评分预言机
///
/// 返回原始文本；网络、鉴权、限流、超时都归为不可重试的传输错误。
#[async_trait]
pub trait GradingOracle: Send + Sync {
    /// 模型名称（用于日志）
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// 基于 OpenAI 兼容接口的客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            timeout: Duration::from_secs(config.llm_timeout_secs),
        }
    }

    /// 只有配置了 API key 时才创建客户端
    pub fn from_config(config: &Config) -> Option<Self> {
        config.has_oracle().then(|| Self::new(config))
    }

    fn transport(&self, message: impl std::fmt::Display) -> OracleError {
        OracleError::Transport {
            model: self.model_name.clone(),
            message: message.to_string(),
        }
    }

    fn build_messages(
        &self,
        request: &OracleRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, OracleError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system.as_str())
            .build()
            .map_err(|e| self.transport(e))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user.as_str())
            .build()
            .map_err(|e| self.transport(e))?;

        Ok(vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ])
    }
}

#[async_trait]
impl GradingOracle for LlmClient {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", request.user.len());

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(self.build_messages(request)?)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| self.transport(e))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(chat_request))
            .await
            .map_err(|_| {
                warn!("LLM API 调用超时: {:?}", self.timeout);
                OracleError::Timeout {
                    model: self.model_name.clone(),
                    secs: self.timeout.as_secs(),
                }
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                self.transport(e)
            })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| OracleError::SchemaViolation("LLM 返回内容为空".to_string()))?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_api_key() {
        let config = Config::default();
        assert!(LlmClient::from_config(&config).is_none());

        let config = Config {
            llm_api_key: "sk-test".to_string(),
            ..Config::default()
        };
        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.model_name(), "gpt-4o-mini");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    /// 测试真实模型连通性
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_live_completion -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_completion() {
        let _ = tracing_subscriber::fmt::try_init();

        let client = LlmClient::new(&Config::from_env());
        let request = OracleRequest {
            system: "You are a terse assistant.".to_string(),
            user: "Reply with the JSON object {\"ok\": true} and nothing else.".to_string(),
        };

        match client.complete(&request).await {
            Ok(response) => {
                println!("LLM 响应: {}", response);
                assert!(!response.is_empty());
            }
            Err(e) => panic!("LLM 调用失败: {}", e),
        }
    }
}
