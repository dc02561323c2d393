// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::engines::traits::EngineError;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// 一次补全请求
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub api_key: String,
    pub system: String,
    pub prompt: String,
    pub timeout: Duration,
}

/// 模型的回答
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// 语言模型协作者
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, EngineError>;
}

/// OpenAI 兼容的模型服务
///
/// 调用 `{base_url}/chat/completions`，API密钥由每次请求携带
pub struct OpenAiCompatibleModel {
    client: reqwest::Client,
    model: String,
    api_base_url: String,
}

impl OpenAiCompatibleModel {
    pub fn new(api_base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    /// 发送一次对话补全
    ///
    /// # 参数
    ///
    /// * `request` - 系统提示、用户提示以及API密钥
    ///
    /// # 返回值
    ///
    /// * `Ok(Completion)` - 模型回答及令牌用量
    /// * `Err(EngineError)` - 401/403 为认证失败，其他失败为模型错误
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, EngineError> {
        let request_body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt }
            ],
            "temperature": 0.0
        });

        let url = format!("{}/chat/completions", self.api_base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&request.api_key)
            .timeout(request.timeout)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    EngineError::Unauthorized(error_text)
                }
                _ => EngineError::Model(format!("LLM API returned error: {} - {}", status, error_text)),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Model(format!("Failed to parse LLM API response: {}", e)))?;

        let usage = match body.get("usage") {
            Some(usage_val) => TokenUsage {
                prompt_tokens: usage_val["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: usage_val["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: usage_val["total_tokens"].as_u64().unwrap_or(0) as u32,
            },
            None => TokenUsage::default(),
        };

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EngineError::Model("Invalid response format from LLM API".to_string()))?;

        Ok(Completion {
            content: content.to_string(),
            model: body["model"].as_str().unwrap_or(&self.model).to_string(),
            usage,
        })
    }
}

/// 去掉模型回答外层的 Markdown 代码块标记
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 跳过语言标记（如 ```json、```html）
    let rest = match rest.find('\n') {
        Some(idx) if !rest[..idx].contains(char::is_whitespace) => &rest[idx + 1..],
        _ => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            api_key: "sk-test".to_string(),
            system: "You extract content.".to_string(),
            prompt: "Summarize".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_code_fences("  plain text  "), "plain text");
    }

    #[tokio::test]
    async fn test_completion_returns_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini",
                "choices": [{ "message": { "content": "# Title" } }],
                "usage": { "prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13 }
            })))
            .mount(&server)
            .await;

        let model = OpenAiCompatibleModel::new(server.uri(), "gpt-4o-mini");
        let completion = model.complete(request()).await.unwrap();

        assert_eq!(completion.content, "# Title");
        assert_eq!(completion.model, "gpt-4o-mini");
        assert_eq!(completion.usage.total_tokens, 13);
    }

    #[tokio::test]
    async fn test_unauthorized_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let model = OpenAiCompatibleModel::new(server.uri(), "gpt-4o-mini");
        let err = model.complete(request()).await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_missing_choices_is_model_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let model = OpenAiCompatibleModel::new(server.uri(), "gpt-4o-mini");
        let err = model.complete(request()).await.unwrap_err();
        assert!(matches!(err, EngineError::Model(_)));
    }
}
