use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;

use super::{ChatMessage, ChatOutcome, ChatProvider};

pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

pub fn azure_chat_completions_url(
    resource_name: &str,
    deployment_id: &str,
    api_version: &str,
) -> String {
    format!(
        "https://{resource_name}.openai.azure.com/openai/deployments/{deployment_id}/chat/completions?api-version={api_version}"
    )
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

enum Auth {
    Bearer(String),
    AzureApiKey(String),
}

// Non-streaming chat-completions provider for OpenAI-compatible endpoints,
// including Azure OpenAI deployments.
pub struct OpenAiCompatibleProvider {
    client: Client,
    url: String,
    auth: Auth,
    model_name: String,
    temperature: Option<f32>,
    max_completion_tokens: Option<u32>,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: &str, api_key: &str, model_name: &str) -> Self {
        Self {
            client: Client::new(),
            url: chat_completions_url(base_url),
            auth: Auth::Bearer(api_key.to_string()),
            model_name: model_name.to_string(),
            temperature: Some(0.7),
            max_completion_tokens: Some(512),
        }
    }

    // Azure addresses the model by deployment, not by model name, and
    // authenticates with an `api-key` header instead of a bearer token.
    pub fn azure(
        resource_name: &str,
        deployment_id: &str,
        api_version: &str,
        api_key: &str,
    ) -> Self {
        Self {
            client: Client::new(),
            url: azure_chat_completions_url(resource_name, deployment_id, api_version),
            auth: Auth::AzureApiKey(api_key.to_string()),
            model_name: deployment_id.to_string(),
            temperature: Some(0.7),
            max_completion_tokens: Some(512),
        }
    }
}

pub fn completion_content(body: &Value) -> String {
    body["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

impl ChatProvider for OpenAiCompatibleProvider {
    fn complete(
        &self,
        messages: &[ChatMessage],
        as_json: bool,
        timeout: Duration,
    ) -> Result<ChatOutcome> {
        let wire: Vec<WireMessage<'_>> = messages
            .iter()
            .map(|m| WireMessage {
                role: &m.role,
                content: &m.content,
            })
            .collect();
        let req = ChatCompletionsRequest {
            model: &self.model_name,
            messages: wire,
            temperature: self.temperature,
            max_completion_tokens: self.max_completion_tokens,
            response_format: as_json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut builder = self.client.post(&self.url).json(&req).timeout(timeout);
        builder = match &self.auth {
            Auth::Bearer(key) => builder.bearer_auth(key),
            Auth::AzureApiKey(key) => builder.header("api-key", key),
        };

        let resp = match builder.send() {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Ok(ChatOutcome::TimedOut),
            Err(e) => return Err(e.into()),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(anyhow!("chat completions request failed: HTTP {status} {body}"));
        }

        let body: Value = match resp.json() {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Ok(ChatOutcome::TimedOut),
            Err(e) => return Err(e.into()),
        };
        Ok(ChatOutcome::Reply(completion_content(&body)))
    }
}
