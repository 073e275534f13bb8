pub mod article;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod environment;
pub mod feed;
pub mod filter;
pub mod llm;
pub mod logging;
pub mod message;
pub mod messaging;
pub mod monitor;
pub mod prompts;
pub mod render;
pub mod scheduler;
pub mod store;
pub mod web;

#[cfg(test)]
mod testing;

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;
use tracing::info;

use crate::config::{LlmBackend, LlmSettings};

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_DISPATCH: &str = "dispatch";

#[derive(Clone, Debug)]
pub enum LLMClient {
    Ollama(Ollama),
    OpenAI(OpenAIClient<OpenAIConfig>),
}

#[derive(Clone)]
pub struct LLMParams {
    pub llm_client: LLMClient,
    pub model: String,
    pub temperature: f32,
}

impl LLMParams {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let llm_client = match &settings.backend {
            LlmBackend::OpenAI { api_key } => {
                let config = OpenAIConfig::new().with_api_key(api_key.clone());
                LLMClient::OpenAI(OpenAIClient::with_config(config))
            }
            LlmBackend::Ollama { host, port } => {
                let host = if host.contains("://") {
                    host.clone()
                } else {
                    format!("http://{}", host)
                };
                info!("Connecting to Ollama at {}:{}", host, port);
                LLMClient::Ollama(Ollama::new(host, *port))
            }
        };

        Self {
            llm_client,
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }
}
