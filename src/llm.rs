use anyhow::Result;
use async_openai::types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use std::time::Duration;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::prompts::{clean_excerpt, parse_translation, translation_prompt};
use crate::{LLMClient, LLMParams, TARGET_LLM_REQUEST};

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn generate_llm_response(prompt: &str, params: &LLMParams) -> Result<String> {
    let mut backoff = 2;

    debug!(target: TARGET_LLM_REQUEST, "Starting LLM response generation with {}: {}", params.model, prompt);

    for retry_count in 0..MAX_RETRIES {
        match timeout(REQUEST_TIMEOUT, send_request(prompt, params)).await {
            Ok(Ok(response_text)) if !response_text.trim().is_empty() => {
                debug!(target: TARGET_LLM_REQUEST, "LLM response received: {}", response_text);
                return Ok(response_text);
            }
            Ok(Ok(_)) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM returned an empty response");
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "Error generating response: {}", e);
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM request timed out");
            }
        }

        if retry_count < MAX_RETRIES - 1 {
            info!(target: TARGET_LLM_REQUEST, "Retrying LLM request... ({}/{})", retry_count + 1, MAX_RETRIES);
            debug!(target: TARGET_LLM_REQUEST, "Backing off for {} seconds before retry", backoff);
            sleep(Duration::from_secs(backoff)).await;
            backoff *= 2; // Exponential backoff
        }
    }

    error!(target: TARGET_LLM_REQUEST, "Failed to generate response after {} retries", MAX_RETRIES);
    anyhow::bail!("no response generated after {} attempts", MAX_RETRIES)
}

async fn send_request(prompt: &str, params: &LLMParams) -> Result<String> {
    match &params.llm_client {
        LLMClient::Ollama(ollama) => {
            let request = GenerationRequest::new(params.model.clone(), prompt.to_string())
                .options(GenerationOptions::default().temperature(params.temperature));
            let response = ollama.generate(request).await?;
            Ok(response.response)
        }
        LLMClient::OpenAI(client) => {
            let request = CreateChatCompletionRequestArgs::default()
                .model(params.model.clone())
                .temperature(params.temperature)
                .messages([ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into()])
                .build()?;
            let response = client.chat().create(request).await?;
            Ok(response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default())
        }
    }
}

/// Translated article metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub title: String,
    pub excerpt: String,
}

/// Translation adapter. Errors are handled by the caller, which keeps the original text.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, title: &str, excerpt: &str) -> Result<Translation>;
}

pub struct LlmTranslator {
    params: LLMParams,
}

impl LlmTranslator {
    pub fn new(params: LLMParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, title: &str, excerpt: &str) -> Result<Translation> {
        let cleaned = clean_excerpt(excerpt);
        let prompt = translation_prompt(title, &cleaned);
        let response = generate_llm_response(&prompt, &self.params).await?;
        let (title, excerpt) = parse_translation(&response, title, &cleaned);
        Ok(Translation { title, excerpt })
    }
}
