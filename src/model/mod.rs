use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::web::models::Turn;

/// Body of one inference call.
#[derive(Debug, Serialize)]
pub struct InferenceInput {
    pub messages: Vec<Turn>,
    pub max_tokens: u32,
}

/// A hosted model that answers a list of messages.
///
/// The result is returned as untyped JSON since its shape is decided by the
/// provider; `None` means the provider answered with nothing at all.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn run(&self, model_id: &str, input: &InferenceInput) -> Result<Option<Value>>;
}

// A wrapper for the Workers AI REST API
pub struct WorkersAiClient {
    base_url: String,
    account_id: String,
    api_token: String,
    client: Client,
}

impl WorkersAiClient {
    pub fn new(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        info!("Using Workers AI at: {}", base_url);

        Self {
            base_url,
            account_id: account_id.into(),
            api_token: api_token.into(),
            client: Client::new(),
        }
    }

    fn run_url(&self, model_id: &str) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url, self.account_id, model_id
        )
    }
}

#[async_trait]
impl InferenceClient for WorkersAiClient {
    async fn run(&self, model_id: &str, input: &InferenceInput) -> Result<Option<Value>> {
        let url = self.run_url(model_id);
        info!(
            "Running {} with {} messages (max_tokens: {})",
            model_id,
            input.messages.len(),
            input.max_tokens
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(input)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Response body: {}", body);

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| envelope_errors(&v))
                .unwrap_or(body);
            return Err(anyhow!("Workers AI request failed ({}): {}", status, detail));
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        let mut envelope: Value = serde_json::from_str(&body)?;
        if envelope.get("success").and_then(Value::as_bool) == Some(false) {
            let detail = envelope_errors(&envelope).unwrap_or_else(|| "unknown error".to_string());
            return Err(anyhow!("Workers AI request failed: {}", detail));
        }

        // The model's own output sits under `result`.
        let result = envelope
            .get_mut("result")
            .map(Value::take)
            .filter(|result| !result.is_null());
        Ok(result)
    }
}

// Joins `errors[].message` from a Cloudflare API envelope.
fn envelope_errors(envelope: &Value) -> Option<String> {
    let messages: Vec<&str> = envelope
        .get("errors")?
        .as_array()?
        .iter()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .collect();
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}
