use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use log::info;

const DEFAULT_MODEL_ID: &str = "@cf/meta/llama-3.2-11b-vision-instruct";
const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_ASSISTANT_NAME: &str = "Kam GPT";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, friendly assistant named Kam GPT. \
Provide concise, relaxed responses and keep the conversation fun and engaging. \
You can also see and describe images provided by the user.";

const MIN_MAX_TOKENS: u32 = 100;
const MAX_MAX_TOKENS: u32 = 4096;

/// Whether images in resent history are replayed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryImages {
    /// Reduce mixed turns to their text.
    #[default]
    Drop,
    Keep,
}

impl FromStr for HistoryImages {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(HistoryImages::Drop),
            "keep" => Ok(HistoryImages::Keep),
            other => Err(anyhow!("expected `drop` or `keep`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub account_id: String,
    pub api_token: String,
    pub base_url: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub assistant_name: String,
    pub history_images: HistoryImages,
    pub template_dir: String,
    pub static_dir: String,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} must be set", key))
        };

        let port = parse_or(&lookup, "PORT", 8080u16)?;
        let max_tokens = clamp_max_tokens(parse_or(&lookup, "MAX_TOKENS", 1024u32)?);
        let history_images = parse_or(&lookup, "HISTORY_IMAGES", HistoryImages::default())?;
        let max_body_bytes = parse_or(&lookup, "MAX_BODY_BYTES", 10 * 1024 * 1024usize)?;

        Ok(Self {
            bind_address: var("BIND_ADDRESS", "127.0.0.1"),
            port,
            account_id: required("CLOUDFLARE_ACCOUNT_ID")?,
            api_token: required("CLOUDFLARE_API_TOKEN")?,
            base_url: var("WORKERS_AI_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model_id: var("MODEL_ID", DEFAULT_MODEL_ID),
            max_tokens,
            system_prompt: var("SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
            assistant_name: var("ASSISTANT_NAME", DEFAULT_ASSISTANT_NAME),
            history_images,
            template_dir: var("TEMPLATE_DIR", "templates"),
            static_dir: var("STATIC_DIR", "static"),
            max_body_bytes,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

// Some models reject budgets outside this range outright.
fn clamp_max_tokens(max_tokens: u32) -> u32 {
    if max_tokens < MIN_MAX_TOKENS {
        info!("Increasing max_tokens from {} to minimum of {}", max_tokens, MIN_MAX_TOKENS);
        MIN_MAX_TOKENS
    } else if max_tokens > MAX_MAX_TOKENS {
        info!("Capping max_tokens from {} to maximum of {}", max_tokens, MAX_MAX_TOKENS);
        MAX_MAX_TOKENS
    } else {
        max_tokens
    }
}
