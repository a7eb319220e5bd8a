pub mod cli;

use crate::domain::model::SearchMode;
use crate::utils::error::{BridgeError, Result};
use crate::utils::validation::{
    validate_positive_number, validate_range, validate_required_fields, validate_url, Validate,
};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SEARCH_LIMIT: u32 = 5000;
pub const DEFAULT_EXTENSION_MODEL: &str = "deepseek-v3";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 120;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct FastGptConfig {
    pub endpoint: String,
    pub api_key: String,
    pub dataset_id: String,
    pub limit: u32,
    pub similarity: f64,
    pub search_mode: SearchMode,
    pub using_rerank: bool,
    pub extension_model: String,
    pub timeout: Duration,
}

impl FastGptConfig {
    pub fn is_complete(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty() && !self.dataset_id.is_empty()
    }

    pub fn search_url(&self) -> String {
        format!("{}/core/dataset/searchTest", self.endpoint.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

#[derive(Clone)]
pub struct BridgeConfig {
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    pub webhook_url: String,
    pub webhook_secret_token: Option<String>,
    pub port: u16,
    pub fastgpt: FastGptConfig,
    pub cache: CacheConfig,
}

impl BridgeConfig {
    /// 先載入 .env（若存在），再從環境變數讀取
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| BridgeError::ConfigError {
                    message: format!("Failed to load env file {}: {}", path.display(), e),
                })?;
            }
            None => {
                if dotenvy::dotenv().is_err() {
                    tracing::debug!("No .env file found, reading configuration from environment");
                }
            }
        }

        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 從任意查詢函式建立配置，方便測試時不動到行程環境
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |key: &str, default: bool| {
            var(key).map(|v| v == "true" || v == "1").unwrap_or(default)
        };

        let search_mode = match var("FASTGPT_SEARCH_MODE") {
            Some(mode) => mode
                .parse::<SearchMode>()
                .map_err(|reason| BridgeError::InvalidConfigValue {
                    field: "FASTGPT_SEARCH_MODE".to_string(),
                    value: mode.clone(),
                    reason,
                })?,
            None => SearchMode::default(),
        };

        let port = match var("PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(port = %raw, "Cannot parse PORT, using default {}", DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        // 非正數的過期時間退回預設值
        let cache_ttl_secs = var("CACHE_EXPIRATION")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .map(|secs| secs as u64)
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);

        Ok(Self {
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            telegram_api_base: var("TELEGRAM_API_BASE")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            webhook_url: var("WEBHOOK_URL").unwrap_or_default(),
            webhook_secret_token: var("WEBHOOK_SECRET_TOKEN"),
            port,
            fastgpt: FastGptConfig {
                endpoint: var("FASTGPT_API_ENDPOINT").unwrap_or_default(),
                api_key: var("FASTGPT_API_KEY").unwrap_or_default(),
                dataset_id: var("FASTGPT_KB_ID").unwrap_or_default(),
                limit: var("FASTGPT_LIMIT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SEARCH_LIMIT),
                similarity: var("FASTGPT_SIMILARITY")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.0),
                search_mode,
                using_rerank: flag("FASTGPT_USING_RERANK", false),
                extension_model: var("FASTGPT_DATASET_SEARCH_EXTENSION_MODEL")
                    .unwrap_or_else(|| DEFAULT_EXTENSION_MODEL.to_string()),
                timeout: Duration::from_secs(
                    var("FASTGPT_TIMEOUT_SECS")
                        .and_then(|v| v.parse().ok())
                        .filter(|secs| *secs > 0)
                        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
                ),
            },
            cache: CacheConfig {
                enabled: flag("ENABLE_CACHE", true),
                ttl: Duration::from_secs(cache_ttl_secs),
                max_entries: var("CACHE_MAX_ENTRIES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
            },
        })
    }

    /// Webhook 路徑使用 token 的 SHA-256 前 8 位元組，避免 token 出現在 URL
    pub fn webhook_path(&self) -> String {
        let digest = Sha256::digest(self.telegram_bot_token.as_bytes());
        format!("/webhook/{}", hex::encode(&digest[..8]))
    }

    /// 註冊到 Telegram 的完整 webhook URL
    pub fn webhook_endpoint(&self) -> String {
        format!(
            "{}{}",
            self.webhook_url.trim_end_matches('/'),
            self.webhook_path()
        )
    }
}

impl Validate for BridgeConfig {
    fn validate(&self) -> Result<()> {
        validate_required_fields(&[
            ("TELEGRAM_BOT_TOKEN", self.telegram_bot_token.as_str()),
            ("FASTGPT_API_ENDPOINT", self.fastgpt.endpoint.as_str()),
            ("FASTGPT_API_KEY", self.fastgpt.api_key.as_str()),
            ("FASTGPT_KB_ID", self.fastgpt.dataset_id.as_str()),
            ("WEBHOOK_URL", self.webhook_url.as_str()),
        ])?;

        validate_url("FASTGPT_API_ENDPOINT", &self.fastgpt.endpoint)?;
        validate_url("WEBHOOK_URL", &self.webhook_url)?;
        validate_url("TELEGRAM_API_BASE", &self.telegram_api_base)?;
        validate_range("FASTGPT_SIMILARITY", self.fastgpt.similarity, 0.0, 1.0)?;
        validate_positive_number("CACHE_MAX_ENTRIES", self.cache.max_entries, 1)?;

        Ok(())
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

// 手寫 Debug，避免 token 與 API key 進到日誌
impl fmt::Debug for FastGptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastGptConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("dataset_id", &self.dataset_id)
            .field("limit", &self.limit)
            .field("similarity", &self.similarity)
            .field("search_mode", &self.search_mode)
            .field("using_rerank", &self.using_rerank)
            .field("extension_model", &self.extension_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("telegram_bot_token", &redact(&self.telegram_bot_token))
            .field("telegram_api_base", &self.telegram_api_base)
            .field("webhook_url", &self.webhook_url)
            .field(
                "webhook_secret_token",
                &self.webhook_secret_token.as_deref().map(redact),
            )
            .field("port", &self.port)
            .field("fastgpt", &self.fastgpt)
            .field("cache", &self.cache)
            .finish()
    }
}
