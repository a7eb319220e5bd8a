use thiserror::Error;

/// 知識庫查詢完全失敗時的通用回覆
pub const GENERIC_ERROR_MESSAGE: &str =
    "😥 Sorry, something went wrong while handling your question.";

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Knowledge base is not configured (endpoint, API key and dataset id are required)")]
    NotConfigured,

    #[error("Knowledge base returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Telegram {method} failed: {description}")]
    Telegram { method: String, description: String },

    #[error("Missing required configuration: {}", fields.join(", "))]
    MissingConfig { fields: Vec<String> },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Upstream,
    Data,
    Platform,
    Configuration,
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::Http(_) | BridgeError::Io(_) => ErrorCategory::Network,
            BridgeError::UpstreamStatus { .. } => ErrorCategory::Upstream,
            BridgeError::Serialization(_) => ErrorCategory::Data,
            BridgeError::Telegram { .. } => ErrorCategory::Platform,
            BridgeError::NotConfigured
            | BridgeError::MissingConfig { .. }
            | BridgeError::InvalidConfigValue { .. }
            | BridgeError::ConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    /// 回覆給聊天使用者的固定訊息，不含任何內部細節
    pub fn user_message(&self) -> &'static str {
        match self {
            BridgeError::NotConfigured => {
                "Sorry, the knowledge base service is currently unavailable."
            }
            BridgeError::Http(e) if e.is_decode() || e.is_body() => {
                "Sorry, something went wrong while reading the knowledge base response."
            }
            BridgeError::Http(_) | BridgeError::Io(_) => {
                "Sorry, a network problem occurred while querying the knowledge base."
            }
            BridgeError::UpstreamStatus { .. } => "Sorry, the knowledge base returned an error.",
            BridgeError::Serialization(_) => {
                "Sorry, the knowledge base answer could not be understood."
            }
            _ => GENERIC_ERROR_MESSAGE,
        }
    }

    /// 只有傳輸層錯誤值得重試，非 200 回應不重試
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Http(e) if e.is_connect() || e.is_timeout() || e.is_request())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
