use crate::domain::model::Update;
use crate::domain::ports::{ChatPlatform, KnowledgeBase};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const THINKING_MESSAGE: &str = "🤔 Thinking, please wait...";

/// Telegram 單則訊息的長度上限，以 UTF-16 code unit 計算
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const TRUNCATION_SUFFIX: &str = "\n\n[truncated]";

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// 非文字訊息、空訊息或指令
    Ignored,
    /// edited 為 false 表示編輯失敗後改發新訊息
    Delivered { text: String, edited: bool },
    Undelivered,
}

pub fn truncate_message(text: &str) -> String {
    if utf16_len(text) <= TELEGRAM_MESSAGE_LIMIT {
        return text.to_string();
    }

    // 只在字元邊界切斷，emoji 等 BMP 外字元佔兩個 code unit
    let budget = TELEGRAM_MESSAGE_LIMIT - utf16_len(TRUNCATION_SUFFIX);
    let mut used = 0;
    let mut truncated = String::new();
    for c in text.chars() {
        used += c.len_utf16();
        if used > budget {
            break;
        }
        truncated.push(c);
    }
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

pub struct Bridge {
    knowledge: Arc<dyn KnowledgeBase>,
    platform: Arc<dyn ChatPlatform>,
}

impl Bridge {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>, platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            knowledge,
            platform,
        }
    }

    /// 每個 update 在獨立任務中處理，webhook 可以立即回應
    pub fn dispatch(self: &Arc<Self>, update: Update) -> JoinHandle<UpdateOutcome> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move { bridge.handle_update(update).await })
    }

    pub async fn handle_update(&self, update: Update) -> UpdateOutcome {
        let Some(message) = update.message else {
            return UpdateOutcome::Ignored;
        };

        let chat_id = message.chat.id;
        // 原文判斷與轉送，不做 trim
        let text = match message.text {
            Some(text) if !text.is_empty() && !text.starts_with('/') => text,
            _ => return UpdateOutcome::Ignored,
        };

        tracing::info!(chat_id, update_id = update.update_id, "Received message");
        tracing::debug!(chat_id, text = %text, "Message text");

        let placeholder_id = match self.platform.send_message(chat_id, THINKING_MESSAGE).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Failed to send thinking message");
                return UpdateOutcome::Undelivered;
            }
        };

        let reply = match self.knowledge.query(&text, &chat_id.to_string()).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(
                    chat_id,
                    error = %e,
                    category = ?e.category(),
                    "Failed to answer message"
                );
                e.user_message().to_string()
            }
        };
        let reply = truncate_message(&reply);

        match self
            .platform
            .edit_message_text(chat_id, placeholder_id, &reply)
            .await
        {
            Ok(()) => {
                tracing::info!(chat_id, chars = reply.chars().count(), "Sent answer");
                UpdateOutcome::Delivered {
                    text: reply,
                    edited: true,
                }
            }
            Err(e) => {
                // 編輯失敗時改發新訊息，確保使用者收到回覆
                tracing::warn!(chat_id, error = %e, "Failed to edit message, sending a new one");
                match self.platform.send_message(chat_id, &reply).await {
                    Ok(_) => UpdateOutcome::Delivered {
                        text: reply,
                        edited: false,
                    },
                    Err(e) => {
                        tracing::error!(chat_id, error = %e, "Fallback message also failed");
                        UpdateOutcome::Undelivered
                    }
                }
            }
        }
    }
}
