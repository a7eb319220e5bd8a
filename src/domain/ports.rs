use crate::utils::error::Result;
use async_trait::async_trait;

/// 知識庫查詢：回傳可以直接顯示給使用者的答案文字
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn query(&self, query: &str, chat_id: &str) -> Result<String>;
}

/// 聊天平台的訊息發送與編輯
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// 發送新訊息，回傳 message_id
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64>;

    async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;
}
