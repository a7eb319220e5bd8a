use crate::domain::model::{Message, TelegramResponse, User};
use crate::domain::ports::ChatPlatform;
use crate::utils::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram Bot API 客戶端，只實作橋接需要的方法
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            // URL 內含 token，不可以出現在錯誤訊息
            .map_err(|e| BridgeError::Http(e.without_url()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::Http(e.without_url()))?;

        let body: TelegramResponse<T> = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(BridgeError::Telegram {
                    method: method.to_string(),
                    description: format!("HTTP {}: {}", status.as_u16(), text),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !body.ok || !status.is_success() {
            return Err(BridgeError::Telegram {
                method: method.to_string(),
                description: body
                    .description
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            });
        }

        body.result.ok_or_else(|| BridgeError::Telegram {
            method: method.to_string(),
            description: "response has no result".to_string(),
        })
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", json!({})).await
    }

    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()> {
        let mut payload = json!({
            "url": url,
            "allowed_updates": ["message"],
        });
        if let Some(secret) = secret_token {
            payload["secret_token"] = json!(secret);
        }

        let _: bool = self.call("setWebhook", payload).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        let message: Message = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(message.message_id)
    }

    async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let result: Result<serde_json::Value> = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "text": text,
                }),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // 內容相同時 Telegram 回 400，視為成功
            Err(BridgeError::Telegram { description, .. })
                if description.contains("message is not modified") =>
            {
                tracing::debug!(chat_id, message_id, "Message already up to date");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const TOKEN: &str = "123456:TEST-token";

    fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(TOKEN, server.base_url()).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_returns_message_id() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("/bot{}/sendMessage", TOKEN))
                    .json_body(serde_json::json!({"chat_id": 42, "text": "hello"}));
                then.status(200).json_body(serde_json::json!({
                    "ok": true,
                    "result": {
                        "message_id": 321,
                        "date": 1700000000,
                        "chat": {"id": 42, "type": "private"},
                        "text": "hello"
                    }
                }));
            })
            .await;

        let message_id = client(&server).send_message(42, "hello").await.unwrap();

        api_mock.assert_async().await;
        assert_eq!(message_id, 321);
    }

    #[tokio::test]
    async fn test_api_error_is_reported_with_description() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("/bot{}/sendMessage", TOKEN));
                then.status(400).json_body(serde_json::json!({
                    "ok": false,
                    "error_code": 400,
                    "description": "Bad Request: chat not found"
                }));
            })
            .await;

        let err = client(&server).send_message(7, "hello").await.unwrap_err();

        match err {
            BridgeError::Telegram {
                method,
                description,
            } => {
                assert_eq!(method, "sendMessage");
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("expected Telegram error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_edit_not_modified_is_success() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("/bot{}/editMessageText", TOKEN))
                    .json_body_partial(r#"{"chat_id": 42, "message_id": 5}"#);
                then.status(400).json_body(serde_json::json!({
                    "ok": false,
                    "error_code": 400,
                    "description": "Bad Request: message is not modified"
                }));
            })
            .await;

        client(&server)
            .edit_message_text(42, 5, "same text")
            .await
            .unwrap();
        api_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_webhook_sends_secret_token() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("/bot{}/setWebhook", TOKEN))
                    .json_body_partial(
                        r#"{"url": "https://bot.example.com/webhook/abc", "secret_token": "s3cret"}"#,
                    );
                then.status(200)
                    .json_body(serde_json::json!({"ok": true, "result": true, "description": "Webhook was set"}));
            })
            .await;

        client(&server)
            .set_webhook("https://bot.example.com/webhook/abc", Some("s3cret"))
            .await
            .unwrap();
        api_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_me_and_error_hides_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("/bot{}/getMe", TOKEN));
                then.status(200).json_body(serde_json::json!({
                    "ok": true,
                    "result": {"id": 1, "is_bot": true, "first_name": "KB", "username": "kb_helper_bot"}
                }));
            })
            .await;

        let me = client(&server).get_me().await.unwrap();
        assert_eq!(me.username.as_deref(), Some("kb_helper_bot"));

        let offline = TelegramClient::new(TOKEN, "http://127.0.0.1:1").unwrap();
        let err = offline.get_me().await.unwrap_err();
        assert!(!err.to_string().contains(TOKEN));
    }
}
