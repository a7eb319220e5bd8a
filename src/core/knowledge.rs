use crate::config::FastGptConfig;
use crate::core::cache::{cache_key, AnswerCache};
use crate::core::retry::RetryPolicy;
use crate::domain::model::{SearchRequest, SearchResponse};
use crate::domain::ports::KnowledgeBase;
use crate::utils::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;

pub const NO_ANSWER_MESSAGE: &str =
    "Sorry, no relevant answer was found in the knowledge base.";

/// FastGPT 知識庫檢索客戶端，帶快取與重試
pub struct SearchClient {
    client: Client,
    config: FastGptConfig,
    cache: Option<Arc<AnswerCache>>,
    retry: RetryPolicy,
}

impl SearchClient {
    pub fn new(config: FastGptConfig, cache: Option<Arc<AnswerCache>>) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            cache,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> Option<&Arc<AnswerCache>> {
        self.cache.as_ref()
    }

    fn build_request(&self, query: &str) -> SearchRequest {
        SearchRequest {
            dataset_id: self.config.dataset_id.clone(),
            text: query.to_string(),
            limit: self.config.limit,
            similarity: self.config.similarity,
            search_mode: self.config.search_mode,
            using_re_rank: self.config.using_rerank,
            dataset_search_using_extension_query: true,
            dataset_search_extension_model: self.config.extension_model.clone(),
            dataset_search_extension_bg: String::new(),
        }
    }

    async fn search(&self, query: &str) -> Result<SearchResponse> {
        let url = self.config.search_url();
        let body = self.build_request(query);

        let response = self
            .retry
            .run(|attempt| {
                let request = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.config.api_key)
                    .json(&body);
                async move {
                    tracing::debug!(attempt = attempt + 1, "Sending knowledge base search request");
                    request.send().await.map_err(BridgeError::from)
                }
            })
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK {
            tracing::error!(
                status = status.as_u16(),
                response = %text,
                "Knowledge base returned non-200 status"
            );
            return Err(BridgeError::UpstreamStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, response = %text, "Failed to decode knowledge base response");
            BridgeError::from(e)
        })
    }
}

#[async_trait]
impl KnowledgeBase for SearchClient {
    async fn query(&self, query: &str, chat_id: &str) -> Result<String> {
        let key = self.cache.as_ref().map(|_| cache_key(query, chat_id));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(answer) = cache.get(key) {
                tracing::info!(chat_id, "Answer cache hit");
                return Ok(answer);
            }
        }

        if !self.config.is_complete() {
            tracing::error!(
                endpoint = %self.config.endpoint,
                dataset_id = %self.config.dataset_id,
                "Knowledge base configuration is incomplete"
            );
            return Err(BridgeError::NotConfigured);
        }

        let response = self.search(query).await?;

        let top = match response.data.list.first() {
            Some(item) if !item.a.trim().is_empty() => item,
            _ => {
                tracing::warn!(chat_id, "Knowledge base returned no usable answer");
                return Ok(NO_ANSWER_MESSAGE.to_string());
            }
        };

        tracing::info!(
            chat_id,
            score = ?top.top_score(),
            results = response.data.list.len(),
            "Knowledge base answered"
        );
        let answer = top.a.clone();

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, answer.clone());
        }

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SearchMode;
    use httpmock::prelude::*;
    use std::time::Duration;

    const SEARCH_PATH: &str = "/core/dataset/searchTest";

    fn test_config(endpoint: String) -> FastGptConfig {
        FastGptConfig {
            endpoint,
            api_key: "test-key".to_string(),
            dataset_id: "kb-1".to_string(),
            limit: 5000,
            similarity: 0.0,
            search_mode: SearchMode::Embedding,
            using_rerank: false,
            extension_model: "deepseek-v3".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    fn client_with_cache(endpoint: String) -> SearchClient {
        let cache = Arc::new(AnswerCache::new(Duration::from_secs(120), 100));
        SearchClient::new(test_config(endpoint), Some(cache))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    fn answer_body(answer: &str) -> serde_json::Value {
        serde_json::json!({
            "code": 200,
            "statusText": "",
            "message": "",
            "data": {
                "list": [
                    {
                        "id": "chunk-1",
                        "q": "How do I reset my password?",
                        "a": answer,
                        "score": [{"type": "embedding", "value": 0.87}]
                    },
                    {
                        "id": "chunk-2",
                        "q": "Unrelated",
                        "a": "Second best",
                        "score": [{"type": "embedding", "value": 0.41}]
                    }
                ],
                "duration": "0.321s",
                "searchMode": "embedding",
                "limit": 5000,
                "similarity": 0,
                "usingReRank": false,
                "usingSimilarityFilter": true
            }
        })
    }

    #[tokio::test]
    async fn test_query_returns_top_answer() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(SEARCH_PATH)
                    .header("Authorization", "Bearer test-key")
                    .json_body_partial(
                        r#"{
                            "datasetId": "kb-1",
                            "text": "How do I reset my password?",
                            "limit": 5000,
                            "searchMode": "embedding",
                            "usingReRank": false,
                            "datasetSearchUsingExtensionQuery": true,
                            "datasetSearchExtensionModel": "deepseek-v3"
                        }"#,
                    );
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(answer_body("Open settings and choose Reset."));
            })
            .await;

        let client = client_with_cache(server.base_url());
        let answer = client.query("How do I reset my password?", "42").await.unwrap();

        api_mock.assert_async().await;
        assert_eq!(answer, "Open settings and choose Reset.");
    }

    #[tokio::test]
    async fn test_second_identical_query_is_served_from_cache() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST).path(SEARCH_PATH);
                then.status(200).json_body(answer_body("Cached answer"));
            })
            .await;

        let client = client_with_cache(server.base_url());

        let first = client.query("same question", "42").await.unwrap();
        let second = client.query("same question", "42").await.unwrap();

        assert_eq!(first, "Cached answer");
        assert_eq!(second, "Cached answer");
        api_mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_different_chat_does_not_share_cache() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST).path(SEARCH_PATH);
                then.status(200).json_body(answer_body("Per chat answer"));
            })
            .await;

        let client = client_with_cache(server.base_url());

        client.query("same question", "1").await.unwrap();
        client.query("same question", "2").await.unwrap();

        api_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_cache_disabled_always_calls_upstream() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST).path(SEARCH_PATH);
                then.status(200).json_body(answer_body("Fresh answer"));
            })
            .await;

        let client = SearchClient::new(test_config(server.base_url()), None).unwrap();

        client.query("question", "42").await.unwrap();
        client.query("question", "42").await.unwrap();

        assert!(client.cache().is_none());
        api_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_non_200_yields_fallback_error_without_retry() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST).path(SEARCH_PATH);
                then.status(500).body("internal error");
            })
            .await;

        let client = client_with_cache(server.base_url());
        let err = client.query("question", "42").await.unwrap_err();

        api_mock.assert_hits_async(1).await;
        assert!(matches!(err, BridgeError::UpstreamStatus { status: 500, ref body } if body == "internal error"));
        assert_eq!(err.user_message(), "Sorry, the knowledge base returned an error.");
        assert!(client.cache().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_list_is_not_an_error() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST).path(SEARCH_PATH);
                then.status(200)
                    .json_body(serde_json::json!({"code": 200, "data": {"list": []}}));
            })
            .await;

        let client = client_with_cache(server.base_url());

        let first = client.query("unknown topic", "42").await.unwrap();
        let second = client.query("unknown topic", "42").await.unwrap();

        assert_eq!(first, NO_ANSWER_MESSAGE);
        assert_eq!(second, NO_ANSWER_MESSAGE);
        // 空結果不寫入快取
        api_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_malformed_json_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(SEARCH_PATH);
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let client = client_with_cache(server.base_url());
        let err = client.query("question", "42").await.unwrap_err();

        assert!(matches!(err, BridgeError::Serialization(_)));
        assert_eq!(
            err.user_message(),
            "Sorry, the knowledge base answer could not be understood."
        );
    }

    #[tokio::test]
    async fn test_transport_failure_exhausts_retries() {
        let client = client_with_cache("http://127.0.0.1:1".to_string());
        let err = client.query("question", "42").await.unwrap_err();

        assert!(matches!(err, BridgeError::Http(_)));
        assert_eq!(
            err.user_message(),
            "Sorry, a network problem occurred while querying the knowledge base."
        );
    }

    #[tokio::test]
    async fn test_incomplete_config_is_rejected_before_request() {
        let mut config = test_config("http://127.0.0.1:1".to_string());
        config.api_key.clear();

        let client = SearchClient::new(config, None).unwrap();
        let err = client.query("question", "42").await.unwrap_err();

        assert!(matches!(err, BridgeError::NotConfigured));
        assert_eq!(
            err.user_message(),
            "Sorry, the knowledge base service is currently unavailable."
        );
    }
}
