use serde::{Deserialize, Deserializer, Serialize};

// Telegram Bot API 物件，只保留橋接需要的欄位

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Bot API 統一的回應外殼
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i32>,
}

// FastGPT dataset searchTest

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchMode {
    #[default]
    Embedding,
    FullTextRecall,
    MixedRecall,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "embedding" => Ok(SearchMode::Embedding),
            "fullTextRecall" => Ok(SearchMode::FullTextRecall),
            "mixedRecall" => Ok(SearchMode::MixedRecall),
            other => Err(format!(
                "Unknown search mode '{}'. Valid modes: embedding, fullTextRecall, mixedRecall",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub dataset_id: String,
    pub text: String,
    pub limit: u32,
    pub similarity: f64,
    pub search_mode: SearchMode,
    pub using_re_rank: bool,
    pub dataset_search_using_extension_query: bool,
    pub dataset_search_extension_model: String,
    pub dataset_search_extension_bg: String,
}

/// FastGPT 可能把欄位回成 `null`，視同缺少欄位
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub code: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub status_text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub data: SearchData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchData {
    #[serde(deserialize_with = "null_as_default")]
    pub list: Vec<SearchResultItem>,
    #[serde(deserialize_with = "null_as_default")]
    pub duration: String,
    #[serde(deserialize_with = "null_as_default")]
    pub query_extension_model: String,
    #[serde(deserialize_with = "null_as_default")]
    pub search_mode: String,
    #[serde(deserialize_with = "null_as_default")]
    pub limit: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub similarity: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub using_re_rank: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub using_similarity_filter: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchResultItem {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub update_time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub q: String,
    #[serde(deserialize_with = "null_as_default")]
    pub a: String,
    #[serde(deserialize_with = "null_as_default")]
    pub chunk_index: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub dataset_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub collection_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub source_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub source_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub score: Vec<ScoreItem>,
    #[serde(deserialize_with = "null_as_default")]
    pub tokens: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoreItem {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub value: f64,
}

impl SearchResultItem {
    /// 第一個分數項（通常是 embedding 或 rerank 分數）
    pub fn top_score(&self) -> Option<f64> {
        self.score.first().map(|s| s.value)
    }
}
