pub mod bridge;
pub mod cache;
pub mod knowledge;
pub mod retry;

pub use crate::domain::model::{SearchRequest, SearchResponse, Update};
pub use crate::domain::ports::{ChatPlatform, KnowledgeBase};
pub use crate::utils::error::Result;
