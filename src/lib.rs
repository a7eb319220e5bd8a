pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::TelegramClient;
pub use config::{cli::CliArgs, BridgeConfig};
pub use core::{bridge::Bridge, cache::AnswerCache, knowledge::SearchClient};
pub use utils::error::{BridgeError, Result};
