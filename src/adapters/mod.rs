// Adapters layer: concrete implementations of the domain ports.

pub mod telegram;

pub use telegram::TelegramClient;
