pub mod server;

pub use server::{create_router, serve, AppState};
