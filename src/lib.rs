pub mod bedrock;
pub mod chat;
pub mod citations;
pub mod config;
pub mod models;
pub mod prompt;
pub mod render;
pub mod server;

pub use citations::{collate_sources, reconcile};
pub use config::AppConfig;
pub use server::run_server;
