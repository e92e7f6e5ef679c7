// src/infrastructure/mod.rs
pub mod config;
pub mod markdown;
pub mod renderer;
pub mod sqlite;

pub use config::Config;
pub use renderer::PreviewRenderer;
pub use sqlite::SqliteRepository;
