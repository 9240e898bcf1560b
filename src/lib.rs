pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod model_registry;
pub mod stream;
pub mod transforms;
pub mod upstream;
