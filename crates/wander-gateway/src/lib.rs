pub mod commands;
pub mod connection;
pub mod directory;
pub mod error;
pub mod hub;
pub mod notifier;
pub mod relay;
pub mod rooms;
pub mod session;

pub use error::ChatError;
pub use hub::{ChatHub, HubOptions};

/// Run a blocking SQLite call off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ChatError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ChatError::Storage)
}
