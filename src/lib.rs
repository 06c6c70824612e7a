//! MyQ Home - OAuth2 bridge to the MyQ device API
//!
//! Lets a voice assistant or other OAuth2 client act on a user's MyQ
//! garage doors and lights:
//! - A browser login verified against MyQ, recorded in a local credential store
//! - The authorization-code and refresh-token grants, with the logged-in
//!   session standing in for a second credential prompt
//! - Bearer-authenticated device routes, each backed by a fresh MyQ session
//!
//! # Example
//!
//! ```rust,no_run
//! use myq_home::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     myq_home::http::start_server(config).await?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Infrastructure
pub mod config;
pub mod provider;
pub mod storage;
pub mod telemetry;

// Interface layers
pub mod auth;
pub mod cli;
pub mod devices;
pub mod http;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use error::{MyqHomeError, NetworkError, OAuthError, Result, StorageError};

/// Initialize logging for the application
///
/// `RUST_LOG` wins over the configured level. Safe to call more than once.
pub fn init_logging(level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| match level {
            Some(level) => EnvFilter::try_new(level),
            None => EnvFilter::try_new("myq_home=info,tower_http=info"),
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
