//! Caption Relay - real-time translation relay with quota-aware scheduling
//!
//! Clients stream recognized speech over a WebSocket; the relay translates it
//! through rate-limited external providers, multiplying throughput across
//! multiple credentials while keeping quota state restart-safe.

#![forbid(unsafe_code)]

pub mod core;
pub mod providers;
pub mod quota;
pub mod relay;
pub mod server;

// Re-export key types for convenience
pub use self::core::{
    config::RelayConfig,
    errors::{QuotaScope, RelayError, Result},
    models::{CaptionStyle, TranslationOutcome, TranslationRequest},
};

pub use relay::{PendingRequest, Scheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
