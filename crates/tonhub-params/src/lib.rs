//! TON network parameters and sync tunables
//!
//! This crate provides network-specific endpoints, the storage key
//! namespace, and the polling/paging/retry constants used by account sync.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod network;
pub mod sync;

pub use network::{Network, NetworkType};
pub use sync::{
    RetryParams, SyncParams, ACCOUNT_KEY_PREFIX, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL_MS,
    LT_PAD_WIDTH, TRANSACTION_KEY_PREFIX,
};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// A tunable failed to parse or is out of range
    #[error("Invalid value for {name}: {value}")]
    InvalidValue {
        /// Parameter or environment variable name
        name: String,
        /// Offending value
        value: String,
    },
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
