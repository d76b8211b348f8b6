//! Local account status storage for Tonhub Wallet
//!
//! Persists one status record per watched address plus every fetched
//! transaction body in a string key-value store.
//!
//! ## Layout
//!
//! - **Status records**: `account_<address>` holds the JSON-encoded
//!   [`AccountStatus`] (balance as a decimal string)
//! - **Transaction bodies**: `tx_<address>_<lt padded to 20 digits>` holds the
//!   base64 BOC of a transaction, so a prefix scan yields lt order
//! - **Backends**: [`MemoryStore`] for tests and ephemeral use, [`SqliteStore`]
//!   for durable storage (WAL, schema migrations, `SQLITE_BUSY` backoff)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod database;
pub mod error;
pub mod keys;
pub mod kv;
pub mod migrations;
pub mod models;
pub mod repository;

pub use codec::{parse_status, serialize_status};
pub use database::{SqliteStore, MAX_BUSY_RETRIES, BASE_BACKOFF_MS, MAX_BACKOFF_MS};
pub use error::{Error, Result};
pub use keys::{account_key, pad_lt, transaction_key, transaction_prefix};
pub use kv::{KeyValueStore, MemoryStore};
pub use models::*;
pub use repository::AccountRepository;
