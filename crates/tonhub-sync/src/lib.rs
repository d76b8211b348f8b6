//! Incremental account and transaction sync for TON wallets
//!
//! Polls the remote state of watched addresses, fetches only the history
//! pages needed to catch up, and persists the merged status through
//! [`tonhub_storage::AccountRepository`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::result_large_err)]

pub mod cancel;
pub mod client;
pub mod error;
pub mod events;
pub mod reconcile;
pub mod registry;
pub mod retry;
pub mod sync;

pub use cancel::{CancelOnDrop, CancelToken};
pub use client::{AccountSource, RemoteAccountState, TonCenterClient, TonCenterConfig};
pub use error::{Error, Result};
pub use events::{init_sync_logging, SyncEvent, SyncEventLog, SyncEventRecord};
pub use reconcile::{
    load_more, reconcile, reconcile_confirmed, MoreLoaded, ReconcileOutcome, Reconciled,
};
pub use registry::{Subscription, SyncRegistry};
pub use retry::RetryPolicy;
pub use sync::{AccountSync, SyncConfig, SyncHandle, SyncReport};
