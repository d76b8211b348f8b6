//! Structured logging for account sync observability
//!
//! Every notable step of a driver is logged through `tracing` with an
//! `event` field and retained in a bounded per-address ring.

#![allow(missing_docs)]

use std::collections::VecDeque;
use tonhub_storage::{AccountAddress, Lt};
use tracing::{debug, error, info, warn, Level};

/// Account sync event type
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Driver started
    Started { has_status: bool },
    /// First status built for the address
    Initial { transactions: usize, complete: bool },
    /// Remote state matched the local status
    Unchanged,
    /// Newer transactions merged into the local list
    Advanced { new_transactions: usize, last_lt: Lt },
    /// Previous last transaction not found in the fetched page
    GapReset { transactions: usize },
    /// Remote lost its history and the local list was cleared
    HistoryCleared,
    /// Remote lost its history, awaiting confirmation
    HistoryLossPending { observed: u32, required: u32 },
    /// Balance or contract state changed without new transactions
    StateChanged,
    /// Older history paged in
    MoreLoaded { added: usize, complete: bool },
    /// A remote call failed and will be retried
    RetryScheduled {
        operation: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// One iteration failed, the loop continues
    IterationFailed { error: String },
    /// Driver stopped
    Stopped,
}

/// A logged event with its wall-clock time
#[derive(Debug, Clone)]
pub struct SyncEventRecord {
    pub timestamp: String,
    pub event: SyncEvent,
}

/// Bounded event log for one address
#[derive(Debug)]
pub struct SyncEventLog {
    address: AccountAddress,
    capacity: usize,
    events: VecDeque<SyncEventRecord>,
}

impl SyncEventLog {
    /// Create new log retaining at most `capacity` events
    pub fn new(address: AccountAddress, capacity: usize) -> Self {
        Self {
            address,
            capacity,
            events: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Log an event and retain it
    pub fn record(&mut self, event: SyncEvent) {
        let address = &self.address;
        match &event {
            SyncEvent::Started { has_status } => info!(
                event = "account_sync_started",
                address = %address,
                has_status = %has_status,
                "Account sync started"
            ),
            SyncEvent::Initial {
                transactions,
                complete,
            } => info!(
                event = "account_sync_initial",
                address = %address,
                transactions = %transactions,
                complete = %complete,
                "Initial account sync"
            ),
            SyncEvent::Unchanged => debug!(
                event = "account_sync_unchanged",
                address = %address,
                "Account unchanged"
            ),
            SyncEvent::Advanced {
                new_transactions,
                last_lt,
            } => info!(
                event = "account_sync_advanced",
                address = %address,
                new_transactions = %new_transactions,
                last_lt = %last_lt,
                "New transactions merged"
            ),
            SyncEvent::GapReset { transactions } => warn!(
                event = "account_sync_gap_reset",
                address = %address,
                transactions = %transactions,
                "History gap detected, older local history dropped"
            ),
            SyncEvent::HistoryCleared => warn!(
                event = "account_sync_history_cleared",
                address = %address,
                "Remote reports no transactions, local history cleared"
            ),
            SyncEvent::HistoryLossPending { observed, required } => warn!(
                event = "account_sync_history_loss_pending",
                address = %address,
                observed = %observed,
                required = %required,
                "Remote reports no transactions, keeping local history"
            ),
            SyncEvent::StateChanged => info!(
                event = "account_sync_state_changed",
                address = %address,
                "Balance or state changed"
            ),
            SyncEvent::MoreLoaded { added, complete } => info!(
                event = "account_sync_more_loaded",
                address = %address,
                added = %added,
                complete = %complete,
                "Older transactions loaded"
            ),
            SyncEvent::RetryScheduled {
                operation,
                attempt,
                delay_ms,
                error,
            } => debug!(
                event = "account_sync_retry",
                address = %address,
                operation = %operation,
                attempt = %attempt,
                delay_ms = %delay_ms,
                error = %error,
                "Retry scheduled"
            ),
            SyncEvent::IterationFailed { error } => error!(
                event = "account_sync_failed",
                address = %address,
                error = %error,
                "Sync iteration failed"
            ),
            SyncEvent::Stopped => info!(
                event = "account_sync_stopped",
                address = %address,
                "Account sync stopped"
            ),
        }

        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(SyncEventRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        });
    }

    /// Address this log belongs to
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    /// Retained events, oldest first
    pub fn events(&self) -> Vec<SyncEventRecord> {
        self.events.iter().cloned().collect()
    }

    /// Retained events as text lines for export
    pub fn export_events(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|r| format!("{} {:?}", r.timestamp, r.event))
            .collect()
    }
}

/// Install a JSON `tracing` subscriber for sync diagnostics
///
/// Returns `false` if a global subscriber was already set.
pub fn init_sync_logging() -> bool {
    let installed = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .try_init()
        .is_ok();

    if installed {
        info!("Account sync logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(capacity: usize) -> SyncEventLog {
        let address = AccountAddress::parse(&format!("0:{}", "33".repeat(32))).unwrap();
        SyncEventLog::new(address, capacity)
    }

    #[test]
    fn test_sync_event_log() {
        let mut log = log(8);
        log.record(SyncEvent::Started { has_status: false });
        log.record(SyncEvent::Initial {
            transactions: 3,
            complete: true,
        });
        log.record(SyncEvent::Unchanged);

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].event, SyncEvent::Unchanged);
    }

    #[test]
    fn test_log_is_bounded() {
        let mut log = log(2);
        log.record(SyncEvent::Started { has_status: true });
        log.record(SyncEvent::Unchanged);
        log.record(SyncEvent::Stopped);

        let events: Vec<SyncEvent> = log.events().into_iter().map(|r| r.event).collect();
        assert_eq!(events, vec![SyncEvent::Unchanged, SyncEvent::Stopped]);
    }

    #[test]
    fn test_export_events() {
        let mut log = log(4);
        log.record(SyncEvent::IterationFailed {
            error: "boom".to_string(),
        });
        let export = log.export_events();
        assert_eq!(export.len(), 1);
        assert!(export[0].contains("boom"));
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut log = log(0);
        log.record(SyncEvent::Unchanged);
        assert!(log.events().is_empty());
    }
}
