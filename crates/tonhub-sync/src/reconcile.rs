//! Diff a fetched account state against the local status
//!
//! Produces the next [`AccountStatus`] plus the transaction bodies that
//! must be persisted. Only the history pages actually needed are fetched:
//! nothing when the account is unchanged, one page otherwise.
//!
//! When more transactions happened between two polls than fit in one page,
//! the fetched page replaces the local window. Mid-range transactions of a
//! very busy account may then be missing locally until paged in again with
//! [`load_more`].

use crate::client::{AccountSource, RemoteAccountState};
use crate::{Error, Result};
use std::collections::HashSet;
use tonhub_params::SyncParams;
use tonhub_storage::{AccountAddress, AccountStatus, Lt, RawTransaction, TransactionId};

/// Which branch of the reconcile produced the status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No prior status: first page fetched
    Initial,
    /// Nothing changed: only `stored_at` refreshed
    Unchanged,
    /// Account got its first transaction
    HistoryStarted,
    /// Remote lost its history and the local list was cleared
    HistoryCleared,
    /// Remote lost its history but the loss is not confirmed yet
    HistoryLossPending,
    /// New transactions prepended to the local list
    Advanced {
        /// Number of prepended transactions
        new: usize,
    },
    /// Previous last transaction missing from the fetched page
    GapReset,
    /// Balance or state changed, last transaction did not
    StateChanged,
}

/// Result of one reconcile step
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Next status to persist and publish
    pub status: AccountStatus,
    /// Bodies to persist, newest first
    pub transactions: Vec<RawTransaction>,
    /// Branch taken
    pub outcome: ReconcileOutcome,
}

/// Result of paging in older history
#[derive(Debug, Clone)]
pub struct MoreLoaded {
    /// Status with the older ids appended
    pub status: AccountStatus,
    /// Newly fetched bodies, newest first
    pub transactions: Vec<RawTransaction>,
}

/// Compute the next status of `address` from a fetched remote state
///
/// `history_loss_confirmed` gates clearing local history when the remote
/// suddenly reports no transactions at all.
pub async fn reconcile(
    source: &dyn AccountSource,
    address: &AccountAddress,
    remote: &RemoteAccountState,
    prior: Option<&AccountStatus>,
    params: &SyncParams,
    now_ms: i64,
) -> Result<Reconciled> {
    reconcile_confirmed(source, address, remote, prior, params, now_ms, true).await
}

/// [`reconcile`] with an explicit history-loss confirmation flag
pub async fn reconcile_confirmed(
    source: &dyn AccountSource,
    address: &AccountAddress,
    remote: &RemoteAccountState,
    prior: Option<&AccountStatus>,
    params: &SyncParams,
    now_ms: i64,
    history_loss_confirmed: bool,
) -> Result<Reconciled> {
    let Some(prior) = prior else {
        return initial(source, address, remote, params, now_ms, ReconcileOutcome::Initial).await;
    };

    if is_unchanged(prior, remote) {
        return Ok(Reconciled {
            status: AccountStatus {
                stored_at: now_ms,
                ..prior.clone()
            },
            transactions: Vec::new(),
            outcome: ReconcileOutcome::Unchanged,
        });
    }

    match (&prior.last_transaction, &remote.last_transaction) {
        (None, Some(_)) => {
            initial(source, address, remote, params, now_ms, ReconcileOutcome::HistoryStarted).await
        }
        (Some(_), None) if history_loss_confirmed => Ok(Reconciled {
            status: AccountStatus {
                balance: remote.balance.clone(),
                state: remote.state,
                last_transaction: None,
                sync_time: remote.timestamp,
                stored_at: now_ms,
                loaded_transactions: 0,
                transaction_cursor: None,
                transactions: Vec::new(),
            },
            transactions: Vec::new(),
            outcome: ReconcileOutcome::HistoryCleared,
        }),
        (Some(_), None) => Ok(Reconciled {
            status: AccountStatus {
                stored_at: now_ms,
                ..prior.clone()
            },
            transactions: Vec::new(),
            outcome: ReconcileOutcome::HistoryLossPending,
        }),
        (Some(previous), Some(latest)) if previous != latest => {
            advance(source, address, remote, prior, previous, latest, params, now_ms).await
        }
        _ => Ok(Reconciled {
            status: AccountStatus {
                balance: remote.balance.clone(),
                state: remote.state,
                sync_time: remote.timestamp,
                stored_at: now_ms,
                ..prior.clone()
            },
            transactions: Vec::new(),
            outcome: ReconcileOutcome::StateChanged,
        }),
    }
}

/// Page older history in from the cursor of `prior`
///
/// Returns `None` when the full history is already loaded.
pub async fn load_more(
    source: &dyn AccountSource,
    address: &AccountAddress,
    prior: &AccountStatus,
    params: &SyncParams,
    now_ms: i64,
) -> Result<Option<MoreLoaded>> {
    let Some(cursor) = &prior.transaction_cursor else {
        return Ok(None);
    };

    // The page starts with the cursor transaction, which is already loaded
    let page = newest_first(source.fetch_transactions(address, params.page_size + 1, cursor).await?);
    let oldest_loaded = prior.transactions.last().copied().unwrap_or(cursor.lt);
    let older: Vec<RawTransaction> = page
        .into_iter()
        .filter(|tx| tx.id.lt < cursor.lt && tx.id.lt < oldest_loaded)
        .collect();

    let transaction_cursor = if older.len() < params.page_size {
        None
    } else {
        older.last().map(|tx| tx.id.clone())
    };

    let mut transactions = prior.transactions.clone();
    transactions.extend(older.iter().map(|tx| tx.id.lt));

    Ok(Some(MoreLoaded {
        status: AccountStatus {
            stored_at: now_ms,
            loaded_transactions: transactions.len(),
            transaction_cursor,
            transactions,
            ..prior.clone()
        },
        transactions: older,
    }))
}

fn is_unchanged(prior: &AccountStatus, remote: &RemoteAccountState) -> bool {
    prior.balance == remote.balance
        && prior.state == remote.state
        && prior.last_transaction == remote.last_transaction
}

async fn initial(
    source: &dyn AccountSource,
    address: &AccountAddress,
    remote: &RemoteAccountState,
    params: &SyncParams,
    now_ms: i64,
    outcome: ReconcileOutcome,
) -> Result<Reconciled> {
    let page = match &remote.last_transaction {
        Some(last) => {
            let page = newest_first(source.fetch_transactions(address, params.page_size, last).await?);
            if page.is_empty() {
                return Err(Error::InconsistentHistory(format!(
                    "no transactions returned ending at {last} for {address}"
                )));
            }
            page
        }
        None => Vec::new(),
    };
    Ok(Reconciled {
        status: window_status(remote, &page, params, now_ms),
        transactions: page,
        outcome,
    })
}

#[allow(clippy::too_many_arguments)]
async fn advance(
    source: &dyn AccountSource,
    address: &AccountAddress,
    remote: &RemoteAccountState,
    prior: &AccountStatus,
    previous: &TransactionId,
    latest: &TransactionId,
    params: &SyncParams,
    now_ms: i64,
) -> Result<Reconciled> {
    let page = newest_first(source.fetch_transactions(address, params.page_size, latest).await?);
    if page.is_empty() {
        return Err(Error::InconsistentHistory(format!(
            "no transactions returned ending at {latest} for {address}"
        )));
    }

    let Some(position) = page.iter().position(|tx| tx.id == *previous) else {
        return Ok(Reconciled {
            status: window_status(remote, &page, params, now_ms),
            transactions: page,
            outcome: ReconcileOutcome::GapReset,
        });
    };

    let newest_local = prior.transactions.first().copied().unwrap_or(previous.lt);
    let fresh: Vec<RawTransaction> = page
        .into_iter()
        .take(position)
        .filter(|tx| tx.id.lt > previous.lt && tx.id.lt > newest_local)
        .collect();

    let mut transactions: Vec<Lt> = fresh.iter().map(|tx| tx.id.lt).collect();
    transactions.extend_from_slice(&prior.transactions);

    Ok(Reconciled {
        status: AccountStatus {
            balance: remote.balance.clone(),
            state: remote.state,
            last_transaction: remote.last_transaction.clone(),
            sync_time: remote.timestamp,
            stored_at: now_ms,
            loaded_transactions: transactions.len(),
            transaction_cursor: prior.transaction_cursor.clone(),
            transactions,
        },
        outcome: ReconcileOutcome::Advanced { new: fresh.len() },
        transactions: fresh,
    })
}

/// Status whose local window is exactly `page`
fn window_status(
    remote: &RemoteAccountState,
    page: &[RawTransaction],
    params: &SyncParams,
    now_ms: i64,
) -> AccountStatus {
    let transaction_cursor = if page.len() < params.page_size {
        None
    } else {
        page.last().map(|tx| tx.id.clone())
    };
    AccountStatus {
        balance: remote.balance.clone(),
        state: remote.state,
        last_transaction: remote.last_transaction.clone(),
        sync_time: remote.timestamp,
        stored_at: now_ms,
        loaded_transactions: page.len(),
        transaction_cursor,
        transactions: page.iter().map(|tx| tx.id.lt).collect(),
    }
}

/// Sort a fetched page newest first and drop repeated logical times
fn newest_first(mut page: Vec<RawTransaction>) -> Vec<RawTransaction> {
    page.sort_by(|a, b| b.id.lt.cmp(&a.id.lt));
    let mut seen = HashSet::with_capacity(page.len());
    page.retain(|tx| seen.insert(tx.id.lt));
    page
}
