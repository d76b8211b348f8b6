//! Status codec
//!
//! JSON with camelCase field names. The balance is written as a decimal
//! string; everything else maps directly.

use crate::models::{parse_balance, AccountState, AccountStatus, Lt, TransactionId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredStatus {
    balance: String,
    state: AccountState,
    last_transaction: Option<TransactionId>,
    sync_time: u64,
    stored_at: i64,
    loaded_transactions: usize,
    transaction_cursor: Option<TransactionId>,
    transactions: Vec<Lt>,
}

/// Encode a status
pub fn serialize_status(status: &AccountStatus) -> String {
    let stored = StoredStatus {
        balance: status.balance.to_str_radix(10),
        state: status.state,
        last_transaction: status.last_transaction.clone(),
        sync_time: status.sync_time,
        stored_at: status.stored_at,
        loaded_transactions: status.loaded_transactions,
        transaction_cursor: status.transaction_cursor.clone(),
        transactions: status.transactions.clone(),
    };
    // Only strings, integers and enums: encoding cannot fail
    serde_json::to_string(&stored).unwrap_or_default()
}

/// Decode a status
///
/// Any failure is reported as [`Error::MalformedStatus`]; callers treat it
/// as "nothing persisted".
pub fn parse_status(src: &str) -> Result<AccountStatus> {
    let stored: StoredStatus =
        serde_json::from_str(src).map_err(|e| Error::MalformedStatus(e.to_string()))?;

    let balance = parse_balance(&stored.balance)
        .ok_or_else(|| Error::MalformedStatus(format!("invalid balance: {:?}", stored.balance)))?;

    if stored.loaded_transactions != stored.transactions.len() {
        return Err(Error::MalformedStatus(format!(
            "loadedTransactions is {} but {} ids are stored",
            stored.loaded_transactions,
            stored.transactions.len()
        )));
    }

    Ok(AccountStatus {
        balance,
        state: stored.state,
        last_transaction: stored.last_transaction,
        sync_time: stored.sync_time,
        stored_at: stored.stored_at,
        loaded_transactions: stored.loaded_transactions,
        transaction_cursor: stored.transaction_cursor,
        transactions: stored.transactions,
    })
}
