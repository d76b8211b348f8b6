//! Scripted in-memory chain shared by the driver and registry tests

#![allow(dead_code)]

use async_trait::async_trait;
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tonhub_params::{RetryParams, SyncParams};
use tonhub_storage::{AccountAddress, AccountState, RawTransaction, TransactionId};
use tonhub_sync::{AccountSource, Error, RemoteAccountState, Result, SyncConfig};

pub fn addr(byte: u8) -> AccountAddress {
    AccountAddress::parse(&format!("0:{}", hex_byte(byte).repeat(32))).unwrap()
}

fn hex_byte(byte: u8) -> String {
    format!("{byte:02x}")
}

pub fn id(lt: u64) -> TransactionId {
    TransactionId::new(lt, format!("h{lt}"))
}

pub fn tx(lt: u64) -> RawTransaction {
    RawTransaction {
        id: id(lt),
        data: format!("boc{lt}"),
    }
}

/// Fast, deterministic driver configuration
pub fn config() -> SyncConfig {
    SyncConfig {
        params: SyncParams {
            page_size: 100,
            poll_interval: Duration::from_secs(5),
            history_clear_confirmations: 1,
            event_history: 256,
        },
        retry: RetryParams {
            max_attempts: None,
            max_elapsed: None,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
        },
    }
}

struct ChainState {
    balance: BigUint,
    state: AccountState,
    history: Vec<RawTransaction>,
    hide_history: bool,
}

/// Single-account chain; every address sees the same account
pub struct FakeChain {
    inner: Mutex<ChainState>,
    state_calls: AtomicUsize,
    transaction_calls: AtomicUsize,
    failures: AtomicU32,
    lagging_pages: AtomicU32,
    always_fail: Mutex<bool>,
    state_delay: Mutex<Option<Duration>>,
}

impl FakeChain {
    pub fn with_history(lts: impl IntoIterator<Item = u64>) -> Self {
        let mut history: Vec<RawTransaction> = lts.into_iter().map(tx).collect();
        history.sort_by(|a, b| b.id.lt.cmp(&a.id.lt));
        Self {
            inner: Mutex::new(ChainState {
                balance: BigUint::from(1_000_000_000u64),
                state: AccountState::Active,
                history,
                hide_history: false,
            }),
            state_calls: AtomicUsize::new(0),
            transaction_calls: AtomicUsize::new(0),
            failures: AtomicU32::new(0),
            lagging_pages: AtomicU32::new(0),
            always_fail: Mutex::new(false),
            state_delay: Mutex::new(None),
        }
    }

    /// Append transactions newer than the current head
    pub fn push(&self, lts: impl IntoIterator<Item = u64>) {
        let mut inner = self.inner.lock();
        for lt in lts {
            inner.history.insert(0, tx(lt));
        }
        inner.balance += BigUint::from(1u32);
    }

    pub fn set_balance(&self, balance: u64) {
        self.inner.lock().balance = BigUint::from(balance);
    }

    /// Report the account as having no transactions
    pub fn hide_history(&self, hide: bool) {
        self.inner.lock().hide_history = hide;
    }

    /// Fail the next `n` state fetches
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Return empty pages for the next `n` transaction fetches
    pub fn lag_pages(&self, n: u32) {
        self.lagging_pages.store(n, Ordering::SeqCst);
    }

    pub fn fail_always(&self, fail: bool) {
        *self.always_fail.lock() = fail;
    }

    pub fn delay_state(&self, delay: Duration) {
        *self.state_delay.lock() = Some(delay);
    }

    pub fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountSource for FakeChain {
    async fn fetch_account_state(&self, _: &AccountAddress) -> Result<RemoteAccountState> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.always_fail.lock() {
            return Err(Error::Network("connection refused".into()));
        }
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Network("timeout".into()));
        }

        let inner = self.inner.lock();
        let last_transaction = if inner.hide_history {
            None
        } else {
            inner.history.first().map(|t| t.id.clone())
        };
        Ok(RemoteAccountState {
            balance: inner.balance.clone(),
            state: inner.state,
            last_transaction,
            timestamp: 1_700_000_000,
        })
    }

    async fn fetch_transactions(
        &self,
        _: &AccountAddress,
        limit: usize,
        from: &TransactionId,
    ) -> Result<Vec<RawTransaction>> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .lagging_pages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(Vec::new());
        }
        let inner = self.inner.lock();
        Ok(inner
            .history
            .iter()
            .filter(|t| t.id.lt <= from.lt)
            .take(limit)
            .cloned()
            .collect())
    }
}
