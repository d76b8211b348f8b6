//! Polling driver for one account
//!
//! [`AccountSync`] owns the poll loop of a single address: fetch the remote
//! state through the retry policy, reconcile against the persisted status,
//! persist new transaction bodies and the status, publish, sleep. It is the
//! only writer of its address' keys.

use crate::cancel::{CancelOnDrop, CancelToken};
use crate::client::AccountSource;
use crate::events::{SyncEvent, SyncEventLog, SyncEventRecord};
use crate::reconcile::{load_more, reconcile_confirmed, ReconcileOutcome, Reconciled};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tonhub_params::{RetryParams, SyncParams};
use tonhub_storage::{AccountAddress, AccountRepository, AccountStatus};
use tracing::debug;

/// Driver configuration
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Paging and polling tunables
    pub params: SyncParams,
    /// Retry policy for remote calls
    pub retry: RetryParams,
}

impl SyncConfig {
    /// Defaults with `TONHUB_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            params: SyncParams::from_env()?,
            retry: RetryParams::from_env()?,
        })
    }
}

/// Outcome of one sync iteration
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Branch taken by the reconcile step
    pub outcome: ReconcileOutcome,
    /// Transaction bodies newly written to storage
    pub new_transactions: usize,
    /// Status after the iteration
    pub status: AccountStatus,
}

enum Command {
    SyncNow(oneshot::Sender<Result<SyncReport>>),
    LoadMore(oneshot::Sender<Result<usize>>),
}

/// Account sync driver
pub struct AccountSync {
    address: AccountAddress,
    source: Arc<dyn AccountSource>,
    repository: AccountRepository,
    params: SyncParams,
    retry: RetryPolicy,
    status_tx: watch::Sender<Option<AccountStatus>>,
    events: Arc<Mutex<SyncEventLog>>,
    history_loss_streak: u32,
}

impl AccountSync {
    /// Create a driver seeded with the persisted status of `address`
    pub fn new(
        address: AccountAddress,
        source: Arc<dyn AccountSource>,
        repository: AccountRepository,
        config: SyncConfig,
    ) -> Result<Self> {
        config.params.validate()?;
        let persisted = repository.load_status(&address)?;
        let (status_tx, _) = watch::channel(persisted);
        let events = SyncEventLog::new(address.clone(), config.params.event_history);

        Ok(Self {
            address,
            source,
            repository,
            params: config.params,
            retry: RetryPolicy::new(config.retry),
            status_tx,
            events: Arc::new(Mutex::new(events)),
            history_loss_streak: 0,
        })
    }

    /// Watched address
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    /// Receiver of published statuses (`None` until the first sync)
    pub fn subscribe(&self) -> watch::Receiver<Option<AccountStatus>> {
        self.status_tx.subscribe()
    }

    /// Last published status
    pub fn status(&self) -> Option<AccountStatus> {
        self.status_tx.borrow().clone()
    }

    /// Retained sync events, oldest first
    pub fn events(&self) -> Vec<SyncEventRecord> {
        self.events.lock().events()
    }

    /// Run one fetch-reconcile-persist-publish iteration
    pub async fn sync_once(&mut self, cancel: &CancelToken) -> Result<SyncReport> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let prior = self.repository.load_status(&self.address)?;
        let source = self.source.as_ref();
        let address = &self.address;

        let remote = self
            .retry
            .run_with(
                "fetch_account_state",
                cancel,
                || source.fetch_account_state(address),
                retry_observer(&self.events, "fetch_account_state"),
            )
            .await?;

        let loses_history = prior
            .as_ref()
            .is_some_and(|p| p.last_transaction.is_some() && remote.last_transaction.is_none());
        self.history_loss_streak = if loses_history {
            self.history_loss_streak.saturating_add(1)
        } else {
            0
        };
        let confirmed = self.history_loss_streak >= self.params.history_clear_confirmations;

        let params = &self.params;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let reconciled = self
            .retry
            .run_with(
                "reconcile",
                cancel,
                || reconcile_confirmed(source, address, &remote, prior.as_ref(), params, now_ms, confirmed),
                retry_observer(&self.events, "reconcile"),
            )
            .await?;

        // A result that arrives after cancellation is dropped unpersisted
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let new_transactions = self
            .repository
            .save_transactions(&self.address, &reconciled.transactions)?;
        self.repository.save_status(&self.address, &reconciled.status)?;
        if reconciled.outcome == ReconcileOutcome::HistoryCleared {
            self.history_loss_streak = 0;
        }

        self.record_outcome(&reconciled);
        self.status_tx.send_replace(Some(reconciled.status.clone()));

        Ok(SyncReport {
            outcome: reconciled.outcome,
            new_transactions,
            status: reconciled.status,
        })
    }

    /// Page in one page of older history, returning how many ids were added
    pub async fn load_more(&mut self, cancel: &CancelToken) -> Result<usize> {
        let Some(prior) = self.repository.load_status(&self.address)? else {
            return Ok(0);
        };
        let source = self.source.as_ref();
        let address = &self.address;
        let params = &self.params;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let loaded = self
            .retry
            .run_with(
                "load_more",
                cancel,
                || load_more(source, address, &prior, params, now_ms),
                retry_observer(&self.events, "load_more"),
            )
            .await?;
        let Some(loaded) = loaded else {
            return Ok(0);
        };
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.repository
            .save_transactions(&self.address, &loaded.transactions)?;
        self.repository.save_status(&self.address, &loaded.status)?;

        let added = loaded.transactions.len();
        self.events.lock().record(SyncEvent::MoreLoaded {
            added,
            complete: loaded.status.is_history_complete(),
        });
        self.status_tx.send_replace(Some(loaded.status));
        Ok(added)
    }

    /// Poll until `cancel` fires
    ///
    /// Failed iterations are logged and retried on the next tick; the loop
    /// never exits on its own.
    pub async fn run(&mut self, cancel: &CancelToken) {
        self.drive(cancel, None).await
    }

    /// Move the driver onto its own task
    pub fn spawn(self) -> SyncHandle {
        self.spawn_after(None)
    }

    /// Like [`AccountSync::spawn`], but the first iteration waits until
    /// `previous` (a stopping driver of the same address) has exited
    pub fn spawn_after(self, previous: Option<SyncHandle>) -> SyncHandle {
        let (commands, rx) = mpsc::channel(16);
        let cancel = CancelToken::new();
        let handle_cancel = cancel.clone();
        let address = self.address.clone();
        let status_rx = self.subscribe();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.stop().await;
            }
            let mut sync = self;
            sync.drive(&cancel, Some(rx)).await;
        });

        SyncHandle {
            address,
            status_rx,
            events,
            commands,
            _guard: handle_cancel.drop_guard(),
            cancel: handle_cancel,
            task,
        }
    }

    async fn drive(&mut self, cancel: &CancelToken, mut commands: Option<mpsc::Receiver<Command>>) {
        self.events.lock().record(SyncEvent::Started {
            has_status: self.status_tx.borrow().is_some(),
        });

        let interval = self.params.poll_interval;
        let mut next_poll = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = next_command(&mut commands) => match command {
                    Some(Command::SyncNow(reply)) => {
                        let result = self.sync_once(cancel).await;
                        next_poll = Instant::now() + interval;
                        let _ = reply.send(result);
                    }
                    Some(Command::LoadMore(reply)) => {
                        let result = self.load_more(cancel).await;
                        let _ = reply.send(result);
                    }
                    None => commands = None,
                },
                _ = tokio::time::sleep_until(next_poll) => {
                    self.iterate(cancel).await;
                    next_poll = Instant::now() + interval;
                }
            }
        }

        self.events.lock().record(SyncEvent::Stopped);
    }

    async fn iterate(&mut self, cancel: &CancelToken) {
        match self.sync_once(cancel).await {
            Ok(report) => debug!(
                "{}: {:?}, {} new transactions",
                self.address, report.outcome, report.new_transactions
            ),
            Err(Error::Cancelled) => {}
            Err(e) => self
                .events
                .lock()
                .record(SyncEvent::IterationFailed { error: e.to_string() }),
        }
    }

    fn record_outcome(&self, reconciled: &Reconciled) {
        let status = &reconciled.status;
        let event = match reconciled.outcome {
            ReconcileOutcome::Initial | ReconcileOutcome::HistoryStarted => SyncEvent::Initial {
                transactions: status.loaded_transactions,
                complete: status.is_history_complete(),
            },
            ReconcileOutcome::Unchanged => SyncEvent::Unchanged,
            ReconcileOutcome::Advanced { new } => SyncEvent::Advanced {
                new_transactions: new,
                last_lt: status.transactions.first().copied().unwrap_or_default(),
            },
            ReconcileOutcome::GapReset => SyncEvent::GapReset {
                transactions: status.loaded_transactions,
            },
            ReconcileOutcome::HistoryCleared => SyncEvent::HistoryCleared,
            ReconcileOutcome::HistoryLossPending => SyncEvent::HistoryLossPending {
                observed: self.history_loss_streak,
                required: self.params.history_clear_confirmations,
            },
            ReconcileOutcome::StateChanged => SyncEvent::StateChanged,
        };
        self.events.lock().record(event);
    }
}

fn retry_observer<'a>(
    events: &'a Mutex<SyncEventLog>,
    operation: &'a str,
) -> impl FnMut(u32, Duration, &Error) + 'a {
    move |attempt, delay, error| {
        events.lock().record(SyncEvent::RetryScheduled {
            operation: operation.to_string(),
            attempt,
            delay_ms: delay.as_millis() as u64,
            error: error.to_string(),
        })
    }
}

async fn next_command(commands: &mut Option<mpsc::Receiver<Command>>) -> Option<Command> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to a spawned [`AccountSync`]
///
/// Dropping the handle cancels the driver.
pub struct SyncHandle {
    address: AccountAddress,
    status_rx: watch::Receiver<Option<AccountStatus>>,
    events: Arc<Mutex<SyncEventLog>>,
    commands: mpsc::Sender<Command>,
    cancel: CancelToken,
    task: JoinHandle<()>,
    _guard: CancelOnDrop,
}

impl SyncHandle {
    /// Watched address
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }

    /// Receiver of published statuses
    pub fn subscribe(&self) -> watch::Receiver<Option<AccountStatus>> {
        self.status_rx.clone()
    }

    /// Last published status
    pub fn status(&self) -> Option<AccountStatus> {
        self.status_rx.borrow().clone()
    }

    /// Retained sync events, oldest first
    pub fn events(&self) -> Vec<SyncEventRecord> {
        self.events.lock().events()
    }

    /// Retained sync events as text lines
    pub fn export_events(&self) -> Vec<String> {
        self.events.lock().export_events()
    }

    /// Run an iteration now instead of waiting for the next tick
    pub async fn sync_now(&self) -> Result<SyncReport> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SyncNow(reply))
            .await
            .map_err(|_| Error::Stopped)?;
        rx.await.map_err(|_| Error::Stopped)?
    }

    /// Page in older history on the driver task
    pub async fn load_more(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::LoadMore(reply))
            .await
            .map_err(|_| Error::Stopped)?;
        rx.await.map_err(|_| Error::Stopped)?
    }

    /// Ask the driver to stop without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// `true` once the driver task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the driver and wait for its task to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Account sync task for {} failed: {}", self.address, e);
        }
    }
}
