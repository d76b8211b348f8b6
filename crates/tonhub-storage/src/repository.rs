//! Data access layer for account sync

use crate::codec::{parse_status, serialize_status};
use crate::keys::{account_key, transaction_key, transaction_prefix};
use crate::kv::KeyValueStore;
use crate::models::{AccountAddress, AccountStatus, Lt, RawTransaction};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Repository over an injected key-value store
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct AccountRepository {
    store: Arc<dyn KeyValueStore>,
}

impl AccountRepository {
    /// Create repository
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the persisted status of `address`
    ///
    /// A record that fails to decode is deleted and reported as absent so
    /// the caller resyncs from scratch.
    pub fn load_status(&self, address: &AccountAddress) -> Result<Option<AccountStatus>> {
        let key = account_key(address);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(None);
        };
        match parse_status(&raw) {
            Ok(status) => Ok(Some(status)),
            Err(Error::MalformedStatus(reason)) => {
                warn!(
                    event = "malformed_status",
                    address = %address,
                    reason = %reason,
                    "Discarding unreadable account status, full resync follows"
                );
                self.store.remove(&key)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist the status of `address`
    pub fn save_status(&self, address: &AccountAddress, status: &AccountStatus) -> Result<()> {
        self.store
            .set(&account_key(address), &serialize_status(status))
    }

    /// Persist a fetched transaction body
    ///
    /// Bodies are append-only: returns `false` without writing when one is
    /// already stored under the same logical time.
    pub fn save_transaction(&self, address: &AccountAddress, tx: &RawTransaction) -> Result<bool> {
        let key = transaction_key(address, tx.id.lt);
        if self.store.contains(&key)? {
            debug!("Transaction {} already stored for {}", tx.id, address);
            return Ok(false);
        }
        self.store.set(&key, &tx.data)?;
        Ok(true)
    }

    /// Persist several bodies, returning how many were new
    pub fn save_transactions(&self, address: &AccountAddress, txs: &[RawTransaction]) -> Result<usize> {
        let mut written = 0;
        for tx in txs {
            if self.save_transaction(address, tx)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Load one transaction body
    pub fn load_transaction(&self, address: &AccountAddress, lt: Lt) -> Result<Option<String>> {
        self.store.get(&transaction_key(address, lt))
    }

    /// Bodies of every transaction listed in `status`, newest first
    ///
    /// A missing body yields `None` in its slot rather than an error.
    pub fn load_history(
        &self,
        address: &AccountAddress,
        status: &AccountStatus,
    ) -> Result<Vec<(Lt, Option<String>)>> {
        status
            .transactions
            .iter()
            .map(|lt| Ok((*lt, self.load_transaction(address, *lt)?)))
            .collect()
    }

    /// Logical times of every stored body of `address`, oldest first
    pub fn stored_transaction_lts(&self, address: &AccountAddress) -> Result<Vec<Lt>> {
        let prefix = transaction_prefix(address);
        self.store
            .keys_with_prefix(&prefix)?
            .iter()
            .map(|key| key[prefix.len()..].parse::<Lt>())
            .collect()
    }

    /// Delete all local state (sign-out)
    pub fn wipe(&self) -> Result<()> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::models::{AccountState, TransactionId};
    use num_bigint::BigUint;

    fn addr() -> AccountAddress {
        AccountAddress::parse(&format!("0:{}", "22".repeat(32))).unwrap()
    }

    fn status() -> AccountStatus {
        AccountStatus {
            balance: BigUint::from(5u32),
            state: AccountState::Active,
            last_transaction: Some(TransactionId::new(20, "b")),
            sync_time: 10,
            stored_at: 11,
            loaded_transactions: 2,
            transaction_cursor: None,
            transactions: vec![Lt(20), Lt(10)],
        }
    }

    fn tx(lt: u64, data: &str) -> RawTransaction {
        RawTransaction {
            id: TransactionId::new(lt, format!("h{lt}")),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_status_roundtrip() {
        let repo = AccountRepository::new(Arc::new(MemoryStore::new()));
        assert_eq!(repo.load_status(&addr()).unwrap(), None);

        repo.save_status(&addr(), &status()).unwrap();
        assert_eq!(repo.load_status(&addr()).unwrap(), Some(status()));
    }

    #[test]
    fn test_malformed_status_reads_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set(&account_key(&addr()), "{not json").unwrap();
        let repo = AccountRepository::new(store.clone());
        assert_eq!(repo.load_status(&addr()).unwrap(), None);
        assert!(!store.contains(&account_key(&addr())).unwrap());
    }

    #[test]
    fn test_transactions_are_append_only() {
        let repo = AccountRepository::new(Arc::new(MemoryStore::new()));
        assert!(repo.save_transaction(&addr(), &tx(10, "first")).unwrap());
        assert!(!repo.save_transaction(&addr(), &tx(10, "second")).unwrap());
        assert_eq!(
            repo.load_transaction(&addr(), Lt(10)).unwrap().as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_history_and_stored_lts() {
        let repo = AccountRepository::new(Arc::new(MemoryStore::new()));
        assert_eq!(repo.save_transactions(&addr(), &[tx(20, "b"), tx(9, "a")]).unwrap(), 2);

        let history = repo.load_history(&addr(), &status()).unwrap();
        assert_eq!(history, vec![(Lt(20), Some("b".to_string())), (Lt(10), None)]);

        assert_eq!(repo.stored_transaction_lts(&addr()).unwrap(), vec![Lt(9), Lt(20)]);
    }

    #[test]
    fn test_wipe() {
        let repo = AccountRepository::new(Arc::new(MemoryStore::new()));
        repo.save_status(&addr(), &status()).unwrap();
        repo.save_transaction(&addr(), &tx(20, "b")).unwrap();
        repo.wipe().unwrap();
        assert_eq!(repo.load_status(&addr()).unwrap(), None);
        assert_eq!(repo.load_transaction(&addr(), Lt(20)).unwrap(), None);
    }
}
