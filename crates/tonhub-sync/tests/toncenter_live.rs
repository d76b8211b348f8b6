//! Live tests against toncenter
//!
//! Run with:
//!   cargo test --package tonhub-sync --features live_toncenter -- --ignored
#![cfg(feature = "live_toncenter")]

use std::sync::Arc;
use tonhub_params::{Network, RetryParams, SyncParams};
use tonhub_storage::{AccountAddress, AccountRepository, MemoryStore};
use tonhub_sync::{
    AccountSource, AccountSync, CancelToken, ReconcileOutcome, SyncConfig, TonCenterClient,
    TonCenterConfig,
};

const FOUNDATION: &str = "EQCD39VS5jcptHL8vMjEXrzGaRcCVYto7HUn4bpAOg8xqB2N";

fn client() -> TonCenterClient {
    let mut config = TonCenterConfig::for_network(&Network::mainnet());
    if let Ok(key) = std::env::var("TONCENTER_API_KEY") {
        config = config.with_api_key(key);
    }
    TonCenterClient::new(config).unwrap()
}

#[tokio::test]
#[ignore = "Requires live network"]
async fn test_fetch_account_state() {
    let address = AccountAddress::parse(FOUNDATION).unwrap();
    let state = client().fetch_account_state(&address).await.unwrap();
    let last = state.last_transaction.expect("foundation wallet has history");

    let page = client().fetch_transactions(&address, 5, &last).await.unwrap();
    assert!(!page.is_empty());
    assert_eq!(page[0].id, last);
}

#[tokio::test]
#[ignore = "Requires live network"]
async fn test_initial_sync_against_mainnet() {
    let address = AccountAddress::parse(FOUNDATION).unwrap();
    let repo = AccountRepository::new(Arc::new(MemoryStore::new()));
    let config = SyncConfig {
        params: SyncParams {
            page_size: 10,
            ..SyncParams::default()
        },
        retry: RetryParams::bounded(5),
    };

    let mut sync = AccountSync::new(address, Arc::new(client()), repo, config).unwrap();
    let report = sync.sync_once(&CancelToken::new()).await.unwrap();
    assert_eq!(report.outcome, ReconcileOutcome::Initial);
    assert!(report.status.loaded_transactions <= 10);
    println!("Initial sync: {:?}", report.status);
}
