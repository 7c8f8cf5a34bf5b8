mod common;

use common::*;
use std::sync::{atomic::Ordering, Arc};
use subconnect_core::{create_api, ApiError, ChainApi, ConfigError, MemoryStorage};

#[tokio::test]
async fn create_api_connects_and_verifies_genesis() {
    let config = config(vec![], Arc::new(MemoryStorage::new()));
    let factory = FakeFactory::new();

    let client = create_api(&config, KUSAMA, factory.as_ref()).await.unwrap();

    assert_eq!(client.chain_id, KUSAMA);
    assert_eq!(client.chain_name, "Kusama");
    assert!(client.api.is_connected());
    assert!(!client.is_ethereum);
    assert_eq!(client.properties.token_decimals, vec![10]);
}

#[tokio::test]
async fn clients_get_distinct_identities() {
    let config = config(vec![], Arc::new(MemoryStorage::new()));
    let factory = FakeFactory::new();

    let first = create_api(&config, POLKADOT, factory.as_ref()).await.unwrap();
    let second = create_api(&config, POLKADOT, factory.as_ref()).await.unwrap();

    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn genesis_mismatch_disconnects_the_fresh_client() {
    let config = config(vec![], Arc::new(MemoryStorage::new()));
    let factory = FakeFactory::new();
    factory
        .reported
        .lock()
        .unwrap()
        .insert(POLKADOT.to_string(), KUSAMA.to_string());

    let err = create_api(&config, POLKADOT, factory.as_ref())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::ChainMismatch {
            expected: POLKADOT.to_string(),
            actual: KUSAMA.to_string(),
        }
    );
    let api = factory.last();
    assert!(!api.is_connected());
    assert_eq!(api.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn genesis_comparison_ignores_hex_case() {
    let config = config(vec![], Arc::new(MemoryStorage::new()));
    let factory = FakeFactory::new();
    factory
        .reported
        .lock()
        .unwrap()
        .insert(POLKADOT.to_string(), POLKADOT.to_uppercase().replace("0X", "0x"));

    let client = create_api(&config, POLKADOT, factory.as_ref()).await.unwrap();

    assert_eq!(client.chain_id, POLKADOT);
}

#[tokio::test]
async fn unknown_chain_is_a_configuration_error() {
    let config = config(vec![], Arc::new(MemoryStorage::new()));
    let factory = FakeFactory::new();

    let err = create_api(&config, "0xdead", factory.as_ref())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ApiError::Configuration(ConfigError::UnknownChain("0xdead".into()))
    );
    assert!(factory.built.lock().unwrap().is_empty());
}

#[tokio::test]
async fn connection_failures_name_the_chain() {
    let config = config(vec![], Arc::new(MemoryStorage::new()));
    let factory = FakeFactory::new();
    factory.failing.lock().unwrap().push(KUSAMA.to_string());

    let err = create_api(&config, KUSAMA, factory.as_ref())
        .await
        .unwrap_err();

    match err {
        ApiError::Connection { chain_name, reason } => {
            assert_eq!(chain_name, "Kusama");
            assert!(reason.contains("connection refused"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let refused = factory.last();
    assert_eq!(refused.disconnects.load(Ordering::SeqCst), 1);
    assert!(!refused.is_connected());
}

#[tokio::test]
async fn ethereum_flag_comes_from_chain_properties() {
    let config = config(vec![], Arc::new(MemoryStorage::new()));
    let factory = FakeFactory::new();
    factory.ethereum.lock().unwrap().push(POLKADOT.to_string());

    let client = create_api(&config, POLKADOT, factory.as_ref()).await.unwrap();

    assert!(client.is_ethereum);
}
