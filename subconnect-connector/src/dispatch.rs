//! Environment-dispatching connectors.
//!
//! Some wallets are reached differently depending on where the application
//! runs: on a phone the wallet's in-app browser injects a provider, on a
//! desktop the same wallet pairs over a relay. An [`EnvironmentConnector`]
//! picks the delegate for the current environment and re-emits the
//! delegate's events on its own emitter.

use crate::{
    account::Account,
    chain::Chain,
    connector::{Connector, ConnectorInfo, ConnectorState, WalletConnector},
    error::ConnectorError,
    events::{ConnectorEvent, EventEmitter, EventKind, ListenerId},
    signer::Signer,
    sync::lock,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Runtime facts about the host.
pub trait Environment: Send + Sync {
    fn is_mobile(&self) -> bool;
}

/// An [`Environment`] with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedEnvironment {
    pub mobile: bool,
}

impl Environment for FixedEnvironment {
    fn is_mobile(&self) -> bool {
        self.mobile
    }
}

const FORWARDED: [EventKind; 4] = [
    EventKind::Connect,
    EventKind::Disconnect,
    EventKind::AccountsChanged,
    EventKind::GetUri,
];

pub struct EnvironmentConnector {
    info: ConnectorInfo,
    environment: Arc<dyn Environment>,
    desktop: Arc<WalletConnector>,
    mobile: Arc<WalletConnector>,
    events: Arc<EventEmitter>,
    forwards: Mutex<Vec<(Arc<WalletConnector>, ListenerId)>>,
}

impl EnvironmentConnector {
    pub fn new(
        info: ConnectorInfo,
        environment: Arc<dyn Environment>,
        desktop: Arc<WalletConnector>,
        mobile: Arc<WalletConnector>,
    ) -> Self {
        Self {
            info,
            environment,
            desktop,
            mobile,
            events: Arc::new(EventEmitter::new()),
            forwards: Mutex::new(Vec::new()),
        }
    }

    /// The connector used in the current environment.
    pub fn delegate(&self) -> &Arc<WalletConnector> {
        if self.environment.is_mobile() {
            &self.mobile
        } else {
            &self.desktop
        }
    }

    fn forward_events(&self, delegate: &Arc<WalletConnector>) {
        self.drop_forwards();
        let mut forwards = lock(&self.forwards);
        for kind in FORWARDED {
            let events = self.events.clone();
            let id = delegate.on(kind, move |event: &ConnectorEvent| {
                events.emit(event.clone());
            });
            forwards.push((delegate.clone(), id));
        }
    }

    fn drop_forwards(&self) {
        let forwards = std::mem::take(&mut *lock(&self.forwards));
        for (connector, id) in forwards {
            connector.off(id);
        }
    }
}

#[async_trait]
impl Connector for EnvironmentConnector {
    fn info(&self) -> &ConnectorInfo {
        &self.info
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn state(&self) -> ConnectorState {
        self.delegate().state()
    }

    fn is_installed(&self) -> bool {
        self.delegate().is_installed()
    }

    async fn is_available(&self) -> bool {
        self.delegate().is_available().await
    }

    async fn connect(
        &self,
        app_name: &str,
        chains: &[Chain],
        target_chain_id: Option<&str>,
    ) -> Result<Vec<Account>, ConnectorError> {
        let delegate = self.delegate().clone();
        tracing::debug!(
            connector = %self.info.id,
            delegate = %delegate.id(),
            mobile = self.environment.is_mobile(),
            "Dispatching connect"
        );
        self.forward_events(&delegate);
        let result = delegate.connect(app_name, chains, target_chain_id).await;
        if result.is_err() {
            self.drop_forwards();
        }
        result
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.delegate().disconnect().await?;
        self.drop_forwards();
        Ok(())
    }

    fn accounts(&self) -> Vec<Account> {
        self.delegate().accounts()
    }

    fn signer(&self) -> Option<Arc<dyn Signer>> {
        self.delegate().signer()
    }

    async fn sign_message(
        &self,
        message: &str,
        address: &str,
    ) -> Result<Option<String>, ConnectorError> {
        self.delegate().sign_message(message, address).await
    }

    fn has_connection_uri(&self) -> bool {
        self.delegate().has_connection_uri()
    }

    async fn connection_uri(&self) -> Option<String> {
        self.delegate().connection_uri().await
    }
}
