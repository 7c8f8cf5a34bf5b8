//! # Chain Sync
//!
//! The effect layer between the [`SessionStore`] and the chain client
//! lifecycle. It observes the store's chain selection and, for every new
//! selection, disconnects the previously installed client, builds a fresh one
//! with [`create_api`] and writes it back into the store.
//!
//! Client creation runs on its own task per selection, so a node that never
//! answers does not hold up later selections or shutdown. A client built for a
//! selection that has been superseded in the meantime is disconnected instead
//! of installed.

use crate::{
    api::{create_api, ApiFactory, ChainClient},
    config::SessionConfig,
    error::ApiError,
    store::SessionStore,
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, warn};

/// What a creation task reports back: the selection it served and its result.
type Created = (u64, String, Result<ChainClient, ApiError>);

/// A clonable handle for stopping a running [`ChainSync`].
#[derive(Debug, Clone)]
pub struct ChainSyncHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ChainSyncHandle {
    /// Asks the running [`ChainSync`] to disconnect its client and exit.
    pub async fn stop(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Chain sync already stopped");
        }
    }
}

/// Keeps the store's chain client in step with its selected chain.
///
/// Created with [`ChainSync::new`]; [`ChainSync::run`] consumes it and should
/// be spawned as a background task.
pub struct ChainSync {
    store: SessionStore,
    factory: Arc<dyn ApiFactory>,
    installed: Option<ChainClient>,
    handled_generation: u64,
    pending: JoinSet<Created>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ChainSync {
    pub fn new(store: SessionStore, factory: Arc<dyn ApiFactory>) -> (Self, ChainSyncHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let sync = Self {
            store,
            factory,
            installed: None,
            handled_generation: 0,
            pending: JoinSet::new(),
            shutdown_rx,
        };
        (sync, ChainSyncHandle { shutdown_tx })
    }

    /// Runs until [`ChainSyncHandle::stop`] is called or every handle has
    /// been dropped.
    ///
    /// Creation tasks still pending on exit are aborted.
    pub async fn run(mut self) {
        info!("Chain sync started");
        let mut state_rx = self.store.watch();
        state_rx.mark_changed();

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let (generation, chain_id, config) = {
                        let state = state_rx.borrow_and_update();
                        (state.chain_generation, state.current_chain_id.clone(), state.config.clone())
                    };
                    if generation == self.handled_generation {
                        continue;
                    }
                    self.handled_generation = generation;
                    self.start(generation, chain_id, config);
                }
                Some(joined) = self.pending.join_next(), if !self.pending.is_empty() => {
                    match joined {
                        Ok(created) => self.finish(created),
                        Err(e) => warn!("Chain client task ended abnormally: {}", e),
                    }
                }
                _ = self.shutdown_rx.recv() => break,
            }
        }

        self.pending.abort_all();
        if let Some(client) = self.installed.take() {
            client.disconnect().await;
        }
        info!("Chain sync stopped");
    }

    /// Releases the installed client and starts building one for the new
    /// selection.
    fn start(&mut self, generation: u64, chain_id: Option<String>, config: Option<Arc<SessionConfig>>) {
        let previous = self.installed.take();
        let (Some(chain_id), Some(config)) = (chain_id, config) else {
            if let Some(previous) = previous {
                tokio::spawn(async move { previous.disconnect().await });
            }
            return;
        };
        let factory = self.factory.clone();

        debug!(chain_id = %chain_id, generation, "Building chain client");
        self.pending.spawn(async move {
            if let Some(previous) = previous {
                debug!(chain_id = %previous.chain_id, client_id = previous.id, "Disconnecting previous chain client");
                previous.disconnect().await;
            }
            let result = create_api(&config, &chain_id, factory.as_ref()).await;
            (generation, chain_id, result)
        });
    }

    fn finish(&mut self, (generation, chain_id, result): Created) {
        match result {
            Ok(client) => {
                if self.store.install_api(generation, client.clone()) {
                    self.installed = Some(client);
                } else {
                    info!(chain_id = %chain_id, client_id = client.id, "Discarding chain client for a superseded chain selection");
                    tokio::spawn(async move { client.disconnect().await });
                }
            }
            Err(e) => {
                error!(chain_id = %chain_id, "Failed to create chain client: {}", e);
                self.store.fail_api(generation, &chain_id, &e);
            }
        }
    }
}
