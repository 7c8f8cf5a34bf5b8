//! # Subscription Primitive
//!
//! Binds a query factory and its parameters to the store's current chain
//! client and keeps exactly one live node subscription for them.
//!
//! Whether a subscription should run is decided by a [`DependencyKey`]:
//! the installed client's id, the serialized parameters and the enabled flag.
//! Whenever the key changes the previous subscription is torn down first, and
//! a new one is opened if the subscription can run.
//!
//! Opening a subscription is asynchronous, so a teardown may happen before the
//! subscribe call resolves. Every attempt carries its own `cancelled` flag: a
//! handle returned to a cancelled attempt is released immediately, and
//! emissions addressed to anything but the current attempt on the current
//! client are dropped.

use crate::{
    api::ChainClient, error::SubscriptionError, store::SessionStore, sync::lock,
};
use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};
use subconnect_connector::Unsubscribe;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

/// Delivers one raw emission to the subscription.
pub type Emit<R> = Arc<dyn Fn(R) + Send + Sync>;

/// Opens a node subscription with resolved parameters.
pub type SubscribeFn<R> = Arc<
    dyn Fn(Vec<Value>, Emit<R>) -> BoxFuture<'static, Result<Unsubscribe, SubscriptionError>>
        + Send
        + Sync,
>;

/// Resolves the subscribe operation for a client. `None` means the client
/// does not support the query.
pub type Factory<R> = Arc<dyn Fn(&ChainClient) -> Option<SubscribeFn<R>> + Send + Sync>;

/// Converts a raw emission into the value exposed to consumers.
pub type Transform<R, T> = Arc<dyn Fn(R) -> Result<T, String> + Send + Sync>;

/// A factory forwarding to [`crate::ChainApi::subscribe`] with `method`.
pub fn rpc_factory(method: impl Into<String>) -> Factory<Value> {
    let method: String = method.into();
    Arc::new(move |client: &ChainClient| {
        let api = client.api.clone();
        let method = method.clone();
        let subscribe: SubscribeFn<Value> = Arc::new(move |params: Vec<Value>, emit: Emit<Value>| {
            let api = api.clone();
            let method = method.clone();
            async move {
                api.subscribe(&method, params, Box::new(move |value| emit(value)))
                    .await
                    .map_err(|e| SubscriptionError::Subscribe(e.to_string()))
            }
            .boxed()
        });
        Some(subscribe)
    })
}

/// Subscription parameters.
#[derive(Clone)]
pub enum Params {
    Static(Vec<Value>),
    /// Computed from the client. `None` means the parameters are not
    /// resolvable yet and the subscription must not run.
    Derived(Arc<dyn Fn(&ChainClient) -> Option<Vec<Value>> + Send + Sync>),
}

impl Params {
    pub fn none() -> Self {
        Params::Static(Vec::new())
    }

    fn resolve(&self, client: &ChainClient) -> Option<Vec<Value>> {
        match self {
            Params::Static(params) => Some(params.clone()),
            Params::Derived(derive) => derive(client),
        }
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Params::Static(params) => f.debug_tuple("Static").field(params).finish(),
            Params::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

pub struct SubscriptionOptions<R, T> {
    pub enabled: bool,
    pub transform: Transform<R, T>,
    pub default_value: Option<T>,
}

impl<R, T> SubscriptionOptions<R, T> {
    pub fn new(transform: impl Fn(R) -> Result<T, String> + Send + Sync + 'static) -> Self {
        Self {
            enabled: true,
            transform: Arc::new(transform),
            default_value: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn default_value(mut self, value: T) -> Self {
        self.default_value = Some(value);
        self
    }
}

impl<T: 'static> SubscriptionOptions<T, T> {
    /// Options exposing raw emissions unchanged.
    pub fn identity() -> Self {
        Self::new(|value| Ok(value))
    }
}

/// What consumers observe.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionState<T> {
    pub data: Option<T>,
    pub error: Option<SubscriptionError>,
    pub is_loading: bool,
}

/// The inputs whose change forces a re-subscription, compared by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyKey {
    pub client_id: Option<u64>,
    pub params: Option<String>,
    pub enabled: bool,
}

impl DependencyKey {
    fn can_subscribe(&self) -> bool {
        self.enabled && self.client_id.is_some() && self.params.is_some()
    }
}

struct Shared<R, T> {
    state: watch::Sender<SubscriptionState<T>>,
    transform: Mutex<Transform<R, T>>,
    /// Id of the attempt allowed to deliver data.
    current_attempt: AtomicU64,
    /// The adopted unsubscribe handle and the attempt it belongs to.
    live: Mutex<Option<(u64, Unsubscribe)>>,
}

struct Attempt {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

/// One consumer's subscription, bound to a [`SessionStore`].
///
/// Drive it by calling [`Subscription::update`] after store changes, or hand
/// it to [`Subscription::spawn`] to have a background task do so.
pub struct Subscription<R, T> {
    store: SessionStore,
    factory: Factory<R>,
    params: Params,
    enabled: bool,
    default_value: Option<T>,
    shared: Arc<Shared<R, T>>,
    key: Option<DependencyKey>,
    attempt: Option<Attempt>,
    next_attempt: u64,
}

impl<R, T> Subscription<R, T>
where
    R: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        store: SessionStore,
        factory: Factory<R>,
        params: Params,
        options: SubscriptionOptions<R, T>,
    ) -> Self {
        let initial = SubscriptionState {
            data: options.default_value.clone(),
            error: None,
            is_loading: options.enabled && options.default_value.is_none(),
        };
        let (state, _) = watch::channel(initial);
        Self {
            store,
            factory,
            params,
            enabled: options.enabled,
            default_value: options.default_value,
            shared: Arc::new(Shared {
                state,
                transform: Mutex::new(options.transform),
                current_attempt: AtomicU64::new(0),
                live: Mutex::new(None),
            }),
            key: None,
            attempt: None,
            next_attempt: 0,
        }
    }

    pub fn state(&self) -> SubscriptionState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SubscriptionState<T>> {
        self.shared.state.subscribe()
    }

    /// Whether a node subscription is currently adopted.
    pub fn is_live(&self) -> bool {
        lock(&self.shared.live).is_some()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.update();
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = params;
        self.update();
    }

    /// Replaces the transform. Applies to later emissions only and never
    /// re-subscribes.
    pub fn set_transform(&mut self, transform: Transform<R, T>) {
        *lock(&self.shared.transform) = transform;
    }

    /// Re-evaluates the dependencies against the store and re-subscribes if
    /// they changed. Must run inside a Tokio runtime.
    pub fn update(&mut self) {
        let client = self.store.current_api().filter(|_| self.store.is_api_ready());

        let subscribe = client.as_ref().and_then(|c| (self.factory)(c));
        let params = client.as_ref().and_then(|c| self.params.resolve(c));
        let key = DependencyKey {
            client_id: client.as_ref().filter(|_| subscribe.is_some()).map(|c| c.id),
            params: params
                .as_ref()
                .and_then(|p| serde_json::to_string(p).ok()),
            enabled: self.enabled,
        };

        if self.key.as_ref() == Some(&key) {
            return;
        }
        self.teardown();

        match (key.can_subscribe(), client, subscribe, params) {
            (true, Some(client), Some(subscribe), Some(params)) => {
                self.shared.state.send_modify(|s| {
                    s.is_loading = true;
                    s.error = None;
                });
                self.open(client.id, subscribe, params);
            }
            _ => self.reset(),
        }
        self.key = Some(key);
    }

    /// Tears down the live subscription and stops reacting to emissions.
    pub fn stop(&mut self) {
        self.teardown();
        self.key = None;
    }

    /// Runs the subscription on a background task that follows the store.
    pub fn spawn(mut self) -> SubscriptionHandle<R, T> {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let state_rx = self.watch();
        let mut store_rx = self.store.watch();

        let task = tokio::spawn(async move {
            self.update();
            loop {
                tokio::select! {
                    changed = store_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        self.update();
                    }
                    command = command_rx.recv() => match command {
                        Some(SubscriptionCommand::SetEnabled(enabled)) => self.set_enabled(enabled),
                        Some(SubscriptionCommand::SetParams(params)) => self.set_params(params),
                        Some(SubscriptionCommand::SetTransform(transform)) => self.set_transform(transform),
                        Some(SubscriptionCommand::Stop) | None => break,
                    },
                }
            }
            self.stop();
        });

        SubscriptionHandle {
            command_tx,
            state_rx,
            task,
        }
    }

    fn open(&mut self, client_id: u64, subscribe: SubscribeFn<R>, params: Vec<Value>) {
        self.next_attempt += 1;
        let id = self.next_attempt;
        let cancelled = Arc::new(AtomicBool::new(false));
        self.shared.current_attempt.store(id, Ordering::SeqCst);
        self.attempt = Some(Attempt {
            id,
            cancelled: cancelled.clone(),
        });

        let emit: Emit<R> = {
            let shared = self.shared.clone();
            let store = self.store.clone();
            let cancelled = cancelled.clone();
            Arc::new(move |raw: R| {
                let current = !cancelled.load(Ordering::SeqCst)
                    && shared.current_attempt.load(Ordering::SeqCst) == id
                    && store.current_api_id() == Some(client_id);
                if !current {
                    trace!(attempt = id, "Dropping emission for a stale subscription");
                    return;
                }
                let transform = lock(&shared.transform).clone();
                let result = transform(raw);
                shared.state.send_modify(|s| {
                    match result {
                        Ok(value) => {
                            s.data = Some(value);
                            s.error = None;
                        }
                        Err(reason) => s.error = Some(SubscriptionError::Transform(reason)),
                    }
                    s.is_loading = false;
                });
            })
        };

        let pending = subscribe(params, emit);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            match pending.await {
                Ok(unsubscribe) => {
                    let mut live = lock(&shared.live);
                    if cancelled.load(Ordering::SeqCst) {
                        drop(live);
                        debug!(attempt = id, "Subscribe resolved after teardown, releasing handle");
                        unsubscribe();
                    } else {
                        *live = Some((id, unsubscribe));
                    }
                }
                Err(e) => {
                    if cancelled.load(Ordering::SeqCst) {
                        return;
                    }
                    warn!(attempt = id, "Subscribe failed: {}", e);
                    shared.state.send_modify(|s| {
                        s.error = Some(e);
                        s.is_loading = false;
                    });
                }
            }
        });
    }

    fn teardown(&mut self) {
        let Some(attempt) = self.attempt.take() else {
            return;
        };
        attempt.cancelled.store(true, Ordering::SeqCst);
        let live = lock(&self.shared.live).take();
        if let Some((id, unsubscribe)) = live {
            debug!(attempt = id, "Tearing down subscription");
            unsubscribe();
        } else {
            debug!(attempt = attempt.id, "Cancelling pending subscription");
        }
    }

    fn reset(&mut self) {
        let data = self.default_value.clone();
        let is_loading = self.enabled && data.is_none();
        self.shared.state.send_modify(|s| {
            s.data = data;
            s.error = None;
            s.is_loading = is_loading;
        });
    }
}

impl<R, T> Drop for Subscription<R, T> {
    fn drop(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.cancelled.store(true, Ordering::SeqCst);
            if let Some((_, unsubscribe)) = lock(&self.shared.live).take() {
                unsubscribe();
            }
        }
    }
}

enum SubscriptionCommand<R, T> {
    SetEnabled(bool),
    SetParams(Params),
    SetTransform(Transform<R, T>),
    Stop,
}

/// Controls a [`Subscription`] running on a background task.
///
/// Dropping the handle stops the subscription.
pub struct SubscriptionHandle<R, T> {
    command_tx: mpsc::UnboundedSender<SubscriptionCommand<R, T>>,
    state_rx: watch::Receiver<SubscriptionState<T>>,
    task: JoinHandle<()>,
}

impl<R, T: Clone> SubscriptionHandle<R, T> {
    pub fn state(&self) -> SubscriptionState<T> {
        self.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SubscriptionState<T>> {
        self.state_rx.clone()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.send(SubscriptionCommand::SetEnabled(enabled));
    }

    pub fn set_params(&self, params: Params) {
        self.send(SubscriptionCommand::SetParams(params));
    }

    pub fn set_transform(&self, transform: impl Fn(R) -> Result<T, String> + Send + Sync + 'static) {
        self.send(SubscriptionCommand::SetTransform(Arc::new(transform)));
    }

    /// Stops the subscription and waits for its task to finish.
    pub async fn stop(self) {
        self.send(SubscriptionCommand::Stop);
        if let Err(e) = self.task.await {
            warn!("Subscription task ended abnormally: {}", e);
        }
    }

    fn send(&self, command: SubscriptionCommand<R, T>) {
        if self.command_tx.send(command).is_err() {
            warn!("Subscription task is no longer running");
        }
    }
}
