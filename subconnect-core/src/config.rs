use crate::{
    error::{ConfigError, StorageError},
    storage::{KeyValueStorage, MemoryStorage, SledStorage},
};
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};
use subconnect_connector::{Chain, WalletConnector};
use subconnect_logger::LogConfig;

const DEFAULT_APP_NAME: &str = "subconnect";

/// Endpoints used to reach one chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Transport {
    #[serde(default)]
    pub websocket: Vec<String>,
    #[serde(default)]
    pub http: Vec<String>,
}

impl Transport {
    pub fn websocket(url: impl Into<String>) -> Self {
        Self {
            websocket: vec![url.into()],
            http: Vec::new(),
        }
    }

    /// The endpoint a client should try first: websocket before http.
    pub fn preferred_endpoint(&self) -> Option<&str> {
        self.websocket
            .first()
            .or_else(|| self.http.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.websocket.is_empty() && self.http.is_empty()
    }
}

/// The validated configuration the session layer runs on.
///
/// Built through [`SessionConfig::builder`]. Chains are ordered: the first one
/// is the fallback chain.
#[derive(Clone)]
pub struct SessionConfig {
    pub app_name: String,
    pub chains: Vec<Chain>,
    pub connectors: Vec<Arc<WalletConnector>>,
    pub transports: HashMap<String, Transport>,
    pub storage: Arc<dyn KeyValueStorage>,
    pub auto_connect: bool,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Looks up a chain by genesis hash, ignoring hex case.
    pub fn chain(&self, chain_id: &str) -> Option<&Chain> {
        self.chains.iter().find(|chain| chain.is(chain_id))
    }

    pub fn default_chain(&self) -> &Chain {
        // `build` guarantees at least one chain.
        &self.chains[0]
    }

    pub fn connector(&self, connector_id: &str) -> Option<&Arc<WalletConnector>> {
        self.connectors.iter().find(|c| c.id() == connector_id)
    }

    pub fn transport(&self, chain_id: &str) -> Option<&Transport> {
        self.transports.get(chain_id).or_else(|| {
            self.transports
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(chain_id))
                .map(|(_, transport)| transport)
        })
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connectors: Vec<&str> = self.connectors.iter().map(|c| c.id()).collect();
        let chains: Vec<&str> = self.chains.iter().map(|c| c.genesis_hash.as_str()).collect();
        f.debug_struct("SessionConfig")
            .field("app_name", &self.app_name)
            .field("chains", &chains)
            .field("connectors", &connectors)
            .field("auto_connect", &self.auto_connect)
            .finish()
    }
}

/// Assembles and validates a [`SessionConfig`].
#[derive(Default)]
pub struct SessionConfigBuilder {
    app_name: Option<String>,
    chains: Vec<Chain>,
    connectors: Vec<Arc<WalletConnector>>,
    transports: HashMap<String, Transport>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    auto_connect: bool,
}

impl SessionConfigBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn chain(mut self, chain: Chain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn chains(mut self, chains: impl IntoIterator<Item = Chain>) -> Self {
        self.chains.extend(chains);
        self
    }

    pub fn transport(mut self, chain_id: impl Into<String>, transport: Transport) -> Self {
        self.transports.insert(chain_id.into(), transport);
        self
    }

    pub fn connector(mut self, connector: impl Into<Arc<WalletConnector>>) -> Self {
        self.connectors.push(connector.into());
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Validates the collected settings.
    ///
    /// Requires at least one chain, unique genesis hashes, a transport for
    /// every chain and unique connector ids. An empty connector list is
    /// allowed (read-only setups) and only logged.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::NoChains);
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.genesis_hash.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateChain(chain.genesis_hash.clone()));
            }
        }

        let mut ids = HashSet::new();
        for connector in &self.connectors {
            if !ids.insert(connector.id().to_string()) {
                return Err(ConfigError::DuplicateConnector(connector.id().to_string()));
            }
        }
        if self.connectors.is_empty() {
            tracing::warn!("No connectors configured, wallet connections will be unavailable");
        }

        let config = SessionConfig {
            app_name: self.app_name.unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            chains: self.chains,
            connectors: self.connectors,
            transports: self.transports,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            auto_connect: self.auto_connect,
        };

        for chain in &config.chains {
            if config.transport(&chain.genesis_hash).map_or(true, Transport::is_empty) {
                return Err(ConfigError::MissingTransport(chain.genesis_hash.clone()));
            }
        }

        Ok(config)
    }
}

/// Where persisted session keys live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum StorageSettings {
    #[default]
    Memory,
    Sled {
        path: String,
    },
}

impl StorageSettings {
    pub fn open(&self) -> Result<Arc<dyn KeyValueStorage>, StorageError> {
        match self {
            StorageSettings::Memory => Ok(Arc::new(MemoryStorage::new())),
            StorageSettings::Sled { path } => Ok(Arc::new(SledStorage::open(path)?)),
        }
    }
}

/// File-level configuration.
///
/// Everything except connectors, which need runtime capabilities and are
/// added to the builder returned by [`Settings::into_builder`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub chains: Vec<Chain>,
    #[serde(default)]
    pub transports: HashMap<String, Transport>,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub log: LogConfig,
}

impl Settings {
    /// Opens the configured storage and seeds a builder with chains and
    /// transports.
    pub fn into_builder(self) -> Result<SessionConfigBuilder, StorageError> {
        let storage = self.storage.open()?;
        let mut builder = SessionConfig::builder()
            .chains(self.chains)
            .storage(storage)
            .auto_connect(self.auto_connect);
        if let Some(name) = self.app_name {
            builder = builder.app_name(name);
        }
        for (chain_id, transport) in self.transports {
            builder = builder.transport(chain_id, transport);
        }
        Ok(builder)
    }
}

/// Loads [`Settings`] from a TOML file, with `SUBCONNECT__*` environment
/// variables layered on top.
pub fn load_settings(path: &str) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("SUBCONNECT").separator("__"));

    builder
        .build()
        .map_err(|e| ConfigError::Load(format!("failed to read '{}': {}", path, e)))?
        .try_deserialize()
        .map_err(|e| ConfigError::Load(format!("failed to deserialize '{}': {}", path, e)))
}
