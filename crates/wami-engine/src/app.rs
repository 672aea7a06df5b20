use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;
use wami_contracts::config::{WamiConfig, EVENTS_FILE, FLOWS_FILE, TRANSFER_CACHE_FILE};
use wami_contracts::events::EventLog;
use wami_contracts::flows::JsonFlowStore;
use wami_contracts::intent::LaunchParams;
use wami_contracts::share::FileTransferCache;
use wami_contracts::Result;

use crate::flow_engine::default_engine_registry;
use crate::observer::EventObserver;
use crate::resolver::{IntentResolver, Resolution};
use crate::session::Session;

/// Everything a session needs, wired from one home directory.
pub struct WamiApp {
    home: PathBuf,
    config: WamiConfig,
    store: JsonFlowStore,
    cache: FileTransferCache,
    events: Arc<EventLog>,
    session: Session,
}

impl WamiApp {
    pub fn open(home: &Path) -> Result<Self> {
        let config = WamiConfig::load(home)?;
        Self::with_config(home, config)
    }

    pub fn with_config(home: &Path, config: WamiConfig) -> Result<Self> {
        let engine = default_engine_registry(&config)?.select(&config.engine)?;
        let events = Arc::new(EventLog::open(
            home.join(EVENTS_FILE),
            Uuid::new_v4().to_string(),
        )?);
        let session = Session::new(engine, Arc::new(EventObserver::new(events.clone())));
        info!(
            home = %home.display(),
            engine = session.engine_name(),
            session_id = events.session_id(),
            "session opened"
        );
        Ok(Self {
            home: home.to_path_buf(),
            store: JsonFlowStore::new(home.join(FLOWS_FILE)),
            cache: FileTransferCache::new(home.join(TRANSFER_CACHE_FILE)),
            config,
            events,
            session,
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config(&self) -> &WamiConfig {
        &self.config
    }

    pub fn store(&self) -> &JsonFlowStore {
        &self.store
    }

    pub fn cache_mut(&mut self) -> &mut FileTransferCache {
        &mut self.cache
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resolves a launch query against this home's stores.
    pub fn activate(&mut self, query: &str) -> Option<Resolution> {
        let params = LaunchParams::parse(query);
        let resolver = IntentResolver::new(&self.store, &self.session, &self.config);
        resolver.resolve(&params, &mut self.cache)
    }
}
