//! Named store instances with an explicit initialise/shutdown lifecycle.

use crate::config::{Settings, DEFAULT_STORE_NAME};
use crate::error::{NestDbError, Result};
use crate::store::{validate_store_name, Store};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// A store shared between callers. The lock is the only synchronisation
/// a store gets; hold it for the duration of each read or write.
pub type SharedStore = Arc<Mutex<Store>>;

#[derive(Default)]
struct State {
    initialised: bool,
    instances: IndexMap<String, SharedStore>,
}

/// Owns every open store, keyed by name. One lock guards instance creation
/// so two callers asking for the same name get the same store.
pub struct Registry {
    settings: Settings,
    state: Mutex<State>,
}

impl Registry {
    pub fn new(settings: Settings) -> Self {
        Registry {
            settings,
            state: Mutex::new(State::default()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_initialised(&self) -> bool {
        self.state.lock().initialised
    }

    /// Prepare the registry for use. Creates the store directory when stores
    /// are persisted.
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.initialised {
            return Err(NestDbError::Initialisation(
                "registry is already initialised".into(),
            ));
        }
        if let Some(dir) = self.settings.store_dir() {
            std::fs::create_dir_all(&dir)?;
            log::info!("Initialised store registry in {}", dir.display());
        } else {
            log::info!("Initialised in-memory store registry");
        }
        state.initialised = true;
        Ok(())
    }

    /// The store called `name`, opening it on first use. An empty name
    /// selects the default store.
    pub fn get_instance(&self, name: &str) -> Result<SharedStore> {
        let name = if name.is_empty() { DEFAULT_STORE_NAME } else { name };
        let mut state = self.state.lock();
        if !state.initialised {
            return Err(NestDbError::Initialisation(
                "registry must be initialised before opening stores".into(),
            ));
        }
        validate_store_name(name)?;

        if let Some(store) = state.instances.get(name) {
            return Ok(Arc::clone(store));
        }
        let store = Store::open(name, self.settings.store_file(name))?;
        log::info!("Opened store '{name}'");
        let store = Arc::new(Mutex::new(store));
        state.instances.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.state.lock().instances.keys().cloned().collect()
    }

    /// Forget one store without saving it.
    pub fn close_instance(&self, name: &str) -> Option<SharedStore> {
        let name = if name.is_empty() { DEFAULT_STORE_NAME } else { name };
        self.state.lock().instances.shift_remove(name)
    }

    /// Forget every store without saving.
    pub fn clear_instances(&self) {
        self.state.lock().instances.clear();
    }

    /// Save every persistent store, drop them all, and return to the
    /// uninitialised state.
    ///
    /// The instance map is detached before any store is locked, so callers
    /// holding a store lock can still reach the registry meanwhile. Stores
    /// that fail to save are put back and the registry stays initialised,
    /// so the shutdown can be retried.
    pub fn shutdown(&self) -> Result<()> {
        let instances = {
            let mut state = self.state.lock();
            state.initialised = false;
            std::mem::take(&mut state.instances)
        };

        let mut failed = IndexMap::new();
        let mut errors = Vec::new();
        for (name, store) in instances {
            let saved = {
                let guard = store.lock();
                if guard.is_persistent() {
                    guard.save()
                } else {
                    Ok(())
                }
            };
            match saved {
                Ok(()) => log::info!("Saved store '{name}'"),
                Err(e) => {
                    log::warn!("Failed to save store '{name}': {e}");
                    errors.push(format!("{name}: {e}"));
                    failed.insert(name, store);
                }
            }
        }

        if failed.is_empty() {
            log::info!("Store registry shut down");
            return Ok(());
        }
        let mut state = self.state.lock();
        state.initialised = true;
        for (name, store) in failed {
            state.instances.entry(name).or_insert(store);
        }
        Err(NestDbError::Persist(format!(
            "shutdown could not save {}",
            errors.join(", ")
        )))
    }
}
