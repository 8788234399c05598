use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bson::Document;
use tracing::debug;

use crate::collection::Collection;
use crate::config::{CollectionConfig, StoreConfig};
use crate::error::DbError;
use crate::idempotency::IdempotencyKey;
use crate::model::Model;
use crate::session::Session;

/// Every collection's documents, plus whether seed data has been loaded.
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    seeded: bool,
    collections: HashMap<String, Collection>,
}

impl State {
    pub(crate) fn collection_mut(&mut self, name: &str) -> &mut Collection {
        self.collections.entry(name.to_string()).or_default()
    }

    /// Documents of `name` in storage order; empty if it holds none yet.
    pub(crate) fn docs<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Document> + 'a {
        self.collections.get(name).into_iter().flat_map(Collection::iter)
    }
}

/// A point-in-time copy of every collection, restorable with
/// [`Store::restore`].
///
/// Collections are persistent vectors, so taking a snapshot does not copy
/// documents.
#[derive(Debug, Clone)]
pub struct Snapshot {
    state: State,
}

/// An in-process document store.
///
/// Cloning is cheap and every clone sees the same data. All reads and
/// mutations go through one reader-writer lock, so each operation is
/// atomic with respect to the others.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    state: RwLock<State>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("collections", &self.collection_names())
            .finish()
    }
}

impl Store {
    /// Create a store for the declared collections. Seed documents are
    /// loaded lazily on first access.
    pub fn new(config: StoreConfig) -> Result<Self, DbError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                state: RwLock::new(State::default()),
            }),
        })
    }

    /// Handle to a declared collection.
    pub fn model(&self, name: &str) -> Result<Model, DbError> {
        if self.inner.config.find(name).is_none() {
            return Err(DbError::UnknownCollection(name.to_string()));
        }
        Ok(Model::new(self.clone(), name))
    }

    /// Declared collection names, in declaration order.
    pub fn collection_names(&self) -> Vec<String> {
        self.inner
            .config
            .collections
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn start_session(&self) -> Session {
        Session::new(self.clone())
    }

    /// Drop every document. Seed data is reloaded on the next access.
    pub fn reset(&self) -> Result<(), DbError> {
        let mut state = self.lock_write()?;
        *state = State::default();
        debug!("store reset");
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Snapshot, DbError> {
        let state = self.read()?;
        debug!("snapshot taken");
        Ok(Snapshot {
            state: state.clone(),
        })
    }

    /// Replace every collection with the snapshot's contents.
    pub fn restore(&self, snapshot: Snapshot) -> Result<(), DbError> {
        let mut state = self.lock_write()?;
        *state = snapshot.state;
        debug!("snapshot restored");
        Ok(())
    }

    pub(crate) fn collection_config(&self, name: &str) -> Option<&CollectionConfig> {
        self.inner.config.find(name)
    }

    pub(crate) fn idempotency_key(&self, name: &str) -> &IdempotencyKey {
        self.inner.config.key_for(name)
    }

    /// Shared access, seeding first if needed.
    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, State>, DbError> {
        let state = self.inner.state.read().map_err(|_| DbError::LockPoisoned)?;
        if state.seeded {
            return Ok(state);
        }
        drop(state);
        drop(self.write()?);
        self.inner.state.read().map_err(|_| DbError::LockPoisoned)
    }

    /// Exclusive access, seeding first if needed.
    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, State>, DbError> {
        let mut state = self.lock_write()?;
        if !state.seeded {
            self.seed(&mut state)?;
        }
        Ok(state)
    }

    fn lock_write(&self) -> Result<RwLockWriteGuard<'_, State>, DbError> {
        self.inner.state.write().map_err(|_| DbError::LockPoisoned)
    }

    fn seed(&self, state: &mut State) -> Result<(), DbError> {
        for config in &self.inner.config.collections {
            let key = self.idempotency_key(&config.name);
            let collection = state.collection_mut(&config.name);
            for doc in &config.seed {
                collection.insert(&config.name, doc.clone(), key)?;
            }
            debug!(collection = %config.name, count = collection.len(), "seeded collection");
        }
        state.seeded = true;
        Ok(())
    }
}
