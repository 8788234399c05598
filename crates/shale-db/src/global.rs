//! Process-wide store, for callers that prefer free functions to passing a
//! [`Store`] around.

use std::sync::OnceLock;

use crate::config::StoreConfig;
use crate::error::DbError;
use crate::model::Model;
use crate::session::Session;
use crate::store::Store;

static GLOBAL: OnceLock<Store> = OnceLock::new();

/// Build and install the process-wide store. Fails if one is already
/// installed.
pub fn install(config: StoreConfig) -> Result<&'static Store, DbError> {
    let store = Store::new(config)?;
    GLOBAL
        .set(store)
        .map_err(|_| DbError::GlobalStore("already installed"))?;
    global()
}

pub fn global() -> Result<&'static Store, DbError> {
    GLOBAL.get().ok_or(DbError::GlobalStore("not installed"))
}

/// A model of the process-wide store.
pub fn model(name: &str) -> Result<Model, DbError> {
    global()?.model(name)
}

/// A session on the process-wide store.
pub fn start_session() -> Result<Session, DbError> {
    Ok(global()?.start_session())
}
