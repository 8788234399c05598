mod aggregate;
mod collection;
mod compare;
mod config;
mod convert;
mod cursor;
mod error;
mod global;
mod idempotency;
mod instance;
mod matcher;
mod model;
mod mutation;
mod path;
mod projection;
mod relation;
mod result;
mod session;
mod store;

/// Identity field assigned to every stored document.
pub const ID_FIELD: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

pub use bson::{Bson, Document};
pub use compare::{id_string, values_equal};
pub use config::{CollectionConfig, StoreConfig};
pub use convert::{IntoFilter, IntoPipeline, IntoUpdate};
pub use cursor::{Cursor, Materialize};
pub use error::DbError;
pub use global::{global, install, model, start_session};
pub use idempotency::IdempotencyKey;
pub use instance::{Instance, Shape};
pub use matcher::matches;
pub use model::{FindOneAndUpdateOptions, Model, ReturnDocument, UpdateOptions};
pub use result::{DeleteResult, UpdateResult};
pub use session::Session;
pub use shale_query as query;
pub use store::{Snapshot, Store};
