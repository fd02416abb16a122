//! # Repository Layer
//!
//! Encapsulates SeaORM operations behind typed stores.

pub mod repository_connection;

pub use repository_connection::{
    NewRepositoryConnection, RepositoryConnectionUpdate, RepositoryStore, StoreError,
    SyncDataUpdate,
};
