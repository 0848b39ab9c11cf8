//! # Projection Store
//!
//! Relational storage for fantasy-football projections layered on top of an
//! nfldb database: the static table catalog, the schema migrations, and
//! transactional, lock-guarded write access through the [`ProjectionStore`]
//! trait. The canonical players, teams and games nfldb maintains are read
//! through [`IdentityStore`].
//!
//! Two backends are provided: [`PgStore`] for PostgreSQL and [`MemoryStore`]
//! which enforces the same constraints in process memory for tests.

pub mod catalog;
pub mod config;
pub mod error;
pub mod guard;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod store;
pub mod types;
pub mod value;

pub use catalog::{ColumnDef, ColumnType, TableDef};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use guard::WriteGuard;
pub use memory::MemoryStore;
pub use migrations::{NFLDB_SCHEMA_VERSION, SCHEMA_VERSION};
pub use postgres::PgStore;
pub use store::{Database, IdentityStore, ProjectionStore, StoreTransaction};
pub use types::{
    Candidate, EntityKind, FantasyPlayerId, FantasyPosition, Game, GameQuery, ProjectionScope,
    SeasonType,
};
pub use value::{row, Row, Value};
