//! Store traits shared by the PostgreSQL and in-memory backends

use crate::catalog::TableDef;
use crate::error::Result;
use crate::types::{Candidate, FantasyPlayerId, Game, GameQuery};
use crate::value::{Row, Value};

/// An open write transaction on the projection tables.
///
/// Nothing is visible to other sessions until [`StoreTransaction::commit`].
/// Dropping a transaction without committing discards its writes.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    /// Take exclusive write locks on `tables`, in the order given.
    ///
    /// Locks are held until the transaction ends. Concurrent readers are not
    /// blocked; concurrent writers wait.
    async fn lock_tables(&mut self, tables: &[&'static TableDef]) -> Result<()>;

    /// Whether a row whose `key` columns equal the given values exists
    async fn exists(&mut self, table: &'static TableDef, key: &Row) -> Result<bool>;

    /// Insert one row. Columns of `row` that the table does not declare are
    /// ignored; values are coerced to the column types.
    ///
    /// When `returning` names a column, its stored value is returned.
    async fn insert(
        &mut self,
        table: &'static TableDef,
        row: &Row,
        returning: Option<&'static str>,
    ) -> Result<Option<Value>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Transactional access to the system-owned projection tables
#[async_trait::async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Open a write transaction
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Exact lookup of a scraped name in `name_disambiguation`
    async fn disambiguation(&self, name_as_scraped: &str) -> Result<Option<FantasyPlayerId>>;

    /// Every committed row of `table`
    async fn rows(&self, table: &'static TableDef) -> Result<Vec<Row>>;
}

/// Read-only view of the canonical statistics database
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    /// Games matching `query` exactly
    async fn find_games(&self, query: &GameQuery) -> Result<Vec<Game>>;

    /// Every player and team a scraped name may refer to
    async fn name_corpus(&self) -> Result<Vec<Candidate>>;
}

/// A backend providing both the canonical data and the projection tables
pub trait Database: ProjectionStore + IdentityStore {}

impl<T: ProjectionStore + IdentityStore + ?Sized> Database for T {}
