//! Lock-holding write transaction with explicit commit

use tracing::{debug, warn};

use crate::catalog::TableDef;
use crate::error::{Result, StoreError};
use crate::store::{ProjectionStore, StoreTransaction};
use crate::value::{Row, Value};

/// A transaction that has taken its table locks.
///
/// [`WriteGuard::commit`] makes the writes durable. If the guard is dropped
/// without committing (an error was propagated, a task was cancelled) the
/// transaction is rolled back and the locks released.
pub struct WriteGuard {
    tx: Option<Box<dyn StoreTransaction>>,
    tables: Vec<&'static str>,
}

impl WriteGuard {
    /// Begin a transaction on `store` and lock `tables` in order
    pub async fn acquire<S>(store: &S, tables: &[&'static TableDef]) -> Result<Self>
    where
        S: ProjectionStore + ?Sized,
    {
        let mut tx = store.begin().await?;
        if let Err(e) = tx.lock_tables(tables).await {
            // Lock failures leave the transaction aborted; release it explicitly.
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback after failed lock also failed: {}", rollback_err);
            }
            return Err(e);
        }

        let tables: Vec<&'static str> = tables.iter().map(|t| t.name).collect();
        debug!("Acquired write lock on {}", tables.join(", "));
        Ok(Self { tx: Some(tx), tables })
    }

    /// Names of the locked tables
    pub fn tables(&self) -> &[&'static str] {
        &self.tables
    }

    fn tx(&mut self) -> Result<&mut Box<dyn StoreTransaction>> {
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::invalid_operation("write guard already released"))
    }

    fn check_locked(&self, table: &'static TableDef) -> Result<()> {
        if self.tables.contains(&table.name) {
            Ok(())
        } else {
            Err(StoreError::invalid_operation(format!(
                "table {} is not locked by this transaction",
                table.name
            )))
        }
    }

    pub async fn exists(&mut self, table: &'static TableDef, key: &Row) -> Result<bool> {
        self.tx()?.exists(table, key).await
    }

    pub async fn insert(
        &mut self,
        table: &'static TableDef,
        row: &Row,
        returning: Option<&'static str>,
    ) -> Result<Option<Value>> {
        self.check_locked(table)?;
        self.tx()?.insert(table, row, returning).await
    }

    pub async fn commit(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::invalid_operation("write guard already released"))?;
        tx.commit().await?;
        debug!("Committed write on {}", self.tables.join(", "));
        Ok(())
    }

    /// Roll back now rather than on drop, surfacing rollback errors
    pub async fn rollback(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            // Dropping the transaction rolls it back in every backend.
            warn!("Write on {} rolled back without commit", self.tables.join(", "));
        }
    }
}
