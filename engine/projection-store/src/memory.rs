//! In-memory backend for tests and dry runs.
//!
//! Mirrors the constraints the PostgreSQL schema enforces (not-null columns,
//! defaults, primary keys, foreign keys and the ban on scoring rows under the
//! `None` point system) so loader behavior can be exercised without a server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::catalog::{self, ColumnDefault, TableDef, UNSCORED_SYSTEM};
use crate::error::{Result, StoreError};
use crate::store::{IdentityStore, ProjectionStore, StoreTransaction};
use crate::types::{Candidate, EntityKind, FantasyPlayerId, Game, GameQuery};
use crate::value::{row, Row, Value};

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<&'static str, Vec<Row>>,
    next_serial: i64,
}

impl Tables {
    fn seeded(corpus: &[Candidate]) -> Self {
        let mut tables = Tables { rows: HashMap::new(), next_serial: 1 };

        let players = corpus
            .iter()
            .map(|c| match c.kind {
                EntityKind::Player => row([
                    ("fantasy_player_id", Value::from(c.id.as_str())),
                    ("player_id", Value::from(c.id.as_str())),
                    ("team_id", Value::Null),
                ]),
                EntityKind::Team => row([
                    ("fantasy_player_id", Value::from(c.id.as_str())),
                    ("player_id", Value::Null),
                    ("team_id", Value::from(c.id.as_str())),
                ]),
            })
            .collect();
        tables.rows.insert(catalog::FANTASY_PLAYER.name, players);

        tables.rows.insert(
            catalog::FP_SYSTEM.name,
            vec![row([("fpsys_name", Value::from(UNSCORED_SYSTEM)), ("fpsys_url", Value::Null)])],
        );
        tables
    }

    fn table_rows(&self, table: &TableDef) -> &[Row] {
        self.rows.get(table.name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn insert(&mut self, table: &'static TableDef, input: &Row) -> Result<Row> {
        let prepared = table.prepare_row(input)?;

        let mut stored = Row::new();
        for column in table.columns {
            let supplied =
                prepared.iter().find(|(c, _)| c.name == column.name).map(|(_, v)| v.clone());
            let value = match (supplied, column.default) {
                (Some(value), _) => value,
                (None, ColumnDefault::Serial) => {
                    let id = self.next_serial;
                    self.next_serial += 1;
                    Value::Int(id)
                }
                (None, ColumnDefault::Now) => Value::Timestamp(Utc::now()),
                (None, ColumnDefault::Bool(b)) => Value::Bool(b),
                (None, ColumnDefault::Text(s)) => Value::from(s),
                (None, ColumnDefault::None) if column.nullable => Value::Null,
                (None, ColumnDefault::None) => {
                    let message = format!(
                        "null value in column \"{}\" violates not-null constraint",
                        column.name
                    );
                    return Err(StoreError::constraint(table.name, message));
                }
            };
            stored.insert(column.name.to_string(), value);
        }

        let unscored = stored.get("fpsys_name").and_then(Value::as_str) == Some(UNSCORED_SYSTEM);
        if table.scored && unscored {
            return Err(StoreError::constraint(
                table.name,
                format!("rows may not reference the '{UNSCORED_SYSTEM}' point system"),
            ));
        }

        let key = TableDef::key_values(&stored, table.primary_key);
        if self
            .table_rows(table)
            .iter()
            .any(|existing| TableDef::key_values(existing, table.primary_key) == key)
        {
            let message = format!(
                "duplicate key ({}) = ({})",
                table.primary_key.join(", "),
                display_key(&key)
            );
            return Err(StoreError::constraint(table.name, message));
        }

        for fk in table.foreign_keys {
            // A null referencing column satisfies the constraint.
            let Some(child_key) = TableDef::key_values(&stored, fk.columns) else { continue };
            let parent = catalog::table(fk.references).ok_or_else(|| {
                StoreError::invalid_operation(format!("unknown table {}", fk.references))
            })?;
            let found = self.table_rows(parent).iter().any(|p| {
                TableDef::key_values(p, fk.referenced_columns).as_ref() == Some(&child_key)
            });
            if !found {
                return Err(StoreError::constraint(
                    table.name,
                    format!(
                        "key ({}) = ({}) is not present in table \"{}\"",
                        fk.columns.join(", "),
                        display_key(&Some(child_key)),
                        fk.references
                    ),
                ));
            }
        }

        self.rows.entry(table.name).or_default().push(stored.clone());
        Ok(stored)
    }
}

fn display_key(key: &Option<Vec<Value>>) -> String {
    match key {
        Some(values) => values.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        None => "NULL".to_string(),
    }
}

/// Projection tables and canonical data held in process memory
pub struct MemoryStore {
    committed: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
    lock_history: Arc<StdMutex<Vec<Vec<&'static str>>>>,
    corpus: Vec<Candidate>,
    games: Vec<Game>,
}

impl MemoryStore {
    /// A store whose canonical data is `corpus` and `games`.
    ///
    /// `fantasy_player` is populated from the corpus and the `None` point
    /// system exists, as after the first migration.
    pub fn new(corpus: Vec<Candidate>, games: Vec<Game>) -> Self {
        Self {
            committed: Arc::new(RwLock::new(Tables::seeded(&corpus))),
            writer: Arc::new(Mutex::new(())),
            lock_history: Arc::new(StdMutex::new(Vec::new())),
            corpus,
            games,
        }
    }

    /// Tables locked by each write transaction so far, oldest first
    pub fn lock_history(&self) -> Vec<Vec<&'static str>> {
        self.lock_history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn row_count(&self, table: &TableDef) -> usize {
        self.committed.read().unwrap_or_else(PoisonError::into_inner).table_rows(table).len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[async_trait::async_trait]
impl ProjectionStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            committed: Arc::clone(&self.committed),
            writer: Arc::clone(&self.writer),
            lock_history: Arc::clone(&self.lock_history),
            held: None,
            working: None,
            locked: Vec::new(),
        }))
    }

    async fn disambiguation(&self, name_as_scraped: &str) -> Result<Option<FantasyPlayerId>> {
        let tables = self.committed.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .table_rows(&catalog::NAME_DISAMBIGUATION)
            .iter()
            .find(|r| r.get("name_as_scraped").and_then(Value::as_str) == Some(name_as_scraped))
            .and_then(|r| r.get("fantasy_player_id").and_then(Value::as_str))
            .map(FantasyPlayerId::from))
    }

    async fn rows(&self, table: &'static TableDef) -> Result<Vec<Row>> {
        let tables = self.committed.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.table_rows(table).to_vec())
    }
}

#[async_trait::async_trait]
impl IdentityStore for MemoryStore {
    async fn find_games(&self, query: &GameQuery) -> Result<Vec<Game>> {
        Ok(self.games.iter().filter(|g| query.matches(g)).cloned().collect())
    }

    async fn name_corpus(&self) -> Result<Vec<Candidate>> {
        Ok(self.corpus.clone())
    }
}

/// Write transaction over a private copy of the committed tables.
///
/// The first `lock_tables` call serializes against other writers; commit
/// publishes the copy, drop discards it.
pub struct MemoryTransaction {
    committed: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
    lock_history: Arc<StdMutex<Vec<Vec<&'static str>>>>,
    held: Option<OwnedMutexGuard<()>>,
    working: Option<Tables>,
    locked: Vec<&'static str>,
}

impl MemoryTransaction {
    fn working(&mut self) -> Result<&mut Tables> {
        self.working.as_mut().ok_or_else(|| {
            StoreError::invalid_operation("memory transaction used before lock_tables")
        })
    }
}

#[async_trait::async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_tables(&mut self, tables: &[&'static TableDef]) -> Result<()> {
        if self.held.is_none() {
            self.held = Some(Arc::clone(&self.writer).lock_owned().await);
            let snapshot = self.committed.read().unwrap_or_else(PoisonError::into_inner).clone();
            self.working = Some(snapshot);
        }

        let names: Vec<&'static str> = tables.iter().map(|t| t.name).collect();
        debug!("Memory store locking {}", names.join(", "));
        self.locked.extend(names.iter().copied());
        self.lock_history.lock().unwrap_or_else(PoisonError::into_inner).push(names);
        Ok(())
    }

    async fn exists(&mut self, table: &'static TableDef, key: &Row) -> Result<bool> {
        let key = table.coerce_key(key)?;
        let tables = self.working()?;
        Ok(tables
            .table_rows(table)
            .iter()
            .any(|stored| key.iter().all(|(k, v)| !v.is_null() && stored.get(k) == Some(v))))
    }

    async fn insert(
        &mut self,
        table: &'static TableDef,
        row: &Row,
        returning: Option<&'static str>,
    ) -> Result<Option<Value>> {
        if !self.locked.contains(&table.name) {
            let message = format!("insert into unlocked table {}", table.name);
            return Err(StoreError::invalid_operation(message));
        }
        let stored = self.working()?.insert(table, row)?;
        Ok(returning.map(|column| stored.get(column).cloned().unwrap_or_default()))
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if let Some(working) = self.working.take() {
            *self.committed.write().unwrap_or_else(PoisonError::into_inner) = working;
        }
        self.held.take();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.working.take();
        self.held.take();
        Ok(())
    }
}
