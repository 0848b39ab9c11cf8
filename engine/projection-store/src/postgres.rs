//! PostgreSQL backend over an nfldb database

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _, Transaction};
use tracing::{debug, info};

use crate::catalog::{self, ColumnType, TableDef};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::migrations;
use crate::store::{IdentityStore, ProjectionStore, StoreTransaction};
use crate::types::{Candidate, FantasyPlayerId, Game, GameQuery, SeasonType};
use crate::value::{Row, Value};

/// Projection store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect, check schema versions and run pending migrations.
    ///
    /// Every pooled session uses the configured time zone (UTC by default).
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let timezone = config.session_timezone().to_string();
        info!("Connecting to {} (time zone {})", redact(&config.url), timezone);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .after_connect(move |conn, _meta| {
                let timezone = timezone.clone();
                Box::pin(async move {
                    sqlx::query("SELECT set_config('TimeZone', $1, false)")
                        .bind(timezone)
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&config.url)
            .await?;

        migrations::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool without checking or migrating the schema
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Current projection schema version
    pub async fn schema_version(&self) -> Result<i32> {
        let version: i32 =
            sqlx::query_scalar("SELECT schema_version::int FROM projection_meta LIMIT 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }
}

/// Hide the password of a connection URL before logging it
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let (scheme, credentials) = (&url[..scheme_end + 3], &url[scheme_end + 3..at]);
            match credentials.find(':') {
                Some(colon) => format!("{scheme}{}:***{}", &credentials[..colon], &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

fn push_value(builder: &mut QueryBuilder<'static, Postgres>, value: &Value, ty: ColumnType) {
    match value {
        Value::Null => {
            builder.push("NULL");
        }
        Value::Bool(b) => {
            builder.push_bind(*b);
        }
        Value::Int(i) => {
            builder.push_bind(*i);
        }
        Value::Float(f) => {
            builder.push_bind(*f);
        }
        Value::Timestamp(ts) => {
            builder.push_bind(*ts);
        }
        Value::Text(s) => {
            builder.push_bind(s.clone());
        }
    }
    builder.push("::").push(ty.sql_cast());
}

fn decode_column(row: &PgRow, name: &str, ty: ColumnType) -> Result<Value> {
    let value = match ty {
        ColumnType::Text | ColumnType::Enum(_) => {
            row.try_get::<Option<String>, _>(name)?.map(Value::Text)
        }
        ColumnType::Integer => {
            row.try_get::<Option<i32>, _>(name)?.map(|i| Value::Int(i64::from(i)))
        }
        ColumnType::Real => row.try_get::<Option<f64>, _>(name)?.map(Value::Float),
        ColumnType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
        ColumnType::Timestamp => {
            row.try_get::<Option<DateTime<Utc>>, _>(name)?.map(Value::Timestamp)
        }
    };
    Ok(value.unwrap_or_default())
}

fn push_select_list(
    builder: &mut QueryBuilder<'static, Postgres>,
    columns: &[&'static catalog::ColumnDef],
) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder
            .push(column.name)
            .push("::")
            .push(column.ty.read_cast())
            .push(" AS ")
            .push(column.name);
    }
}

/// An open PostgreSQL transaction
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_tables(&mut self, tables: &[&'static TableDef]) -> Result<()> {
        for table in tables {
            let sql = format!("LOCK TABLE {} IN SHARE ROW EXCLUSIVE MODE", table.name);
            sqlx::query(&sql).execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn exists(&mut self, table: &'static TableDef, key: &Row) -> Result<bool> {
        let key = table.coerce_key(key)?;

        let mut builder = QueryBuilder::new("SELECT EXISTS (SELECT 1 FROM ");
        builder.push(table.name).push(" WHERE TRUE");
        for (name, value) in &key {
            let column = table
                .column(name)
                .ok_or_else(|| StoreError::invalid_value(name.clone(), "unknown key column"))?;
            builder.push(" AND ").push(column.name).push(" = ");
            push_value(&mut builder, value, column.ty);
        }
        builder.push(")");

        let found: bool = builder.build_query_scalar().fetch_one(&mut *self.tx).await?;
        Ok(found)
    }

    async fn insert(
        &mut self,
        table: &'static TableDef,
        row: &Row,
        returning: Option<&'static str>,
    ) -> Result<Option<Value>> {
        let prepared = table.prepare_row(row)?;

        let mut builder = QueryBuilder::new("INSERT INTO ");
        builder.push(table.name);
        if prepared.is_empty() {
            builder.push(" DEFAULT VALUES");
        } else {
            builder.push(" (");
            for (i, (column, _)) in prepared.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                builder.push(column.name);
            }
            builder.push(") VALUES (");
            for (i, (column, value)) in prepared.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(&mut builder, value, column.ty);
            }
            builder.push(")");
        }

        let Some(returning) = returning else {
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| StoreError::from_write(table.name, e))?;
            return Ok(None);
        };

        let column = table.column(returning).ok_or_else(|| {
            StoreError::invalid_operation(format!("{} has no column {returning}", table.name))
        })?;
        builder.push(" RETURNING ");
        push_select_list(&mut builder, &[column]);

        let row = builder
            .build()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_write(table.name, e))?;
        Ok(Some(decode_column(&row, column.name, column.ty)?))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProjectionStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn disambiguation(&self, name_as_scraped: &str) -> Result<Option<FantasyPlayerId>> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT fantasy_player_id::text FROM name_disambiguation WHERE name_as_scraped = $1",
        )
        .bind(name_as_scraped)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.map(FantasyPlayerId))
    }

    async fn rows(&self, table: &'static TableDef) -> Result<Vec<Row>> {
        let columns: Vec<&'static catalog::ColumnDef> = table.columns.iter().collect();
        let mut builder = QueryBuilder::new("SELECT ");
        push_select_list(&mut builder, &columns);
        builder.push(" FROM ").push(table.name);

        let fetched = builder.build().fetch_all(&self.pool).await?;
        fetched
            .iter()
            .map(|pg_row| {
                columns
                    .iter()
                    .map(|c| Ok((c.name.to_string(), decode_column(pg_row, c.name, c.ty)?)))
                    .collect::<Result<Row>>()
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl IdentityStore for PgStore {
    async fn find_games(&self, query: &GameQuery) -> Result<Vec<Game>> {
        debug!("Looking up game {}", query);
        let rows = sqlx::query(
            r#"
            SELECT gsis_id::text AS gsis_id, season_year::int AS season_year,
                   season_type::text AS season_type, week::int AS week,
                   home_team::text AS home_team, away_team::text AS away_team
            FROM game
            WHERE season_year = $1 AND season_type = $2::season_phase
              AND week = $3 AND home_team = $4
            "#,
        )
        .bind(query.season_year)
        .bind(query.season_type.as_str())
        .bind(query.week)
        .bind(&query.home_team)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Game> {
                let season_type: String = row.try_get("season_type")?;
                Ok(Game {
                    gsis_id: row.try_get("gsis_id")?,
                    season_year: row.try_get("season_year")?,
                    season_type: season_type.parse::<SeasonType>()?,
                    week: row.try_get("week")?,
                    home_team: row.try_get("home_team")?,
                    away_team: row.try_get("away_team")?,
                })
            })
            .collect()
    }

    async fn name_corpus(&self) -> Result<Vec<Candidate>> {
        let players = sqlx::query(
            r#"
            SELECT player_id::text AS player_id, full_name,
                   team::text AS team, position::text AS position
            FROM player
            WHERE full_name IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let teams = sqlx::query(
            "SELECT team_id::text AS team_id, city, name FROM team WHERE team_id <> 'UNK'",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut corpus = Vec::with_capacity(players.len() + teams.len());
        for row in &players {
            corpus.push(Candidate::player(
                row.try_get::<String, _>("player_id")?,
                row.try_get::<String, _>("full_name")?,
                row.try_get::<Option<String>, _>("team")?,
                row.try_get::<Option<String>, _>("position")?,
            ));
        }
        for row in &teams {
            let city: String = row.try_get("city")?;
            let nickname: String = row.try_get("name")?;
            corpus.push(Candidate::team(row.try_get::<String, _>("team_id")?, &city, &nickname));
        }

        debug!("Loaded name corpus: {} players, {} teams", players.len(), teams.len());
        Ok(corpus)
    }
}
