//! Projection schema DDL and its linear upgrade ladder.
//!
//! Every migration runs in its own transaction and bumps
//! `projection_meta.schema_version` when it commits.

use sqlx::PgPool;
use tracing::{debug, info};

use crate::catalog::SYSTEM_TABLES;
use crate::error::{Result, StoreError};

/// Projection schema version this library writes
pub const SCHEMA_VERSION: i32 = 2;

/// nfldb schema version the projection schema is layered on
pub const NFLDB_SCHEMA_VERSION: i32 = 7;

#[derive(Debug)]
pub struct Migration {
    /// Schema version after this migration has run
    pub version: i32,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "projection tables",
        statements: &[
            "CREATE TABLE projection_meta (schema_version smallint NOT NULL)",
            "INSERT INTO projection_meta (schema_version) VALUES (0)",
            r#"CREATE TYPE fantasy_position AS ENUM (
                'QB', 'RB', 'WR', 'TE', 'K', 'DST', 'DL', 'LB', 'DB'
            )"#,
            "CREATE TYPE proj_scope AS ENUM ('week', 'season', 'rest_of_season')",
            r#"CREATE TABLE fantasy_player (
                fantasy_player_id varchar (10) NOT NULL,
                player_id varchar (10) NULL,
                team_id varchar (3) NULL,
                PRIMARY KEY (fantasy_player_id),
                FOREIGN KEY (player_id) REFERENCES player (player_id)
                    ON DELETE CASCADE ON UPDATE CASCADE,
                FOREIGN KEY (team_id) REFERENCES team (team_id) ON DELETE CASCADE ON UPDATE CASCADE,
                CHECK ((player_id IS NULL) <> (team_id IS NULL)),
                CHECK (fantasy_player_id = COALESCE(player_id, team_id))
            )"#,
            r#"INSERT INTO fantasy_player (fantasy_player_id, player_id)
                SELECT player_id, player_id FROM player"#,
            r#"INSERT INTO fantasy_player (fantasy_player_id, team_id)
                SELECT team_id, team_id FROM team WHERE team_id <> 'UNK'"#,
            r#"CREATE FUNCTION add_fantasy_player() RETURNS trigger AS $$
            BEGIN
                IF TG_TABLE_NAME = 'player' THEN
                    INSERT INTO fantasy_player (fantasy_player_id, player_id)
                        VALUES (NEW.player_id, NEW.player_id);
                ELSE
                    INSERT INTO fantasy_player (fantasy_player_id, team_id)
                        VALUES (NEW.team_id, NEW.team_id);
                END IF;
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql"#,
            r#"CREATE TRIGGER fantasy_player_from_player AFTER INSERT ON player
                FOR EACH ROW EXECUTE PROCEDURE add_fantasy_player()"#,
            r#"CREATE TRIGGER fantasy_player_from_team AFTER INSERT ON team
                FOR EACH ROW EXECUTE PROCEDURE add_fantasy_player()"#,
            r#"CREATE TABLE name_disambiguation (
                name_as_scraped varchar (100) NOT NULL,
                fantasy_player_id varchar (10) NOT NULL,
                PRIMARY KEY (name_as_scraped),
                FOREIGN KEY (fantasy_player_id) REFERENCES fantasy_player
                    ON DELETE CASCADE ON UPDATE CASCADE
            )"#,
            r#"CREATE TABLE projection_source (
                source_name varchar (100) NOT NULL,
                source_url varchar (255) NULL,
                source_notes text NULL,
                PRIMARY KEY (source_name)
            )"#,
            r#"CREATE TABLE fp_system (
                fpsys_name varchar (100) NOT NULL,
                fpsys_url varchar (255) NULL,
                PRIMARY KEY (fpsys_name)
            )"#,
            "INSERT INTO fp_system (fpsys_name) VALUES ('None')",
            r#"CREATE TABLE projection_set (
                source_name varchar (100) NOT NULL,
                fpsys_name varchar (100) NOT NULL,
                set_id SERIAL NOT NULL,
                projection_scope proj_scope NOT NULL,
                season_year smallint NOT NULL,
                season_type season_phase NOT NULL DEFAULT 'Regular',
                week smallint NULL,
                date_accessed timestamp with time zone NOT NULL DEFAULT now(),
                known_incomplete boolean NOT NULL DEFAULT FALSE,
                PRIMARY KEY (source_name, fpsys_name, set_id),
                FOREIGN KEY (source_name) REFERENCES projection_source
                    ON DELETE CASCADE ON UPDATE CASCADE,
                FOREIGN KEY (fpsys_name) REFERENCES fp_system ON DELETE CASCADE ON UPDATE CASCADE,
                CHECK (week IS NULL OR week BETWEEN 0 AND 25)
            )"#,
            r#"CREATE TABLE stat_projection (
                source_name varchar (100) NOT NULL,
                fpsys_name varchar (100) NOT NULL,
                set_id integer NOT NULL,
                fantasy_player_id varchar (10) NOT NULL,
                gsis_id varchar (10) NULL,
                team varchar (3) NOT NULL,
                fantasy_pos fantasy_position NOT NULL,
                passing_att real NULL,
                passing_cmp real NULL,
                passing_yds real NULL,
                passing_tds real NULL,
                passing_int real NULL,
                passing_twoptm real NULL,
                rushing_att real NULL,
                rushing_yds real NULL,
                rushing_tds real NULL,
                rushing_twoptm real NULL,
                receiving_tar real NULL,
                receiving_rec real NULL,
                receiving_yds real NULL,
                receiving_tds real NULL,
                receiving_twoptm real NULL,
                fumbles_lost real NULL,
                kickret_tds real NULL,
                puntret_tds real NULL,
                kicking_fga real NULL,
                kicking_fgm real NULL,
                kicking_fgmissed real NULL,
                kicking_xpa real NULL,
                kicking_xpmade real NULL,
                kicking_xpmissed real NULL,
                defense_sk real NULL,
                defense_int real NULL,
                defense_frec real NULL,
                defense_ffum real NULL,
                defense_safe real NULL,
                defense_tds real NULL,
                defense_int_tds real NULL,
                defense_frec_tds real NULL,
                defense_pts_allowed real NULL,
                defense_yds_allowed real NULL,
                PRIMARY KEY (source_name, fpsys_name, set_id, fantasy_player_id),
                FOREIGN KEY (source_name, fpsys_name, set_id) REFERENCES projection_set
                    ON DELETE CASCADE ON UPDATE CASCADE,
                FOREIGN KEY (fantasy_player_id) REFERENCES fantasy_player
                    ON DELETE RESTRICT ON UPDATE CASCADE,
                FOREIGN KEY (gsis_id) REFERENCES game ON DELETE RESTRICT ON UPDATE CASCADE,
                FOREIGN KEY (team) REFERENCES team ON DELETE RESTRICT ON UPDATE CASCADE
            )"#,
            r#"CREATE TABLE fp_projection (
                source_name varchar (100) NOT NULL,
                fpsys_name varchar (100) NOT NULL CHECK (fpsys_name <> 'None'),
                set_id integer NOT NULL,
                fantasy_player_id varchar (10) NOT NULL,
                gsis_id varchar (10) NULL,
                team varchar (3) NOT NULL,
                fantasy_pos fantasy_position NOT NULL,
                projected_fp real NOT NULL,
                fp_variance real NULL CHECK (fp_variance >= 0),
                PRIMARY KEY (source_name, fpsys_name, set_id, fantasy_player_id),
                FOREIGN KEY (source_name, fpsys_name, set_id) REFERENCES projection_set
                    ON DELETE CASCADE ON UPDATE CASCADE,
                FOREIGN KEY (fantasy_player_id) REFERENCES fantasy_player
                    ON DELETE RESTRICT ON UPDATE CASCADE,
                FOREIGN KEY (gsis_id) REFERENCES game ON DELETE RESTRICT ON UPDATE CASCADE,
                FOREIGN KEY (team) REFERENCES team ON DELETE RESTRICT ON UPDATE CASCADE
            )"#,
        ],
    },
    Migration {
        version: 2,
        name: "fantasy scores and DFS salaries",
        statements: &[
            r#"CREATE TABLE dfs_site (
                fpsys_name varchar (100) NOT NULL CHECK (fpsys_name <> 'None'),
                dfs_name varchar (100) NOT NULL,
                dfs_url varchar (255) NULL,
                PRIMARY KEY (fpsys_name, dfs_name),
                FOREIGN KEY (fpsys_name) REFERENCES fp_system ON DELETE RESTRICT ON UPDATE CASCADE
            )"#,
            r#"CREATE TABLE fp_score (
                source_name varchar (100) NOT NULL,
                fpsys_name varchar (100) NOT NULL CHECK (fpsys_name <> 'None'),
                set_id integer NOT NULL,
                fantasy_player_id varchar (10) NOT NULL,
                gsis_id varchar (10) NULL,
                team varchar (3) NOT NULL,
                fantasy_pos fantasy_position NOT NULL,
                actual_fp real NOT NULL,
                PRIMARY KEY (source_name, fpsys_name, set_id, fantasy_player_id),
                FOREIGN KEY (source_name, fpsys_name, set_id) REFERENCES projection_set
                    ON DELETE CASCADE ON UPDATE CASCADE,
                FOREIGN KEY (fantasy_player_id) REFERENCES fantasy_player
                    ON DELETE RESTRICT ON UPDATE CASCADE,
                FOREIGN KEY (gsis_id) REFERENCES game ON DELETE RESTRICT ON UPDATE CASCADE,
                FOREIGN KEY (team) REFERENCES team ON DELETE RESTRICT ON UPDATE CASCADE
            )"#,
            r#"CREATE TABLE dfs_salary (
                fpsys_name varchar (100) NOT NULL,
                dfs_name varchar (100) NOT NULL,
                fantasy_player_id varchar (10) NOT NULL,
                season_year smallint NOT NULL,
                season_type season_phase NOT NULL DEFAULT 'Regular',
                week smallint NOT NULL,
                gsis_id varchar (10) NULL,
                team varchar (3) NOT NULL,
                fantasy_pos fantasy_position NOT NULL,
                salary integer NOT NULL CHECK (salary >= 0),
                PRIMARY KEY (
                    fpsys_name, dfs_name, fantasy_player_id, season_year, season_type, week
                ),
                FOREIGN KEY (fpsys_name, dfs_name) REFERENCES dfs_site
                    ON DELETE CASCADE ON UPDATE CASCADE,
                FOREIGN KEY (fantasy_player_id) REFERENCES fantasy_player
                    ON DELETE RESTRICT ON UPDATE CASCADE,
                FOREIGN KEY (gsis_id) REFERENCES game ON DELETE RESTRICT ON UPDATE CASCADE,
                FOREIGN KEY (team) REFERENCES team ON DELETE RESTRICT ON UPDATE CASCADE
            )"#,
        ],
    },
];

/// Refuse to touch a database whose versions this library does not understand.
///
/// `present_tables` lists the tables that already exist in the schema.
pub fn check_versions(stored: i32, present_tables: &[String], nfldb_version: i32) -> Result<()> {
    if nfldb_version != NFLDB_SCHEMA_VERSION {
        return Err(StoreError::UpstreamVersionMismatch {
            expected: NFLDB_SCHEMA_VERSION,
            found: nfldb_version,
        });
    }
    if stored > SCHEMA_VERSION {
        return Err(StoreError::SchemaVersionMismatch {
            stored,
            supported: SCHEMA_VERSION,
            detail: "database schema is newer than this library".to_string(),
        });
    }
    if stored == 0 {
        let existing: Vec<&str> = SYSTEM_TABLES
            .iter()
            .map(|t| t.name)
            .filter(|name| present_tables.iter().any(|p| p == name))
            .collect();
        if !existing.is_empty() {
            return Err(StoreError::SchemaVersionMismatch {
                stored,
                supported: SCHEMA_VERSION,
                detail: format!("version is 0 but tables already exist: {}", existing.join(", ")),
            });
        }
    }
    Ok(())
}

/// Migrations still to run on a schema at version `current`, in order
pub fn pending(current: i32) -> impl Iterator<Item = &'static Migration> {
    MIGRATIONS.iter().filter(move |m| m.version > current)
}

async fn stored_schema_version(pool: &PgPool) -> Result<i32> {
    let has_meta: bool = sqlx::query_scalar("SELECT to_regclass('projection_meta') IS NOT NULL")
        .fetch_one(pool)
        .await?;
    if !has_meta {
        return Ok(0);
    }
    let version: Option<i32> =
        sqlx::query_scalar("SELECT schema_version::int FROM projection_meta LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(version.unwrap_or(0))
}

async fn nfldb_schema_version(pool: &PgPool) -> Result<i32> {
    let version: Option<i32> = sqlx::query_scalar("SELECT version::int FROM meta LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn present_tables(pool: &PgPool) -> Result<Vec<String>> {
    let tables = sqlx::query_scalar(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema()",
    )
    .fetch_all(pool)
    .await?;
    Ok(tables)
}

/// Check versions and bring the projection schema up to [`SCHEMA_VERSION`].
///
/// Returns the version the schema was at before migrating.
pub async fn migrate(pool: &PgPool) -> Result<i32> {
    let nfldb_version = nfldb_schema_version(pool).await?;
    let stored = stored_schema_version(pool).await?;
    let tables = present_tables(pool).await?;
    check_versions(stored, &tables, nfldb_version)?;

    if stored == SCHEMA_VERSION {
        debug!("Projection schema is current (version {})", stored);
        return Ok(stored);
    }

    for migration in pending(stored) {
        info!("Migrating projection schema to version {} ({})", migration.version, migration.name);
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::raw_sql(statement).execute(&mut *tx).await?;
        }
        sqlx::query("UPDATE projection_meta SET schema_version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    info!("Projection schema migrated from version {} to {}", stored, SCHEMA_VERSION);
    Ok(stored)
}
