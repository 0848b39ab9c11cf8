//! # Command Line Interface
//!
//! Loads scraped datasets, curates the disambiguation table, resolves names
//! and reports schema status.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use projection_loader::names::format_candidates;
use projection_loader::{
    add_disambiguations, LoadOptions, LoadReport, Loader, LoaderConfig, LoaderError, NameResolver,
};
use projection_store::catalog::{FACT_TABLES, PROJECTION_SET};
use projection_store::{
    FantasyPlayerId, PgStore, ProjectionStore, NFLDB_SCHEMA_VERSION, SCHEMA_VERSION,
};
use tracing::info;

use crate::io;

/// Fantasy projection import tool
#[derive(Debug, Parser)]
#[command(name = "projection-import")]
#[command(about = "Load scraped fantasy projections into an nfldb database")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "projection_loader=debug"
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format: text, pretty or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a scraped dataset
    Load {
        /// Dataset file (.csv with a header row, or .json array of objects)
        input: PathBuf,

        /// Metadata file (.toml or .json)
        #[arg(short, long)]
        metadata: PathBuf,

        /// Skip fantasy-point projections
        #[arg(long)]
        no_fp_projection: bool,

        /// Skip statistic projections
        #[arg(long)]
        no_stat_projection: bool,

        /// Load actual fantasy-point scores
        #[arg(long)]
        fp_score: bool,

        /// Load DFS salaries
        #[arg(long)]
        dfs_salary: bool,

        /// Fail if the dataset spans more than one week
        #[arg(long)]
        single_week: bool,

        /// Dataset holds season-long totals
        #[arg(long)]
        season_totals: bool,

        /// Print the load report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Map scraped names to fantasy player ids
    Disambiguate {
        /// Scraped name
        #[arg(long, requires = "id", conflicts_with = "file")]
        name: Option<String>,

        /// Fantasy player id the name refers to
        #[arg(long, requires = "name")]
        id: Option<String>,

        /// CSV of name_as_scraped,fantasy_player_id pairs
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Resolve names and show the closest candidates
    Resolve {
        /// Names to resolve
        #[arg(required = true)]
        names: Vec<String>,

        /// Candidates to list for each name
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show schema versions and table sizes
    Status,
}

impl Commands {
    fn load_options(&self) -> Option<LoadOptions> {
        match self {
            Commands::Load {
                no_fp_projection,
                no_stat_projection,
                fp_score,
                dfs_salary,
                single_week,
                season_totals,
                ..
            } => Some(LoadOptions {
                fp_projection: !no_fp_projection,
                stat_projection: !no_stat_projection,
                fp_score: *fp_score,
                dfs_salary: *dfs_salary,
                single_week_only: *single_week,
                season_totals: *season_totals,
            }),
            _ => None,
        }
    }
}

/// CLI handler
pub struct CliHandler {
    store: PgStore,
    config: LoaderConfig,
}

impl CliHandler {
    /// Connect to the database, migrating the projection schema if needed
    pub async fn new(config: LoaderConfig) -> Result<Self> {
        let store =
            PgStore::connect(&config.database).await.context("connecting to the database")?;
        Ok(Self { store, config })
    }

    /// Handle CLI commands
    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        let options = command.load_options();
        match command {
            Commands::Load { input, metadata, json, .. } => {
                let options = options.unwrap_or_default();
                self.load(&input, &metadata, &options, json).await
            }
            Commands::Disambiguate { name, id, file } => self.disambiguate(name, id, file).await,
            Commands::Resolve { names, limit } => self.resolve(&names, limit).await,
            Commands::Status => self.show_status().await,
        }
    }

    async fn load(
        &self,
        input: &Path,
        metadata: &Path,
        options: &LoadOptions,
        json: bool,
    ) -> Result<()> {
        let data = io::read_dataset(input)?;
        let metadata = io::read_metadata(metadata)?;
        info!("Read {} rows from {}", data.len(), input.display());

        let loader = Loader::from_config(&self.store, &self.config.resolver);
        let report = loader.load(data, &metadata, options).await.map_err(explain)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }

    async fn disambiguate(
        &self,
        name: Option<String>,
        id: Option<String>,
        file: Option<PathBuf>,
    ) -> Result<()> {
        let mapping = match (name, id, file) {
            (Some(name), Some(id), None) => BTreeMap::from([(name, FantasyPlayerId::new(id))]),
            (None, None, Some(file)) => io::read_disambiguations(&file)?,
            _ => bail!("give either --name and --id, or --file"),
        };
        let added = add_disambiguations(&self.store, &mapping).await?;
        println!("Added {added} disambiguation entries");
        Ok(())
    }

    async fn resolve(&self, names: &[String], limit: Option<usize>) -> Result<()> {
        let limit = limit.unwrap_or(self.config.resolver.candidate_limit);
        let resolver = NameResolver::from_config(&self.store, &self.config.resolver);
        for name in names {
            match resolver.resolve_with_limit(name, limit).await {
                Ok(id) => println!("{name} => {id}"),
                Err(LoaderError::UnresolvedName { candidates, .. }) => {
                    println!("{name} => unresolved; closest matches:");
                    println!("{}", format_candidates(&candidates));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn show_status(&self) -> Result<()> {
        let version = self.store.schema_version().await?;
        println!("Projection schema version: {version} (library supports {SCHEMA_VERSION})");
        println!("nfldb schema version required: {NFLDB_SCHEMA_VERSION}");
        println!("{}", "=".repeat(40));
        print_table_size(PROJECTION_SET.name, self.store.rows(&PROJECTION_SET).await?.len());
        for table in FACT_TABLES {
            print_table_size(table.name, self.store.rows(*table).await?.len());
        }
        Ok(())
    }
}

fn print_table_size(table: &str, rows: usize) {
    println!("{table:<20} {rows:>10} rows");
}

fn print_report(report: &LoadReport) {
    if report.byes_dropped > 0 {
        println!("Dropped {} bye rows", report.byes_dropped);
    }
    for category in &report.categories {
        println!(
            "{:<16} {:>6} rows in {} sets ({} rows without data)",
            category.category.as_str(),
            category.rows_inserted(),
            category.sets.len(),
            category.rows_dropped
        );
        for set in &category.sets {
            let week = set.week.map_or_else(|| "-".to_string(), |w| w.to_string());
            println!("  set {:>6}  week {:>3}  {:>6} rows", set.set_id, week, set.rows);
        }
    }
}

/// Attach the operator's next step to errors that have one
fn explain(error: LoaderError) -> anyhow::Error {
    let hint = match &error {
        LoaderError::UnresolvedName { name, .. } => Some(format!(
            "add an entry with `projection-import disambiguate --name \"{name}\" --id <player_id>`"
        )),
        LoaderError::UnrecognizedColumn { .. } => {
            Some("rename or drop those columns and retry".to_string())
        }
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::Error::new(error).context(hint),
        None => error.into(),
    }
}
