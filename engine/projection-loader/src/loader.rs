//! Tabular loading of scraped projections, scores and salaries.
//!
//! A load validates the dataset's columns, preprocesses the rows, splits them
//! into categories (fantasy-point projections, statistic projections, actual
//! scores, DFS salaries) and writes each category one week at a time. Each
//! week is one transaction: the system tables are locked, the metadata is
//! registered to obtain a projection set id, and every row is inserted into
//! the fact tables its columns select.

use std::fmt;

use projection_store::catalog::{
    fact_tables_for_columns, is_recognized_column, TableDef, DFS_SALARY, FP_PROJECTION, FP_SCORE,
    STAT_FIELDS, STAT_PROJECTION, SYSTEM_TABLES, UNSCORED_SYSTEM,
};
use projection_store::{Database, Row, Value, WriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::dataset::Dataset;
use crate::error::{LoaderError, Result};
use crate::metadata::{self, Metadata, SetId};
use crate::names::NameResolver;
use crate::preprocess;

/// Which categories to load and how to partition them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub fp_projection: bool,
    pub stat_projection: bool,
    pub fp_score: bool,
    pub dfs_salary: bool,

    /// Treat the dataset as one week; more than one distinct week is an error
    pub single_week_only: bool,

    /// Season-long totals; accepted but not stored
    pub season_totals: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            fp_projection: true,
            stat_projection: true,
            fp_score: false,
            dfs_salary: false,
            single_week_only: false,
            season_totals: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FpProjection,
    StatProjection,
    FpScore,
    DfsSalary,
}

/// Columns every category keeps alongside its own fields
const FACT_CONTROL_COLUMNS: &[&str] = &["fantasy_player_id", "gsis_id", "team", "fantasy_pos"];

/// Fields that belong to scoring categories and are stripped from statistic loads
const SCORING_FIELDS: &[&str] = &["projected_fp", "fp_variance", "actual_fp", "salary"];

impl Category {
    /// Load order
    pub const ALL: [Category; 4] =
        [Category::FpProjection, Category::StatProjection, Category::FpScore, Category::DfsSalary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::FpProjection => "fp_projection",
            Category::StatProjection => "stat_projection",
            Category::FpScore => "fp_score",
            Category::DfsSalary => "dfs_salary",
        }
    }

    pub fn table(&self) -> &'static TableDef {
        match self {
            Category::FpProjection => &FP_PROJECTION,
            Category::StatProjection => &STAT_PROJECTION,
            Category::FpScore => &FP_SCORE,
            Category::DfsSalary => &DFS_SALARY,
        }
    }

    pub fn enabled(&self, options: &LoadOptions) -> bool {
        match self {
            Category::FpProjection => options.fp_projection,
            Category::StatProjection => options.stat_projection,
            Category::FpScore => options.fp_score,
            Category::DfsSalary => options.dfs_salary,
        }
    }

    /// Whether rows of this category need a real scoring system
    pub fn requires_scoring(&self) -> bool {
        !matches!(self, Category::StatProjection)
    }

    /// The field whose null value disqualifies a row
    fn value_field(&self) -> Option<&'static str> {
        match self {
            Category::FpProjection => Some("projected_fp"),
            Category::StatProjection => None,
            Category::FpScore => Some("actual_fp"),
            Category::DfsSalary => Some("salary"),
        }
    }

    /// The columns of `data` this category loads, minus rows it cannot use.
    ///
    /// Returns the subset and how many rows were dropped.
    pub fn extract(&self, data: &Dataset) -> (Dataset, usize) {
        let mut subset = match self {
            Category::StatProjection => data.without(SCORING_FIELDS),
            Category::FpProjection => data.select(&with_controls(&["projected_fp", "fp_variance"])),
            Category::FpScore => data.select(&with_controls(&["actual_fp"])),
            Category::DfsSalary => data.select(&with_controls(&["salary"])),
        };

        let dropped = match self.value_field() {
            Some(field) => subset.drop_null(field),
            None => subset.retain(|row| {
                STAT_FIELDS.iter().any(|field| row.get(*field).is_some_and(|v| !v.is_null()))
            }),
        };
        (subset, dropped)
    }

    /// Metadata as this category registers it.
    ///
    /// Statistic projections are never scored: the point system is forced to
    /// `None` and scoring and DFS fields are removed.
    pub fn metadata(&self, metadata: &Metadata) -> Metadata {
        let mut metadata = metadata.clone();
        if let Category::StatProjection = self {
            metadata.insert("fpsys_name".to_string(), Value::from(UNSCORED_SYSTEM));
            for field in ["fpsys_url", "dfs_name", "dfs_url"] {
                metadata.remove(field);
            }
        }
        metadata
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn with_controls(fields: &[&'static str]) -> Vec<&'static str> {
    FACT_CONTROL_COLUMNS.iter().chain(fields).chain(&["week"]).copied().collect()
}

/// One projection set written by a load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetReport {
    pub set_id: SetId,
    pub week: Option<i64>,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryReport {
    pub category: Category,

    /// Rows left out because they carried no data for this category
    pub rows_dropped: usize,

    pub sets: Vec<SetReport>,
}

impl CategoryReport {
    fn new(category: Category, rows_dropped: usize) -> Self {
        Self { category, rows_dropped, sets: Vec::new() }
    }

    pub fn rows_inserted(&self) -> usize {
        self.sets.iter().map(|s| s.rows).sum()
    }
}

/// Outcome of [`Loader::load`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub byes_dropped: usize,
    pub categories: Vec<CategoryReport>,
}

impl LoadReport {
    pub fn category(&self, category: Category) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn set_ids(&self) -> Vec<SetId> {
        self.categories.iter().flat_map(|c| c.sets.iter().map(|s| s.set_id)).collect()
    }

    pub fn rows_inserted(&self) -> usize {
        self.categories.iter().map(CategoryReport::rows_inserted).sum()
    }
}

struct Partition {
    week: Option<i64>,
    metadata: Metadata,
    rows: Dataset,
}

struct CategoryPlan {
    report: CategoryReport,
    tables: Vec<&'static TableDef>,
    partitions: Vec<Partition>,
}

/// Fail on any column that is neither a control column nor a fact-table field
pub fn validate_columns(data: &Dataset) -> Result<()> {
    let unrecognized: Vec<String> =
        data.columns().iter().filter(|c| !is_recognized_column(c)).cloned().collect();
    if unrecognized.is_empty() {
        Ok(())
    } else {
        Err(LoaderError::UnrecognizedColumn { columns: unrecognized })
    }
}

fn week_of(value: &Value) -> Result<Option<i64>> {
    if value.is_null() {
        return Ok(None);
    }
    value.as_i64().map(Some).ok_or_else(|| {
        LoaderError::invalid_value("week", format!("'{value}' is not a week number"))
    })
}

/// Split a category's rows into the week partitions written separately
fn partition(data: &Dataset, metadata: &Metadata, options: &LoadOptions) -> Result<Vec<Partition>> {
    let with_week = |week: Option<i64>| {
        let mut metadata = metadata.clone();
        if let Some(week) = week {
            metadata.insert("week".to_string(), Value::Int(week));
        }
        metadata
    };

    if options.single_week_only {
        let mut weeks = Vec::new();
        for value in data.distinct("week") {
            if let Some(week) = week_of(&value)? {
                weeks.push(week);
            }
        }
        // 1 and 1.0 are the same week.
        weeks.sort_unstable();
        weeks.dedup();
        if weeks.len() > 1 {
            return Err(LoaderError::MultipleWeeks { weeks });
        }
        let week = weeks.first().copied();
        return Ok(vec![Partition { week, metadata: with_week(week), rows: data.clone() }]);
    }

    let mut partitions: Vec<Partition> = data
        .group_by(|row| week_of(row.get("week").unwrap_or(&Value::Null)))?
        .into_iter()
        .map(|(week, rows)| Partition { week, metadata: with_week(week), rows })
        .collect();
    partitions.sort_by_key(|p| p.week);
    Ok(partitions)
}

/// Metadata and row merged into the row actually inserted; row values win
fn merge(metadata: &Metadata, row: &Row, set_id: SetId) -> Row {
    let mut merged = metadata.clone();
    for (column, value) in row {
        if !value.is_null() {
            merged.insert(column.clone(), value.clone());
        }
    }
    merged.insert("set_id".to_string(), Value::Int(set_id.0));
    merged
}

/// Loads datasets into one store
pub struct Loader<'a, S: ?Sized> {
    store: &'a S,
    resolver: NameResolver<'a, S>,
}

impl<'a, S> Loader<'a, S>
where
    S: Database + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store, resolver: NameResolver::new(store) }
    }

    pub fn from_config(store: &'a S, config: &ResolverConfig) -> Self {
        Self { store, resolver: NameResolver::from_config(store, config) }
    }

    pub fn resolver(&self) -> &NameResolver<'a, S> {
        &self.resolver
    }

    /// Load `data` described by `metadata`.
    ///
    /// Column validation and preprocessing finish before anything is written.
    /// Each (category, week) partition commits independently; a failure rolls
    /// back the partition in progress and stops the load.
    pub async fn load(
        &self,
        mut data: Dataset,
        metadata: &Metadata,
        options: &LoadOptions,
    ) -> Result<LoadReport> {
        validate_columns(&data)?;
        info!("Loading {} rows ({} columns)", data.len(), data.columns().len());

        let byes_dropped = self.preprocess(&mut data, metadata, options).await?;
        let mut report = LoadReport { byes_dropped, categories: Vec::new() };

        if options.season_totals {
            for category in Category::ALL.iter().filter(|c| c.enabled(options)) {
                info!("Season totals are not stored; skipping {}", category);
                report.categories.push(CategoryReport::new(*category, 0));
            }
            return Ok(report);
        }

        let plans = self.plan(&data, metadata, options)?;
        for plan in plans {
            let mut category_report = plan.report;
            for partition in &plan.partitions {
                let set = self.write_partition(&plan.tables, partition).await?;
                info!(
                    "Loaded {} {} rows into set {} (week {})",
                    set.rows,
                    category_report.category,
                    set.set_id,
                    set.week.map_or_else(|| "-".to_string(), |w| w.to_string())
                );
                category_report.sets.push(set);
            }
            report.categories.push(category_report);
        }

        info!("Load complete: {} rows in {} sets", report.rows_inserted(), report.set_ids().len());
        Ok(report)
    }

    /// Returns the number of bye rows dropped
    async fn preprocess(
        &self,
        data: &mut Dataset,
        metadata: &Metadata,
        options: &LoadOptions,
    ) -> Result<usize> {
        preprocess::derive_fantasy_pos(data)?;
        let byes = preprocess::drop_byes(data);
        if !options.season_totals {
            preprocess::assign_game_ids(data, self.store, metadata).await?;
        }
        preprocess::fix_dst_names(data);
        preprocess::assign_player_ids(data, &self.resolver).await?;
        Ok(byes)
    }

    /// Split into categories and partitions and check each partition's
    /// metadata, all before the first write
    fn plan(
        &self,
        data: &Dataset,
        metadata: &Metadata,
        options: &LoadOptions,
    ) -> Result<Vec<CategoryPlan>> {
        let mut plans = Vec::new();
        for category in Category::ALL.into_iter().filter(|c| c.enabled(options)) {
            let (rows, dropped) = category.extract(data);
            if dropped > 0 {
                debug!("{}: dropped {} rows without data", category, dropped);
            }

            let report = CategoryReport::new(category, dropped);
            let tables = fact_tables_for_columns(rows.columns().iter().map(String::as_str));
            if rows.is_empty() || tables.is_empty() {
                debug!("{}: nothing to load", category);
                plans.push(CategoryPlan { report, tables, partitions: Vec::new() });
                continue;
            }

            let category_metadata = category.metadata(metadata);
            let fpsys_name = category_metadata.get("fpsys_name").and_then(Value::as_str);
            let unscored = fpsys_name == Some(UNSCORED_SYSTEM);
            if category.requires_scoring() && unscored {
                return Err(LoaderError::UnscoredSystem { table: category.table().name });
            }
            let no_site = category_metadata.get("dfs_name").map_or(true, Value::is_null);
            if category == Category::DfsSalary && no_site {
                return Err(LoaderError::missing_metadata(DFS_SALARY.name, "dfs_name"));
            }

            let partitions = partition(&rows, &category_metadata, options)?;
            for partition in &partitions {
                metadata::validate(&partition.metadata)?;
            }
            plans.push(CategoryPlan { report, tables, partitions });
        }
        Ok(plans)
    }

    async fn write_partition(
        &self,
        tables: &[&'static TableDef],
        partition: &Partition,
    ) -> Result<SetReport> {
        let mut guard = WriteGuard::acquire(self.store, SYSTEM_TABLES).await?;
        let set_id = metadata::register(&mut guard, &partition.metadata).await?;

        let mut inserted = 0;
        for table in tables {
            for row in partition.rows.rows() {
                let merged = merge(&partition.metadata, row, set_id);
                if let Err(e) = guard.insert(*table, &merged, None).await {
                    let player = row.get("fantasy_player_id");
                    warn!("Insert into {} failed for {:?}: {}", table.name, player, e);
                    return Err(e.into());
                }
                inserted += 1;
            }
        }

        guard.commit().await?;
        Ok(SetReport { set_id, week: partition.week, rows: inserted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projection_store::row;

    fn scraped() -> Dataset {
        Dataset::from_rows(vec![
            row([
                ("name", Value::from("Tom Brady")),
                ("team", Value::from("NE")),
                ("week", Value::Int(1)),
                ("passing_yds", Value::Float(310.0)),
                ("projected_fp", Value::Float(22.4)),
                ("salary", Value::Int(7900)),
            ]),
            row([
                ("name", Value::from("Julian Edelman")),
                ("team", Value::from("NE")),
                ("week", Value::Int(2)),
                ("receiving_yds", Value::Null),
                ("projected_fp", Value::Null),
            ]),
        ])
    }

    #[test]
    fn test_category_subsets() {
        let data = scraped();

        let (fp, dropped) = Category::FpProjection.extract(&data);
        assert_eq!(fp.columns(), &["team", "projected_fp", "week"]);
        assert_eq!((fp.len(), dropped), (1, 1));

        let (stats, dropped) = Category::StatProjection.extract(&data);
        assert!(!stats.has_column("projected_fp"));
        assert!(!stats.has_column("salary"));
        assert!(stats.has_column("name"));
        assert_eq!((stats.len(), dropped), (1, 1));

        let (salaries, _) = Category::DfsSalary.extract(&data);
        assert_eq!(salaries.columns(), &["team", "salary", "week"]);
    }

    #[test]
    fn test_stat_metadata_is_unscored() {
        let metadata = row([
            ("fpsys_name", "NFL.com"),
            ("fpsys_url", "http://fantasy.nfl.com"),
            ("dfs_name", "DraftKings"),
            ("source_name", "numberFire"),
        ]);
        let stat = Category::StatProjection.metadata(&metadata);
        assert_eq!(stat["fpsys_name"], Value::from("None"));
        assert!(!stat.contains_key("fpsys_url"));
        assert!(!stat.contains_key("dfs_name"));
        assert_eq!(stat["source_name"], Value::from("numberFire"));
        assert_eq!(Category::FpProjection.metadata(&metadata), metadata);
    }

    #[test]
    fn test_validate_columns_lists_every_unknown() {
        let data = Dataset::new(["name", "team", "rush_yards", "passing_yds", "notes"]);
        match validate_columns(&data) {
            Err(LoaderError::UnrecognizedColumn { columns }) => {
                assert_eq!(columns, vec!["rush_yards", "notes"])
            }
            other => panic!("expected UnrecognizedColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_partitions_by_week() {
        let data = scraped();
        let metadata = row([("source_name", "numberFire")]);

        let weekly = partition(&data, &metadata, &LoadOptions::default()).unwrap();
        let weeks: Vec<_> = weekly.iter().map(|p| p.week).collect();
        assert_eq!(weeks, vec![Some(1), Some(2)]);
        assert_eq!(weekly[1].metadata["week"], Value::Int(2));

        let single = LoadOptions { single_week_only: true, ..LoadOptions::default() };
        match partition(&data, &metadata, &single) {
            Err(LoaderError::MultipleWeeks { weeks }) => assert_eq!(weeks, vec![1, 2]),
            other => panic!("expected MultipleWeeks, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_integral_float_week_joins_integer_week() {
        let data = Dataset::from_rows(vec![
            row([("name", Value::from("Tom Brady")), ("week", Value::Int(1))]),
            row([("name", Value::from("Rob Gronkowski")), ("week", Value::Float(1.0))]),
            row([("name", Value::from("Julian Edelman")), ("week", Value::Int(2))]),
        ]);
        let metadata = row([("source_name", "numberFire")]);

        let weekly = partition(&data, &metadata, &LoadOptions::default()).unwrap();
        let sizes: Vec<_> = weekly.iter().map(|p| (p.week, p.rows.len())).collect();
        assert_eq!(sizes, vec![(Some(1), 2), (Some(2), 1)]);

        let one_week = Dataset::from_rows(data.rows()[..2].to_vec());
        let single = LoadOptions { single_week_only: true, ..LoadOptions::default() };
        let partitions = partition(&one_week, &metadata, &single).unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].week, Some(1));
        assert_eq!(partitions[0].rows.len(), 2);
    }

    #[test]
    fn test_merge_prefers_row_values() {
        let metadata = row([
            ("week", Value::Int(3)),
            ("team", Value::from("XXX")),
            ("source_name", Value::from("s")),
        ]);
        let scraped = row([("team", Value::from("NE")), ("gsis_id", Value::Null)]);
        let merged = merge(&metadata, &scraped, SetId(9));
        assert_eq!(merged["team"], Value::from("NE"));
        assert_eq!(merged["week"], Value::Int(3));
        assert_eq!(merged["set_id"], Value::Int(9));
        assert!(!merged.contains_key("gsis_id"));
    }
}
