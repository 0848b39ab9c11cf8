//! Dependency-ordered registration of projection metadata.
//!
//! Reference rows (point systems, DFS sites, sources) are inserted only when
//! no row with the same natural key exists; existing rows are never updated.
//! Registration ends with an unconditional insert into `projection_set`,
//! which yields the id every fact row of the load refers to.

use std::fmt;

use projection_store::catalog::{
    TableDef, DFS_SITE, FP_SYSTEM, PROJECTION_SET, PROJECTION_SOURCE, UNSCORED_SYSTEM,
};
use projection_store::{Row, Value, WriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LoaderError, Result};

/// Flat key-value description of a load: point system, DFS site, source and
/// projection set fields
pub type Metadata = Row;

/// Database-assigned id of a projection set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetId(pub i64);

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One table of the registration sequence
#[derive(Debug)]
pub struct MetadataStep {
    pub table: &'static TableDef,

    /// Columns identifying an existing row
    pub natural_key: &'static [&'static str],

    /// Tables whose steps must run first
    pub depends_on: &'static [&'static str],

    /// When set, the step only runs if this metadata field is supplied
    pub only_with: Option<&'static str>,
}

impl MetadataStep {
    /// Whether `metadata` asks for this step
    pub fn applies_to(&self, metadata: &Metadata) -> bool {
        self.only_with.map_or(true, |field| is_present(metadata, field))
    }

    /// The metadata entries that are columns of this step's table
    pub fn subset(&self, metadata: &Metadata) -> Row {
        metadata
            .iter()
            .filter(|(name, value)| !value.is_null() && self.table.has_column(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn key(&self, metadata: &Metadata) -> Row {
        self.natural_key
            .iter()
            .filter_map(|field| metadata.get(*field).map(|v| (field.to_string(), v.clone())))
            .collect()
    }

    fn check_complete(&self, metadata: &Metadata) -> Result<()> {
        let required =
            self.natural_key.iter().copied().chain(self.table.required_columns().map(|c| c.name));
        for field in required {
            if !is_present(metadata, field) {
                return Err(LoaderError::missing_metadata(self.table.name, field));
            }
        }
        Ok(())
    }
}

fn is_present(metadata: &Metadata, field: &str) -> bool {
    metadata.get(field).is_some_and(|v| !v.is_null())
}

/// Reference tables, in insertion order
pub static REFERENCE_STEPS: &[MetadataStep] = &[
    MetadataStep {
        table: &FP_SYSTEM,
        natural_key: &["fpsys_name"],
        depends_on: &[],
        only_with: None,
    },
    MetadataStep {
        table: &DFS_SITE,
        natural_key: &["fpsys_name", "dfs_name"],
        depends_on: &["fp_system"],
        only_with: Some("dfs_name"),
    },
    MetadataStep {
        table: &PROJECTION_SOURCE,
        natural_key: &["source_name"],
        depends_on: &[],
        only_with: None,
    },
];

/// The terminal step; always inserts
pub static SET_STEP: MetadataStep = MetadataStep {
    table: &PROJECTION_SET,
    natural_key: &["source_name", "fpsys_name"],
    depends_on: &["projection_source", "fp_system"],
    only_with: None,
};

/// Every step in execution order
pub fn metadata_plan() -> impl Iterator<Item = &'static MetadataStep> {
    REFERENCE_STEPS.iter().chain(std::iter::once(&SET_STEP))
}

/// Check `metadata` supplies everything the applicable steps need, without writing
pub fn validate(metadata: &Metadata) -> Result<()> {
    for step in metadata_plan().filter(|s| s.applies_to(metadata)) {
        step.check_complete(metadata)?;
    }
    let unscored = metadata.get("fpsys_name").and_then(Value::as_str) == Some(UNSCORED_SYSTEM);
    if unscored && is_present(metadata, "dfs_name") {
        return Err(LoaderError::UnscoredSystem { table: DFS_SITE.name });
    }
    Ok(())
}

/// Register `metadata` inside the caller's locked transaction and return the
/// new projection set id.
///
/// Nothing is written when validation fails; failures after that leave the
/// rollback to the guard.
pub async fn register(guard: &mut WriteGuard, metadata: &Metadata) -> Result<SetId> {
    validate(metadata)?;

    for step in REFERENCE_STEPS {
        if !step.applies_to(metadata) {
            let field = step.only_with.unwrap_or_default();
            debug!("Skipping {}: no {} in metadata", step.table.name, field);
            continue;
        }

        let key = step.key(metadata);
        if guard.exists(step.table, &key).await? {
            debug!("{} {:?} already registered", step.table.name, key);
            continue;
        }
        guard.insert(step.table, &step.subset(metadata), None).await?;
        info!("Registered {} {:?}", step.table.name, key);
    }

    let returned = guard.insert(SET_STEP.table, &SET_STEP.subset(metadata), Some("set_id")).await?;
    let set_id = returned
        .as_ref()
        .and_then(Value::as_i64)
        .map(SetId)
        .ok_or_else(|| {
            LoaderError::invalid_value("set_id", "no id returned for the new projection set")
        })?;

    info!("Created projection set {} for {:?}", set_id, SET_STEP.key(metadata));
    Ok(set_id)
}
