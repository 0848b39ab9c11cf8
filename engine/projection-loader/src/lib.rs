//! # Projection Loader
//!
//! Turns scraped fantasy-football tables into rows of the projection schema.
//!
//! - [`names`]: scraped name → fantasy player id, via the disambiguation
//!   table and fuzzy matching
//! - [`metadata`]: insert-if-absent registration of point systems, DFS sites
//!   and sources, ending in a new projection set
//! - [`loader`]: validation, preprocessing, category split, week
//!   partitioning and fact-row insertion

pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod metadata;
pub mod names;
pub mod preprocess;

#[cfg(test)]
mod integration_tests;

pub use config::{LoaderConfig, LoggingConfig, ResolverConfig};
pub use dataset::Dataset;
pub use error::{LoaderError, Result};
pub use loader::{Category, CategoryReport, LoadOptions, LoadReport, Loader, SetReport};
pub use metadata::{register, Metadata, SetId};
pub use names::{add_disambiguations, DistanceMetric, NameResolver, ScoredCandidate};
