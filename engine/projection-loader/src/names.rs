//! Resolution of scraped player and team names to fantasy player ids.
//!
//! A name is looked up verbatim in `name_disambiguation` first. Otherwise it
//! is compared against every canonical player and team by edit distance over
//! normalized strings; only an unambiguous exact match is accepted. Anything
//! else fails with the closest candidates so an operator can add a
//! disambiguation entry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use projection_store::catalog::NAME_DISAMBIGUATION;
use projection_store::{
    row, Candidate, Database, FantasyPlayerId, ProjectionStore, Value, WriteGuard,
};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::error::{LoaderError, Result};

/// Number of candidates reported for an unresolved name unless configured otherwise
pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;

/// Edit distance used to rank candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Levenshtein,
    DamerauLevenshtein,
    /// Optimal string alignment: transpositions of adjacent characters count once
    OsaDistance,
}

impl DistanceMetric {
    pub fn distance(&self, a: &str, b: &str) -> usize {
        match self {
            DistanceMetric::Levenshtein => strsim::levenshtein(a, b),
            DistanceMetric::DamerauLevenshtein => strsim::damerau_levenshtein(a, b),
            DistanceMetric::OsaDistance => strsim::osa_distance(a, b),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "levenshtein" => Ok(DistanceMetric::Levenshtein),
            "damerau_levenshtein" | "damerau" => Ok(DistanceMetric::DamerauLevenshtein),
            "osa" | "osa_distance" => Ok(DistanceMetric::OsaDistance),
            other => Err(LoaderError::InvalidConfig(format!("unknown name metric '{other}'"))),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceMetric::Levenshtein => "levenshtein",
            DistanceMetric::DamerauLevenshtein => "damerau_levenshtein",
            DistanceMetric::OsaDistance => "osa_distance",
        };
        f.write_str(name)
    }
}

/// Lowercase, drop punctuation, treat hyphens and underscores as spaces and
/// collapse whitespace: "Odell Beckham, Jr." becomes "odell beckham jr"
pub fn normalize_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A corpus entry and its distance to the name being resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub distance: usize,
    pub candidate: Candidate,
}

/// Ranked candidate report, one line per candidate
pub fn format_candidates(candidates: &[ScoredCandidate]) -> String {
    if candidates.is_empty() {
        return "  (no candidates)".to_string();
    }
    candidates
        .iter()
        .map(|c| format!("  {:>3}  {:<40}  {}", c.distance, c.candidate.label(), c.candidate.id))
        .collect::<Vec<_>>()
        .join("\n")
}

struct IndexedCandidate {
    candidate: Candidate,
    normalized: Vec<String>,
}

/// Resolves scraped names against one store.
///
/// The canonical corpus is read on first use and kept for the resolver's
/// lifetime.
pub struct NameResolver<'a, S: ?Sized> {
    store: &'a S,
    metric: DistanceMetric,
    candidate_limit: usize,
    corpus: OnceCell<Vec<IndexedCandidate>>,
}

impl<'a, S> NameResolver<'a, S>
where
    S: Database + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            metric: DistanceMetric::default(),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            corpus: OnceCell::new(),
        }
    }

    pub fn from_config(store: &'a S, config: &ResolverConfig) -> Self {
        Self::new(store).with_metric(config.metric).with_candidate_limit(config.candidate_limit)
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    async fn corpus(&self) -> Result<&[IndexedCandidate]> {
        let corpus = self
            .corpus
            .get_or_try_init(|| async {
                let candidates = self.store.name_corpus().await?;
                debug!("Indexed {} name candidates", candidates.len());
                Ok::<_, LoaderError>(
                    candidates
                        .into_iter()
                        .map(|candidate| {
                            let normalized =
                                candidate.search_names.iter().map(|n| normalize_name(n)).collect();
                            IndexedCandidate { normalized, candidate }
                        })
                        .collect(),
                )
            })
            .await?;
        Ok(corpus.as_slice())
    }

    /// Every corpus entry ordered by distance to `name`, ties by display name
    async fn rank(&self, name: &str) -> Result<Vec<ScoredCandidate>> {
        let needle = normalize_name(name);
        let corpus = self.corpus().await?;

        let mut ranked: Vec<(usize, &Candidate)> = corpus
            .iter()
            .map(|entry| {
                let distance = entry
                    .normalized
                    .iter()
                    .map(|n| self.metric.distance(&needle, n))
                    .min()
                    .unwrap_or(usize::MAX);
                (distance, &entry.candidate)
            })
            .collect();
        ranked.sort_by(|(da, a), (db, b)| {
            da.cmp(db)
                .then_with(|| a.display_name.cmp(&b.display_name))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(ranked
            .into_iter()
            .map(|(distance, candidate)| ScoredCandidate { distance, candidate: candidate.clone() })
            .collect())
    }

    /// The `limit` closest candidates for `name`
    pub async fn search(&self, name: &str, limit: usize) -> Result<Vec<ScoredCandidate>> {
        let mut ranked = self.rank(name).await?;
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Resolve with the configured candidate limit
    pub async fn resolve(&self, name: &str) -> Result<FantasyPlayerId> {
        self.resolve_with_limit(name, self.candidate_limit).await
    }

    pub async fn resolve_with_limit(&self, name: &str, limit: usize) -> Result<FantasyPlayerId> {
        if let Some(id) = self.store.disambiguation(name).await? {
            debug!("'{}' resolved to {} by disambiguation entry", name, id);
            return Ok(id);
        }

        let ranked = self.rank(name).await?;
        let mut exact: Vec<&FantasyPlayerId> =
            ranked.iter().take_while(|c| c.distance == 0).map(|c| &c.candidate.id).collect();
        exact.sort();
        exact.dedup();

        if let [id] = exact.as_slice() {
            debug!("'{}' resolved to {} by exact match", name, id);
            return Ok((*id).clone());
        }
        if exact.len() > 1 {
            warn!("'{}' matches {} entities exactly", name, exact.len());
        }

        let candidates: Vec<ScoredCandidate> = ranked.into_iter().take(limit).collect();
        warn!(
            "Could not resolve '{}'. Add a name disambiguation entry. Closest matches:\n{}",
            name,
            format_candidates(&candidates)
        );
        Err(LoaderError::UnresolvedName { name: name.to_string(), candidates })
    }
}

/// Insert disambiguation entries in a single transaction.
///
/// Only `name_disambiguation` is locked. An entry whose scraped name already
/// exists fails the whole batch.
pub async fn add_disambiguations<S>(
    store: &S,
    mapping: &BTreeMap<String, FantasyPlayerId>,
) -> Result<usize>
where
    S: ProjectionStore + ?Sized,
{
    if mapping.is_empty() {
        debug!("No disambiguation entries to write");
        return Ok(0);
    }

    info!("Writing {} rows to name_disambiguation", mapping.len());
    let mut guard = WriteGuard::acquire(store, &[&NAME_DISAMBIGUATION]).await?;
    for (name, id) in mapping {
        let entry = row([
            ("name_as_scraped", Value::from(name.as_str())),
            ("fantasy_player_id", Value::from(id.as_str())),
        ]);
        guard.insert(&NAME_DISAMBIGUATION, &entry, None).await?;
    }
    guard.commit().await?;

    Ok(mapping.len())
}
