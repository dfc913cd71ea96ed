//! Region-name resolution
//!
//! Matches free text such as `"Simogirang"` or `"Simogirang, Prambon"`
//! against the region table. The text after the first comma is a hint that
//! narrows candidates to those whose enclosing regions mention it.

use super::table::RegionTable;
use super::text::{fold_key, similarity};
use crate::error::CuacaError;
use crate::models::RegionRecord;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};

/// Default similarity cutoff for approximate matching
pub const DEFAULT_FUZZY_CUTOFF: f64 = 0.6;

/// How names are compared
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Case-insensitive containment
    Substring,
    /// Approximate match with a similarity cutoff in `0.0..=1.0`
    Fuzzy { cutoff: f64 },
    /// Substring first, approximate only when substring finds nothing
    Auto { cutoff: f64 },
}

impl Default for MatchStrategy {
    fn default() -> Self {
        MatchStrategy::Auto {
            cutoff: DEFAULT_FUZZY_CUTOFF,
        }
    }
}

impl MatchStrategy {
    /// Build from a strategy name and a cutoff
    pub fn from_name(name: &str, cutoff: f64) -> Result<Self, CuacaError> {
        match name.trim().to_lowercase().as_str() {
            "substring" | "contains" => Ok(MatchStrategy::Substring),
            "fuzzy" => Ok(MatchStrategy::Fuzzy { cutoff }),
            "auto" => Ok(MatchStrategy::Auto { cutoff }),
            other => Err(CuacaError::validation(format!(
                "Unknown match strategy '{other}'. Must be one of: substring, fuzzy, auto"
            ))),
        }
    }
}

/// Parsed user query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionQuery {
    pub name: String,
    pub hint: Option<String>,
}

impl RegionQuery {
    /// Split `"desa, kecamatan"` into name and hint
    pub fn parse(input: &str) -> Result<Self, CuacaError> {
        let (name, hint) = match input.split_once(',') {
            Some((name, rest)) => (name.trim(), Some(rest.trim())),
            None => (input.trim(), None),
        };
        if name.is_empty() {
            return Err(CuacaError::validation("Location cannot be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            hint: hint.filter(|h| !h.is_empty()).map(str::to_string),
        })
    }

    /// Replace the hint, e.g. from an explicit `--hint` flag
    #[must_use]
    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        if let Some(h) = hint.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()) {
            self.hint = Some(h);
        }
        self
    }
}

impl FromStr for RegionQuery {
    type Err = CuacaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// How a candidate matched the query
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MatchKind {
    Exact,
    Prefix,
    Contains,
    Similar(f64),
}

impl MatchKind {
    fn rank(self) -> f64 {
        match self {
            MatchKind::Exact => 4.0,
            MatchKind::Prefix => 3.0,
            MatchKind::Contains => 2.0,
            MatchKind::Similar(score) => score,
        }
    }
}

/// A matching region with the text of its enclosing regions
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub record: RegionRecord,
    pub kind: MatchKind,
    /// "Prambon, KAB. SIDOARJO, JAWA TIMUR"
    pub context: String,
}

/// Outcome of resolving a query
#[derive(Debug, Clone)]
pub enum Resolution {
    Unique(Candidate),
    /// `total` counts every match; `candidates` is capped
    Ambiguous {
        candidates: Vec<Candidate>,
        total: usize,
    },
    NotFound { query: String, hint: Option<String> },
}

impl Resolution {
    #[must_use]
    pub fn candidates(&self) -> Vec<&Candidate> {
        match self {
            Resolution::Unique(c) => vec![c],
            Resolution::Ambiguous { candidates, .. } => candidates.iter().collect(),
            Resolution::NotFound { .. } => Vec::new(),
        }
    }

    /// Choose a candidate by 1-based position
    pub fn pick(self, position: usize) -> Result<Candidate, CuacaError> {
        match self {
            Resolution::Unique(c) if position == 1 => Ok(c),
            Resolution::Ambiguous { mut candidates, .. }
                if (1..=candidates.len()).contains(&position) =>
            {
                Ok(candidates.swap_remove(position - 1))
            }
            Resolution::NotFound { query, .. } => Err(CuacaError::validation(format!(
                "Region '{query}' was not found in the region table. Try another spelling or add the regency/city name"
            ))),
            other => Err(CuacaError::validation(format!(
                "Choice {position} is out of range (1..={})",
                other.candidates().len()
            ))),
        }
    }

    /// The top-ranked candidate, if any
    #[must_use]
    pub fn first(self) -> Option<Candidate> {
        match self {
            Resolution::Unique(c) => Some(c),
            Resolution::Ambiguous { candidates, .. } => candidates.into_iter().next(),
            Resolution::NotFound { .. } => None,
        }
    }
}

/// Resolves free text against a [`RegionTable`]
pub struct RegionResolver<'a> {
    table: &'a RegionTable,
    strategy: MatchStrategy,
    max_candidates: usize,
}

impl<'a> RegionResolver<'a> {
    #[must_use]
    pub fn new(table: &'a RegionTable, strategy: MatchStrategy) -> Self {
        Self {
            table,
            strategy,
            max_candidates: 50,
        }
    }

    /// Limit the number of candidates returned for ambiguous queries
    #[must_use]
    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max.max(1);
        self
    }

    pub fn resolve(&self, query: &RegionQuery) -> Result<Resolution, CuacaError> {
        let needle = fold_key(&query.name);
        if needle.is_empty() {
            return Err(CuacaError::validation("Location cannot be empty"));
        }
        let hint = query.hint.as_deref().map(fold_key).filter(|h| !h.is_empty());

        debug!(
            "Resolving '{}' (hint: {:?}) with {:?}",
            needle, hint, self.strategy
        );

        let mut matches = match self.strategy {
            MatchStrategy::Substring => self.substring_matches(&needle),
            MatchStrategy::Fuzzy { cutoff } => self.fuzzy_matches(&needle, cutoff),
            MatchStrategy::Auto { cutoff } => {
                let found = self.substring_matches(&needle);
                if found.is_empty() {
                    debug!("No substring match for '{}', trying approximate match", needle);
                    self.fuzzy_matches(&needle, cutoff)
                } else {
                    found
                }
            }
        };

        if let Some(hint) = &hint {
            matches.retain(|(record, _)| self.matches_hint(record, hint));
        }

        // Stable sort keeps file order within a rank
        matches.sort_by(|a, b| b.1.rank().total_cmp(&a.1.rank()));
        let total = matches.len();
        if total > self.max_candidates {
            debug!("Keeping {} of {} matches", self.max_candidates, total);
            matches.truncate(self.max_candidates);
        }

        let mut candidates: Vec<Candidate> = matches
            .into_iter()
            .map(|(record, kind)| Candidate {
                context: self
                    .table
                    .ancestors(record)
                    .iter()
                    .map(|r| r.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                record: record.clone(),
                kind,
            })
            .collect();

        let resolution = match total {
            0 => Resolution::NotFound {
                query: query.name.clone(),
                hint: query.hint.clone(),
            },
            1 => Resolution::Unique(candidates.remove(0)),
            _ => Resolution::Ambiguous { candidates, total },
        };

        match &resolution {
            Resolution::Unique(c) => info!("Resolved '{}' to {} ({})", query.name, c.record.name, c.record.code),
            Resolution::Ambiguous { total, .. } => info!("'{}' matches {} regions", query.name, total),
            Resolution::NotFound { .. } => info!("No region matches '{}'", query.name),
        }

        Ok(resolution)
    }

    fn substring_matches(&self, needle: &str) -> Vec<(&'a RegionRecord, MatchKind)> {
        self.table
            .records()
            .iter()
            .filter_map(|record| {
                let name = fold_key(&record.name);
                let kind = if name == needle {
                    MatchKind::Exact
                } else if name.starts_with(needle) {
                    MatchKind::Prefix
                } else if name.contains(needle) {
                    MatchKind::Contains
                } else {
                    return None;
                };
                Some((record, kind))
            })
            .collect()
    }

    fn fuzzy_matches(&self, needle: &str, cutoff: f64) -> Vec<(&'a RegionRecord, MatchKind)> {
        self.table
            .records()
            .iter()
            .filter_map(|record| {
                let score = similarity(needle, &fold_key(&record.name));
                (score >= cutoff).then_some((record, MatchKind::Similar(score)))
            })
            .collect()
    }

    fn matches_hint(&self, record: &RegionRecord, hint: &str) -> bool {
        std::iter::once(record)
            .chain(self.table.ancestors(record))
            .any(|r| fold_key(&r.name).contains(hint))
    }
}
