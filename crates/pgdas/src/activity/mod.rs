//! Maps Simples Nacional tax-table segments to the 43 PGDAS-D activity ids.
//!
//! Resolution looks up the segment's effective description, runs the annex
//! keyword rules and only then falls back to fuzzy matching against the
//! catalog. Rules come first because neighbouring catalog entries differ only
//! in qualifiers (retention, municipality) that similarity scores blur.

mod catalog;
mod normalize;
mod rules;
mod similarity;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::declaration::Period;
use crate::sources::{SourceError, TaxTableSource};

pub use catalog::{EXPORT_CODES, FATOR_R_CODES};
pub use normalize::normalize_description;
pub use similarity::ratio as similarity_ratio;

/// Minimum similarity for a fuzzy match to be accepted.
pub const FUZZY_THRESHOLD: f64 = 0.55;

/// PGDAS-D `idAtividade`, always within 1..=43.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ActivityCode(u8);

impl ActivityCode {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 43;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub fn description(self) -> &'static str {
        catalog::DESCRIPTIONS[usize::from(self.0 - 1)]
    }

    pub fn is_export(self) -> bool {
        EXPORT_CODES.contains(&self.0)
    }

    pub fn is_fator_r(self) -> bool {
        FATOR_R_CODES.contains(&self.0)
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (Self::MIN..=Self::MAX).map(Self)
    }
}

impl fmt::Display for ActivityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("activity id {0} is outside 1..=43")]
pub struct InvalidActivityCode(pub u8);

impl TryFrom<u8> for ActivityCode {
    type Error = InvalidActivityCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidActivityCode(value))
    }
}

impl From<ActivityCode> for u8 {
    fn from(code: ActivityCode) -> Self {
        code.0
    }
}

/// ERP classification key (anexo, seção, tabela) of a revenue line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub annex: u16,
    pub section: u16,
    pub table: u16,
}

impl SegmentKey {
    pub const fn new(annex: u16, section: u16, table: u16) -> Self {
        Self {
            annex,
            section,
            table,
        }
    }

    /// `(0, 0, 0)` marks ERP rows that carry no classification.
    pub const fn is_placeholder(self) -> bool {
        self.annex == 0 && self.section == 0 && self.table == 0
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.annex, self.section, self.table)
    }
}

/// How a description was classified.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Rule(ActivityCode),
    Fuzzy { code: ActivityCode, score: f64 },
    BelowThreshold { closest: ActivityCode, score: f64 },
    MissingDescription,
}

impl ResolutionOutcome {
    pub fn code(&self) -> Option<ActivityCode> {
        match self {
            Self::Rule(code) | Self::Fuzzy { code, .. } => Some(*code),
            Self::BelowThreshold { .. } | Self::MissingDescription => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub segment: SegmentKey,
    pub period: Period,
    pub description: Option<String>,
    pub outcome: ResolutionOutcome,
}

impl Resolution {
    pub fn code(&self) -> Option<ActivityCode> {
        self.outcome.code()
    }
}

static NORMALIZED_CATALOG: OnceLock<Vec<(ActivityCode, String)>> = OnceLock::new();

fn normalized_catalog() -> &'static [(ActivityCode, String)] {
    NORMALIZED_CATALOG.get_or_init(|| {
        ActivityCode::all()
            .map(|code| (code, normalize_description(code.description())))
            .collect()
    })
}

/// Classifies a raw description for the given annex without touching any
/// tax-table source.
pub fn classify_description(annex: u16, description: &str) -> ResolutionOutcome {
    let normalized = normalize_description(description);

    if let Some(code) = rules::rule_for(annex, &normalized) {
        return ResolutionOutcome::Rule(code);
    }

    let mut best: Option<(ActivityCode, f64)> = None;
    for (code, candidate) in normalized_catalog() {
        let score = similarity::ratio(&normalized, candidate);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((*code, score));
        }
    }

    match best {
        Some((code, score)) if score >= FUZZY_THRESHOLD => {
            debug!(%normalized, code = code.get(), score, "fuzzy activity match");
            ResolutionOutcome::Fuzzy { code, score }
        }
        Some((closest, score)) => ResolutionOutcome::BelowThreshold { closest, score },
        None => ResolutionOutcome::MissingDescription,
    }
}

/// Bounded memo of resolutions keyed by segment and month. Oldest entries are
/// evicted first once `capacity` is reached.
#[derive(Debug)]
struct ResolutionCache {
    entries: HashMap<(SegmentKey, Period), Resolution>,
    order: VecDeque<(SegmentKey, Period)>,
    capacity: usize,
}

impl ResolutionCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &(SegmentKey, Period)) -> Option<&Resolution> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: (SegmentKey, Period), resolution: Resolution) {
        if self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key);
        self.entries.insert(key, resolution);
    }
}

/// Resolves segments to activity ids, memoizing each `(segment, month)`.
pub struct ActivityResolver {
    tables: Arc<dyn TaxTableSource>,
    cache: Mutex<ResolutionCache>,
}

impl ActivityResolver {
    pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

    pub fn new(tables: Arc<dyn TaxTableSource>) -> Self {
        Self::with_capacity(tables, Self::DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(tables: Arc<dyn TaxTableSource>, capacity: usize) -> Self {
        Self {
            tables,
            cache: Mutex::new(ResolutionCache::new(capacity)),
        }
    }

    pub fn resolve(
        &self,
        annex: u16,
        section: u16,
        table: u16,
        date: NaiveDate,
    ) -> Result<Option<ActivityCode>, SourceError> {
        Ok(self
            .resolve_segment(SegmentKey::new(annex, section, table), date)?
            .code())
    }

    /// Full resolution trail for a segment as of `date`'s month.
    pub fn resolve_segment(
        &self,
        segment: SegmentKey,
        date: NaiveDate,
    ) -> Result<Resolution, SourceError> {
        let period = Period::from_date(date);
        let key = (segment, period);

        if let Some(hit) = self.lock_cache().get(&key) {
            return Ok(hit.clone());
        }

        let description = self
            .tables
            .effective_description(segment, period.first_day())?
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let outcome = match &description {
            Some(text) => classify_description(segment.annex, text),
            None => ResolutionOutcome::MissingDescription,
        };

        if outcome.code().is_none() {
            warn!(%segment, %period, ?outcome, "tax-table segment left unclassified");
        }

        let resolution = Resolution {
            segment,
            period,
            description,
            outcome,
        };
        self.lock_cache().insert(key, resolution.clone());
        Ok(resolution)
    }

    pub fn cached_entries(&self) -> usize {
        self.lock_cache().entries.len()
    }

    fn lock_cache(&self) -> MutexGuard<'_, ResolutionCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ActivityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityResolver")
            .field("cached_entries", &self.cached_entries())
            .finish_non_exhaustive()
    }
}
