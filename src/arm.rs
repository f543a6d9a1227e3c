//! Per-arm Beta posterior statistics and the per-user state that owns them.
//!
//! `alpha`/`beta` start at the uninformative `Beta(1, 1)` prior and only ever
//! grow: this bandit never decays information.  `total_pulls` counts reward
//! updates, not how often an arm was shown.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::Category;

/// Prior alpha for a fresh arm.
pub const PRIOR_ALPHA: f64 = 1.0;
/// Prior beta for a fresh arm.
pub const PRIOR_BETA: f64 = 1.0;

/// Pull count above which the normal-approximation confidence interval is used.
const CI_MIN_PULLS: u64 = 30;

/// Beta posterior state and feedback counters for one (user, category) arm.
///
/// Missing fields deserialize to the prior, so partially written documents load.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ArmStats {
    pub alpha: f64,
    pub beta: f64,
    pub total_pulls: u64,
    pub total_reward: f64,
    pub cooked_count: u64,
    pub upvote_count: u64,
    pub downvote_count: u64,
}

impl Default for ArmStats {
    fn default() -> Self {
        Self {
            alpha: PRIOR_ALPHA,
            beta: PRIOR_BETA,
            total_pulls: 0,
            total_reward: 0.0,
            cooked_count: 0,
            upvote_count: 0,
            downvote_count: 0,
        }
    }
}

impl ArmStats {
    /// Fresh arm at the uninformative prior.
    pub fn prior() -> Self {
        Self::default()
    }

    /// Posterior mean `alpha / (alpha + beta)`; 0.5 for a degenerate posterior.
    pub fn preference_score(&self) -> f64 {
        let denom = self.alpha + self.beta;
        if !(denom.is_finite() && denom > 0.0) {
            0.5
        } else {
            self.alpha / denom
        }
    }

    /// Posterior variance of the Beta distribution.
    pub fn variance(&self) -> f64 {
        let s = self.alpha + self.beta;
        if !(s.is_finite() && s > 0.0) {
            return 0.0;
        }
        (self.alpha * self.beta) / (s * s * (s + 1.0))
    }

    /// Confidence interval for the mean.
    ///
    /// Normal approximation once the arm has more than 30 pulls; before that
    /// the interval is the whole `(0, 1)` range.  `confidence` selects the
    /// z-score: 0.99 and above use 2.576, everything else 1.96.
    pub fn confidence_interval(&self, confidence: f64) -> (f64, f64) {
        if self.total_pulls <= CI_MIN_PULLS {
            return (0.0, 1.0);
        }
        let z = if confidence >= 0.99 { 2.576 } else { 1.96 };
        let mean = self.preference_score();
        let margin = z * self.variance().sqrt();
        ((mean - margin).max(0.0), (mean + margin).min(1.0))
    }
}

/// Which arm table a selection reads from.
///
/// Only the global table exists today; context-partitioned tables would be
/// added as new variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ArmTable {
    Global,
}

/// All arm statistics for one user.
///
/// Always holds an entry for every [`Category`].
#[derive(Debug, Clone, PartialEq)]
pub struct UserBanditState {
    arms: BTreeMap<Category, ArmStats>,
    updated_at: DateTime<Utc>,
}

impl Default for UserBanditState {
    fn default() -> Self {
        Self::new()
    }
}

impl UserBanditState {
    /// Every arm at the prior (full cold start).
    pub fn new() -> Self {
        Self {
            arms: Category::ALL.iter().map(|&c| (c, ArmStats::prior())).collect(),
            updated_at: Utc::now(),
        }
    }

    pub fn arms(&self) -> &BTreeMap<Category, ArmStats> {
        &self.arms
    }

    /// Arms backing the given table.
    pub fn table(&self, table: ArmTable) -> &BTreeMap<Category, ArmStats> {
        match table {
            ArmTable::Global => &self.arms,
        }
    }

    pub fn arm(&self, category: Category) -> ArmStats {
        self.arms.get(&category).copied().unwrap_or_default()
    }

    pub(crate) fn arm_mut(&mut self, category: Category) -> &mut ArmStats {
        self.arms.entry(category).or_default()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    /// Smallest `total_pulls` across all arms.
    pub fn min_pulls(&self) -> u64 {
        self.arms.values().map(|s| s.total_pulls).min().unwrap_or(0)
    }

    /// Sum of `total_pulls` across all arms.
    pub fn total_pulls(&self) -> u64 {
        self.arms
            .values()
            .fold(0u64, |acc, s| acc.saturating_add(s.total_pulls))
    }

    /// True while any arm has fewer than `threshold` reward updates.
    pub fn is_cold_start(&self, threshold: u64) -> bool {
        self.min_pulls() < threshold
    }

    /// Persistable snapshot.
    pub fn to_document(&self) -> BanditDocument {
        BanditDocument {
            arms: self
                .arms
                .iter()
                .map(|(c, s)| (c.as_str().to_string(), *s))
                .collect(),
            updated_at: self.updated_at,
        }
    }

    /// Rebuild from a persisted document.
    ///
    /// Unknown category keys are dropped; categories missing from the document
    /// start at the prior.
    pub fn from_document(doc: BanditDocument) -> Self {
        let mut state = Self::new();
        for (name, stats) in doc.arms {
            match Category::from_name(&name) {
                Some(c) => {
                    state.arms.insert(c, stats);
                }
                None => debug!(category = %name, "dropping unknown category from bandit document"),
            }
        }
        state.updated_at = doc.updated_at;
        state
    }
}

/// Wire/persistence form of [`UserBanditState`]: one document per user.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BanditDocument {
    #[serde(default)]
    pub arms: BTreeMap<String, ArmStats>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}
