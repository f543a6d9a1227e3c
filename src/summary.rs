//! Read-only summary of what the bandit has learned about one user.

use crate::{Category, UserBanditState};

/// One arm's learned preference.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ArmPreference {
    pub category: Category,
    /// Posterior mean `alpha / (alpha + beta)`.
    pub preference_score: f64,
    pub total_pulls: u64,
    /// 95% interval for the posterior mean.
    pub confidence_interval: (f64, f64),
}

/// Per-user preference summary, arms sorted by score (best first, ties by name).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PreferenceSummary {
    pub arms: Vec<ArmPreference>,
    /// True while any arm is below the cold-start threshold.
    pub is_cold_start: bool,
    /// Arms with at least one reward update.
    pub explored_categories: usize,
    pub total_categories: usize,
}

impl PreferenceSummary {
    pub fn from_state(state: &UserBanditState, cold_start_threshold: u64) -> Self {
        let mut arms: Vec<ArmPreference> = state
            .arms()
            .iter()
            .map(|(&category, s)| ArmPreference {
                category,
                preference_score: s.preference_score(),
                total_pulls: s.total_pulls,
                confidence_interval: s.confidence_interval(0.95),
            })
            .collect();
        // BTreeMap iteration is already name-ordered; the stable sort keeps it on ties.
        arms.sort_by(|a, b| b.preference_score.total_cmp(&a.preference_score));

        Self {
            explored_categories: arms.iter().filter(|a| a.total_pulls > 0).count(),
            total_categories: arms.len(),
            is_cold_start: state.is_cold_start(cold_start_threshold),
            arms,
        }
    }

    /// The `n` best arms.
    pub fn top(&self, n: usize) -> &[ArmPreference] {
        &self.arms[..n.min(self.arms.len())]
    }

    pub fn get(&self, category: Category) -> Option<&ArmPreference> {
        self.arms.iter().find(|a| a.category == category)
    }
}
