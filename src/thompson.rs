//! Thompson-sampling category selector with epsilon-greedy cold start.
//!
//! Policy, given a user's arm table and `k`:
//! - While any arm has fewer than `cold_start_threshold` reward updates, explore
//!   with probability `epsilon`: the `k` least-pulled arms, ties in name order.
//! - Otherwise draw `θ ~ Beta(alpha, beta)` per arm and take the `k` largest
//!   draws, ties in name order.
//!
//! The random source is a parameter, so a seeded `StdRng` makes selection
//! reproducible in tests.  Selection never mutates arm statistics.

use rand::Rng;
use rand_distr::{Beta, Distribution};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::{ArmStats, Category, Context, Selection, SelectionMode, UserBanditState};

/// Selector configuration.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Reward updates every arm needs before cold start ends.
    pub cold_start_threshold: u64,
    /// Exploration probability during cold start, clamped to `[0, 1]`.
    pub epsilon: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cold_start_threshold: 10,
            epsilon: 0.1,
        }
    }
}

impl SelectorConfig {
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_cold_start_threshold(mut self, threshold: u64) -> Self {
        self.cold_start_threshold = threshold;
        self
    }

    fn epsilon(&self) -> f64 {
        if self.epsilon.is_finite() {
            self.epsilon.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Draw from `Beta(alpha, beta)`; 0.5 for parameters the distribution rejects.
pub fn sample_beta<R: Rng + ?Sized>(rng: &mut R, alpha: f64, beta: f64) -> f64 {
    if !(alpha.is_finite() && beta.is_finite()) || alpha <= 0.0 || beta <= 0.0 {
        return 0.5;
    }
    match Beta::new(alpha, beta) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.5,
    }
}

/// Select the top `k` categories over every arm.
///
/// Returns exactly `min(k, number of categories)` distinct categories.
pub fn select_top_k<R: Rng + ?Sized>(
    state: &UserBanditState,
    context: &Context,
    k: usize,
    cfg: SelectorConfig,
    rng: &mut R,
) -> Selection {
    select_top_k_among(state, context, &Category::ALL, k, cfg, rng)
}

/// Select the top `k` categories restricted to `available`.
///
/// Duplicates in `available` are ignored.  Cold start is judged over the
/// restricted set.
pub fn select_top_k_among<R: Rng + ?Sized>(
    state: &UserBanditState,
    context: &Context,
    available: &[Category],
    k: usize,
    cfg: SelectorConfig,
    rng: &mut R,
) -> Selection {
    let table = state.table(context.arm_table());
    let arms: Vec<(Category, ArmStats)> = available
        .iter()
        .copied()
        .collect::<BTreeSet<Category>>()
        .into_iter()
        .map(|c| (c, table.get(&c).copied().unwrap_or_default()))
        .collect();
    let k = k.min(arms.len());

    let min_pulls = arms.iter().map(|(_, s)| s.total_pulls).min().unwrap_or(0);
    let cold = !arms.is_empty() && min_pulls < cfg.cold_start_threshold;
    if cold && rng.random::<f64>() < cfg.epsilon() {
        let categories = explore_least_pulled(&arms, k);
        debug!(?categories, min_pulls, "cold-start exploration");
        return Selection {
            categories,
            mode: SelectionMode::ColdStartExplore,
            samples: None,
        };
    }

    let mut draws: Vec<(Category, f64)> = arms
        .iter()
        .map(|&(c, s)| (c, sample_beta(rng, s.alpha, s.beta)))
        .collect();
    // Arms are already in name order; a stable sort keeps that order on equal draws.
    draws.sort_by(|a, b| b.1.total_cmp(&a.1));
    let categories: Vec<Category> = draws.iter().take(k).map(|&(c, _)| c).collect();
    debug!(?categories, "thompson selection");
    Selection {
        categories,
        mode: SelectionMode::Thompson,
        samples: Some(draws.into_iter().collect::<BTreeMap<_, _>>()),
    }
}

/// `k` least-pulled arms; `arms` must be in name order (stable sort keeps it on ties).
fn explore_least_pulled(arms: &[(Category, ArmStats)], k: usize) -> Vec<Category> {
    let mut by_pulls: Vec<(Category, u64)> =
        arms.iter().map(|&(c, s)| (c, s.total_pulls)).collect();
    by_pulls.sort_by_key(|&(_, pulls)| pulls);
    by_pulls.into_iter().take(k).map(|(c, _)| c).collect()
}
