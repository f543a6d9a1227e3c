//! Bounded category boost over externally computed match scores.
//!
//! Candidates whose category is in the selected set get `score * (1 + boost)`,
//! with `boost` clamped to `[0, MAX_BOOST]`; everything else keeps its base
//! score.  Ordering is fully deterministic: boosted score, then base score
//! (both descending), then recipe id ascending.

use std::cmp::Ordering;

use crate::{classify, Category, Recipe, Selection};

/// Ceiling on the multiplicative boost (+20%).
pub const MAX_BOOST: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    /// Multiplicative boost for selected categories, clamped to `[0, MAX_BOOST]`.
    pub boost: f64,
    /// Keep at most this many candidates after ranking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            boost: MAX_BOOST,
            limit: None,
        }
    }
}

impl BoostConfig {
    pub fn with_boost(mut self, boost: f64) -> Self {
        self.boost = boost;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn factor(&self) -> f64 {
        let b = if self.boost.is_finite() {
            self.boost.clamp(0.0, MAX_BOOST)
        } else {
            0.0
        };
        1.0 + b
    }
}

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RankedRecipe {
    pub recipe: Recipe,
    pub category: Category,
    pub base_score: f64,
    pub boosted_score: f64,
    pub boosted: bool,
}

fn sanitize(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Boost and rank candidates against a set of selected categories.
pub fn rank_candidates(
    candidates: Vec<Recipe>,
    selected: &[Category],
    cfg: BoostConfig,
) -> Vec<RankedRecipe> {
    let factor = cfg.factor();
    let mut ranked: Vec<RankedRecipe> = candidates
        .into_iter()
        .map(|recipe| {
            let category = classify(&recipe);
            let base_score = sanitize(recipe.base_score);
            let boosted = selected.contains(&category);
            let boosted_score = if boosted { base_score * factor } else { base_score };
            RankedRecipe {
                recipe,
                category,
                base_score,
                boosted_score,
                boosted,
            }
        })
        .collect();

    ranked.sort_by(ranking_order);
    if let Some(limit) = cfg.limit {
        ranked.truncate(limit);
    }
    ranked
}

/// [`rank_candidates`] for a [`Selection`].
pub fn rank_for_selection(
    candidates: Vec<Recipe>,
    selection: &Selection,
    cfg: BoostConfig,
) -> Vec<RankedRecipe> {
    rank_candidates(candidates, &selection.categories, cfg)
}

/// Ordering used by [`rank_candidates`], exposed for callers merging ranked lists.
pub fn ranking_order(a: &RankedRecipe, b: &RankedRecipe) -> Ordering {
    b.boosted_score
        .total_cmp(&a.boosted_score)
        .then_with(|| b.base_score.total_cmp(&a.base_score))
        .then_with(|| a.recipe.id.cmp(&b.recipe.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn r(id: u64, tag: &str, score: f64) -> Recipe {
        Recipe::new(id, format!("recipe {id}"))
            .with_tags([tag])
            .with_base_score(score)
    }

    #[test]
    fn selected_category_gets_bounded_boost() {
        let out = rank_candidates(
            vec![r(1, "italian", 50.0), r(2, "mexican", 55.0)],
            &[Category::Italian],
            BoostConfig::default(),
        );
        assert_eq!(out[0].recipe.id, 1);
        assert!((out[0].boosted_score - 60.0).abs() < 1e-9);
        assert!(out[0].boosted);
        assert_eq!(out[1].boosted_score, 55.0);
        assert!(!out[1].boosted);
    }

    #[test]
    fn boost_is_clamped_to_ceiling() {
        let cfg = BoostConfig::default().with_boost(5.0);
        let out = rank_candidates(vec![r(1, "italian", 10.0)], &[Category::Italian], cfg);
        assert!((out[0].boosted_score - 12.0).abs() < 1e-9);

        let cfg = BoostConfig::default().with_boost(-1.0);
        let out = rank_candidates(vec![r(1, "italian", 10.0)], &[Category::Italian], cfg);
        assert_eq!(out[0].boosted_score, 10.0);
    }

    #[test]
    fn ties_break_on_base_then_id() {
        // 48 * 1.125 == 54: boosted italian ties with unboosted 54.
        let out = rank_candidates(
            vec![r(9, "asian", 54.0), r(3, "italian", 48.0), r(4, "asian", 54.0)],
            &[Category::Italian],
            BoostConfig::default().with_boost(0.125),
        );
        let ids: Vec<u64> = out.iter().map(|x| x.recipe.id).collect();
        assert_eq!(ids, vec![4, 9, 3]);
    }

    #[test]
    fn limit_truncates_and_nan_scores_sink() {
        let out = rank_candidates(
            vec![r(1, "asian", f64::NAN), r(2, "asian", 1.0), r(3, "asian", 2.0)],
            &[],
            BoostConfig::default().with_limit(2),
        );
        let ids: Vec<u64> = out.iter().map(|x| x.recipe.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    proptest! {
        #[test]
        fn ranking_is_a_sorted_permutation(
            scores in proptest::collection::vec(0.0f64..100.0, 0..30),
            pick in 0usize..14,
        ) {
            let tags = ["italian", "thai", "mexican", "salad", "stew"];
            let cands: Vec<Recipe> = scores
                .iter()
                .enumerate()
                .map(|(i, &s)| r(i as u64, tags[i % tags.len()], s))
                .collect();
            let selected = [Category::ALL[pick]];
            let out = rank_candidates(cands.clone(), &selected, BoostConfig::default());
            prop_assert_eq!(out.len(), cands.len());
            for w in out.windows(2) {
                prop_assert!(ranking_order(&w[0], &w[1]) != Ordering::Greater);
            }
            for x in &out {
                prop_assert!(x.boosted_score >= x.base_score);
                prop_assert!(x.boosted_score <= x.base_score * (1.0 + MAX_BOOST) + 1e-9);
                prop_assert_eq!(x.boosted, selected.contains(&x.category));
            }
            let again = rank_candidates(cands, &selected, BoostConfig::default());
            prop_assert_eq!(out, again);
        }
    }
}
