//! Selection envelope returned by the bandit selector.
//!
//! A [`Selection`] records the chosen categories together with the policy path
//! that produced them, so callers can log or replay a decision without
//! re-deriving why it happened.

use std::collections::BTreeMap;

use crate::Category;

/// Which path of the selector produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Cold-start exploration: least-pulled arms, stable name order on ties.
    ColdStartExplore,
    /// Thompson sampling over the Beta posteriors.
    Thompson,
}

/// Top-k categories for one request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Selection {
    /// Chosen categories, best first. Always distinct.
    pub categories: Vec<Category>,
    pub mode: SelectionMode,
    /// Per-arm posterior draws (present for [`SelectionMode::Thompson`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<BTreeMap<Category, f64>>,
}

impl Selection {
    /// The highest-ranked category, if any.
    pub fn primary(&self) -> Option<Category> {
        self.categories.first().copied()
    }

    pub fn contains(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    /// 0-based rank of `category` within the selection.
    pub fn rank_of(&self, category: Category) -> Option<usize> {
        self.categories.iter().position(|&c| c == category)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
