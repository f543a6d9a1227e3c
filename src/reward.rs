//! Feedback → reward mapping and the Bayesian arm update.
//!
//! Raw rewards live in `[-1, 2]` and are rescaled onto `[0, 1]` as a
//! fractional success:
//!
//! ```text
//! r'     = (raw + 1) / 3
//! alpha += r'
//! beta  += 1 - r'
//! ```

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::{ArmStats, Category, UserBanditState};

/// User feedback on a shown recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Cooked,
    Upvote,
    Downvote,
    Skip,
    Ignored,
}

impl FeedbackType {
    pub const ALL: [FeedbackType; 5] = [
        FeedbackType::Cooked,
        FeedbackType::Upvote,
        FeedbackType::Downvote,
        FeedbackType::Skip,
        FeedbackType::Ignored,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackType::Cooked => "cooked",
            FeedbackType::Upvote => "upvote",
            FeedbackType::Downvote => "downvote",
            FeedbackType::Skip => "skip",
            FeedbackType::Ignored => "ignored",
        }
    }

    /// Fixed raw reward table.
    pub fn raw_reward(self) -> f64 {
        match self {
            FeedbackType::Cooked => 2.0,
            FeedbackType::Upvote => 1.0,
            FeedbackType::Downvote => -1.0,
            FeedbackType::Skip | FeedbackType::Ignored => 0.0,
        }
    }

    /// Raw reward rescaled onto `[0, 1]`.
    pub fn normalized_reward(self) -> f64 {
        normalize_reward(self.raw_reward())
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown feedback type string. Rejected at the boundary, never coerced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feedback type '{0}' (expected cooked, upvote, downvote, skip or ignored)")]
pub struct FeedbackParseError(pub String);

impl FromStr for FeedbackType {
    type Err = FeedbackParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        FeedbackType::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| FeedbackParseError(s.to_string()))
    }
}

/// `(raw + 1) / 3`, clamped to `[0, 1]`.
pub fn normalize_reward(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    ((raw + 1.0) / 3.0).clamp(0.0, 1.0)
}

/// A classified feedback event.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeedbackEvent {
    pub user_id: String,
    pub recipe_id: u64,
    pub feedback_type: FeedbackType,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
}

impl ArmStats {
    /// Apply one feedback to this arm.
    pub fn apply(&mut self, feedback: FeedbackType) {
        let r = feedback.normalized_reward();
        self.alpha += r;
        self.beta += 1.0 - r;
        self.total_pulls = self.total_pulls.saturating_add(1);
        self.total_reward += feedback.raw_reward();
        match feedback {
            FeedbackType::Cooked => self.cooked_count = self.cooked_count.saturating_add(1),
            FeedbackType::Upvote => self.upvote_count = self.upvote_count.saturating_add(1),
            FeedbackType::Downvote => {
                self.downvote_count = self.downvote_count.saturating_add(1)
            }
            FeedbackType::Skip | FeedbackType::Ignored => {}
        }
    }
}

/// Apply feedback for a category name; unknown names go to [`Category::General`].
///
/// Returns the arm's statistics after the update.
pub fn apply_feedback(
    state: &mut UserBanditState,
    category: &str,
    feedback: FeedbackType,
) -> ArmStats {
    apply_feedback_at(state, Category::parse_lossy(category), feedback, Utc::now())
}

/// Typed variant of [`apply_feedback`] with an explicit timestamp.
pub fn apply_feedback_at(
    state: &mut UserBanditState,
    category: Category,
    feedback: FeedbackType,
    at: DateTime<Utc>,
) -> ArmStats {
    let arm = state.arm_mut(category);
    arm.apply(feedback);
    let out = *arm;
    state.touch(at);
    out
}
