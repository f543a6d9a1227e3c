//! `recipe-cmab`: per-user contextual bandit for ranking recipe categories.
//!
//! Each user gets one Beta-Bernoulli arm per recipe category.  Feedback on a
//! recommended recipe (cooked, upvote, downvote, skip, ignored) is mapped to a
//! reward in `[0, 1]` and folded into that category's arm; selection draws from
//! each arm's posterior and returns the top-k categories, which then receive a
//! bounded boost when ranking candidate recipes.
//!
//! **Pipeline:**
//!
//! ```text
//!   inventory + clock ──► extract_context ──► Context
//!                                               │
//!   UserBanditState ──► select_top_k ───────────┴──► Selection (top-k categories)
//!                                                        │
//!   candidate recipes ──► classify ──► rank_candidates ◄─┘ ──► Vec<RankedRecipe>
//!
//!   user feedback ──► classify ──► apply_feedback ──► UserBanditState ──► BanditStore
//! ```
//!
//! **Reward mapping** (raw, normalized by `(raw + 1) / 3`):
//!
//! | feedback   | raw  | normalized |
//! |------------|------|------------|
//! | `cooked`   | 2.0  | 1.0        |
//! | `upvote`   | 1.0  | 0.667      |
//! | `skip`     | 0.0  | 0.333      |
//! | `ignored`  | 0.0  | 0.333      |
//! | `downvote` | -1.0 | 0.0        |
//!
//! The arm update is `alpha += r`, `beta += 1 - r`, so every event adds exactly
//! one pseudo-observation.
//!
//! **Selection policies:**
//! - Cold start (some arm has fewer than `cold_start_threshold` pulls): with
//!   probability `epsilon`, return the least-pulled arms (ties by name).
//! - Otherwise: Thompson sampling, one `Beta(alpha, beta)` draw per arm, top-k by
//!   draw.
//!
//! Both are seedable: pass a seeded RNG to [`select_top_k`], or a seed in
//! [`ManagerConfig`].
//!
//! **Building blocks:**
//! - [`classify`] / [`Category`]: deterministic recipe → category mapping.
//! - [`extract_context`] / [`Context`]: inventory and clock features.  Context is
//!   computed and carried, but every context shares one global arm table.
//! - [`apply_feedback`] / [`FeedbackType`]: the reward law.
//! - [`select_top_k`] / [`select_top_k_among`]: category selection.
//! - [`rank_candidates`] / [`BoostConfig`]: bounded boost and deterministic ranking.
//! - [`PreferenceSummary`]: posterior means and confidence intervals per arm.
//! - [`BanditStore`]: async persistence seam ([`InMemoryStore`], [`JsonFileStore`]).
//! - [`CmabManager`]: per-user caching, locking and background write-back.
//!
//! **Non-goals:**
//! - No per-context arm tables (contexts are not used to partition statistics).
//! - No recipe search or base scoring; candidate scores come from the caller.
//! - No HTTP surface.

#![forbid(unsafe_code)]

mod category;
pub use category::*;

mod arm;
pub use arm::*;

mod context;
pub use context::*;

mod reward;
pub use reward::*;

mod decision;
pub use decision::*;

mod thompson;
pub use thompson::*;

mod scorer;
pub use scorer::*;

mod summary;
pub use summary::*;

pub mod error;
pub use error::{CmabError, StoreError};

mod store;
pub use store::*;

mod manager;
pub use manager::*;
