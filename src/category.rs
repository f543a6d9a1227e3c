//! Recipe categories (the bandit's arms) and the keyword classifier.
//!
//! The arm set is closed: 13 recognized categories plus the [`Category::General`]
//! catch-all.  Anything that cannot be classified lands in the catch-all, so
//! classification never fails.
//!
//! Ordering is alphabetical by name.  Every stable tie-break in this crate
//! (cold-start exploration, equal Thompson samples, equal preference scores)
//! uses this order.

use std::cmp::Ordering;
use std::fmt;

/// A recipe category tracked as one bandit arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Italian,
    Asian,
    Mexican,
    American,
    Mediterranean,
    Indian,
    QuickMeals,
    Healthy,
    ComfortFood,
    Vegetarian,
    Desserts,
    Breakfast,
    Salads,
    /// Catch-all for recipes no keyword matched.
    General,
}

impl Category {
    /// Every arm, in declaration order.
    pub const ALL: [Category; 14] = [
        Category::Italian,
        Category::Asian,
        Category::Mexican,
        Category::American,
        Category::Mediterranean,
        Category::Indian,
        Category::QuickMeals,
        Category::Healthy,
        Category::ComfortFood,
        Category::Vegetarian,
        Category::Desserts,
        Category::Breakfast,
        Category::Salads,
        Category::General,
    ];

    /// Stable wire name (also the persisted document key).
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Italian => "italian",
            Category::Asian => "asian",
            Category::Mexican => "mexican",
            Category::American => "american",
            Category::Mediterranean => "mediterranean",
            Category::Indian => "indian",
            Category::QuickMeals => "quick_meals",
            Category::Healthy => "healthy",
            Category::ComfortFood => "comfort_food",
            Category::Vegetarian => "vegetarian",
            Category::Desserts => "desserts",
            Category::Breakfast => "breakfast",
            Category::Salads => "salads",
            Category::General => "general",
        }
    }

    /// Strict lookup by wire name (case-insensitive, surrounding whitespace ignored).
    pub fn from_name(name: &str) -> Option<Category> {
        let n = name.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(n))
    }

    /// Lossy lookup: unknown names map to [`Category::General`].
    pub fn parse_lossy(name: &str) -> Category {
        Category::from_name(name).unwrap_or(Category::General)
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered keyword table: first keyword that is a substring of a tag wins.
///
/// Cuisine keywords come before dish-type keywords so that e.g. `"thai curry"`
/// resolves to `asian` rather than `indian`.
const KEYWORDS: &[(&str, Category)] = &[
    ("italian", Category::Italian),
    ("pasta", Category::Italian),
    ("pizza", Category::Italian),
    ("chinese", Category::Asian),
    ("japanese", Category::Asian),
    ("thai", Category::Asian),
    ("korean", Category::Asian),
    ("vietnamese", Category::Asian),
    ("asian", Category::Asian),
    ("mexican", Category::Mexican),
    ("tex-mex", Category::Mexican),
    ("indian", Category::Indian),
    ("curry", Category::Indian),
    ("mediterranean", Category::Mediterranean),
    ("greek", Category::Mediterranean),
    ("middle eastern", Category::Mediterranean),
    ("american", Category::American),
    ("southern", Category::American),
    ("cajun", Category::American),
    ("breakfast", Category::Breakfast),
    ("brunch", Category::Breakfast),
    ("dessert", Category::Desserts),
    ("sweet", Category::Desserts),
    ("baking", Category::Desserts),
    ("salad", Category::Salads),
    ("quick", Category::QuickMeals),
    ("vegetarian", Category::Vegetarian),
    ("vegan", Category::Vegetarian),
    ("healthy", Category::Healthy),
    ("low calorie", Category::Healthy),
    ("comfort", Category::ComfortFood),
    ("casserole", Category::ComfortFood),
    ("stew", Category::ComfortFood),
];

/// Title keywords that mark a recipe as healthy when no tag matched.
const HEALTH_TITLE_KEYWORDS: &[&str] = &["healthy", "light", "fitness", "low calorie"];

/// Recipes ready within this many minutes classify as quick meals (tag-less fallback).
pub const QUICK_MEAL_MAX_MINUTES: u32 = 30;

/// A candidate recipe as handed over by the content provider.
///
/// `base_score` is the externally computed match score; this crate only boosts it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Recipe {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// Cuisine / dish-type strings, in provider order.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_in_minutes: Option<u32>,
    #[serde(default)]
    pub vegetarian: bool,
    #[serde(default)]
    pub base_score: f64,
}

impl Recipe {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_base_score(mut self, score: f64) -> Self {
        self.base_score = score;
        self
    }

    pub fn with_ready_in_minutes(mut self, minutes: u32) -> Self {
        self.ready_in_minutes = Some(minutes);
        self
    }

    pub fn with_vegetarian(mut self, vegetarian: bool) -> Self {
        self.vegetarian = vegetarian;
        self
    }

    /// Shorthand for [`classify`].
    pub fn category(&self) -> Category {
        classify(self)
    }
}

/// Resolve a single tag via the keyword table.
pub fn classify_tag(tag: &str) -> Option<Category> {
    let t = tag.trim().to_lowercase();
    if t.is_empty() {
        return None;
    }
    KEYWORDS
        .iter()
        .find(|(kw, _)| t.contains(kw))
        .map(|&(_, c)| c)
}

/// Resolve a recipe to exactly one category.
///
/// Tags are scanned in order and the first tag with a keyword hit decides.
/// Without any tag hit, the recipe's ready time, vegetarian flag and title are
/// consulted (in that order) before falling back to [`Category::General`].
pub fn classify(recipe: &Recipe) -> Category {
    if let Some(c) = recipe.tags.iter().find_map(|t| classify_tag(t)) {
        return c;
    }
    if recipe
        .ready_in_minutes
        .is_some_and(|m| m <= QUICK_MEAL_MAX_MINUTES)
    {
        return Category::QuickMeals;
    }
    if recipe.vegetarian {
        return Category::Vegetarian;
    }
    let title = recipe.title.to_lowercase();
    if HEALTH_TITLE_KEYWORDS.iter().any(|kw| title.contains(kw)) {
        return Category::Healthy;
    }
    Category::General
}
