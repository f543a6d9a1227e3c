//! Request-scoped context features.
//!
//! [`extract_context`] is pure: it never reads the system clock, so the same
//! inventory and timestamp always produce the same [`Context`].
//!
//! Selection does not condition on context yet.  The only thing it asks is
//! [`Context::arm_table`], which always answers [`ArmTable::Global`]; that is
//! the seam for context-partitioned arm tables.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::collections::BTreeSet;

use crate::ArmTable;

/// One inventory item as seen by the extractor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InventoryItem {
    pub name: String,
    /// Item category (e.g. "dairy"); the normalized name stands in when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            expires_at: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    fn kind(&self) -> String {
        self.category
            .as_deref()
            .unwrap_or(&self.name)
            .trim()
            .to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Morning [5,11), afternoon [11,17), evening [17,22), night otherwise.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => TimeOfDay::Morning,
            11..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

/// Context extraction knobs.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Items expiring within this many days (inclusive) count as expiring.
    ///
    /// The window is an exact duration `[now, now + days]`. Items already
    /// past their expiry are not counted, and neither are items a few hours
    /// beyond the last whole day; a whole-day `days_until <= N` rule would
    /// count both.
    pub expiry_horizon_days: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            expiry_horizon_days: 3,
        }
    }
}

/// Feature snapshot for one recommendation request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Context {
    pub has_expiring_items: bool,
    pub expiring_count: u32,
    /// `[0, 1]`: 0 for an empty or single-kind inventory.
    pub inventory_diversity: f64,
    pub time_of_day: TimeOfDay,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u8,
    pub is_weekend: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            has_expiring_items: false,
            expiring_count: 0,
            inventory_diversity: 0.0,
            time_of_day: TimeOfDay::Evening,
            day_of_week: 0,
            is_weekend: false,
        }
    }
}

impl Context {
    /// Arm table selection should read for this context.
    pub fn arm_table(&self) -> ArmTable {
        ArmTable::Global
    }

    /// Fixed-length numeric encoding:
    /// `[has_expiring, expiring_count / 10, diversity, is_morning, is_evening, is_weekend]`.
    pub fn feature_vector(&self) -> [f64; 6] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            flag(self.has_expiring_items),
            f64::from(self.expiring_count) / 10.0,
            self.inventory_diversity,
            flag(self.time_of_day == TimeOfDay::Morning),
            flag(self.time_of_day == TimeOfDay::Evening),
            flag(self.is_weekend),
        ]
    }
}

/// Derive a [`Context`] from an inventory snapshot and a caller-supplied clock.
///
/// Time-of-day and weekday come from `now` in its own timezone; expiry is
/// compared in absolute time.
pub fn extract_context<Tz: TimeZone>(
    inventory: &[InventoryItem],
    now: &DateTime<Tz>,
    cfg: ContextConfig,
) -> Context {
    let now_utc = now.with_timezone(&Utc);
    let horizon = chrono::Duration::days(i64::from(cfg.expiry_horizon_days));

    let expiring_count = inventory
        .iter()
        .filter_map(|it| it.expires_at)
        .filter(|&at| {
            let left = at - now_utc;
            left >= chrono::Duration::zero() && left <= horizon
        })
        .count();
    let expiring_count = u32::try_from(expiring_count).unwrap_or(u32::MAX);

    let kinds: BTreeSet<String> = inventory
        .iter()
        .map(InventoryItem::kind)
        .filter(|k| !k.is_empty())
        .collect();
    let inventory_diversity = if kinds.len() <= 1 {
        0.0
    } else {
        1.0 - 1.0 / kinds.len() as f64
    };

    let day_of_week = now.weekday().num_days_from_monday() as u8;
    Context {
        has_expiring_items: expiring_count > 0,
        expiring_count,
        inventory_diversity,
        time_of_day: TimeOfDay::from_hour(now.hour()),
        day_of_week,
        is_weekend: day_of_week >= 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn empty_inventory() {
        // 2024-06-01 is a Saturday.
        let ctx = extract_context(&[], &at(2024, 6, 1, 8), ContextConfig::default());
        assert!(!ctx.has_expiring_items);
        assert_eq!(ctx.expiring_count, 0);
        assert_eq!(ctx.inventory_diversity, 0.0);
        assert_eq!(ctx.time_of_day, TimeOfDay::Morning);
        assert_eq!(ctx.day_of_week, 5);
        assert!(ctx.is_weekend);
    }

    #[test]
    fn counts_items_inside_expiry_horizon_only() {
        let now = at(2024, 6, 3, 12);
        let inv = vec![
            InventoryItem::new("chicken").expiring_at(now + Duration::days(1)),
            InventoryItem::new("lettuce").expiring_at(now + Duration::days(3)),
            InventoryItem::new("rice").expiring_at(now + Duration::days(30)),
            InventoryItem::new("milk").expiring_at(now - Duration::days(2)),
            InventoryItem::new("salt"),
        ];
        let ctx = extract_context(&inv, &now, ContextConfig::default());
        assert_eq!(ctx.expiring_count, 2);
        assert!(ctx.has_expiring_items);
        assert_eq!(ctx.time_of_day, TimeOfDay::Afternoon);
        assert_eq!(ctx.day_of_week, 0);
        assert!(!ctx.is_weekend);
    }

    #[test]
    fn expiry_window_is_an_exact_duration() {
        let now = at(2024, 6, 3, 12);
        let inv = vec![
            InventoryItem::new("yogurt").expiring_at(now),
            InventoryItem::new("eggs").expiring_at(now + Duration::days(3)),
            InventoryItem::new("bread").expiring_at(now - Duration::hours(1)),
            InventoryItem::new("butter").expiring_at(now + Duration::days(3) + Duration::hours(1)),
        ];
        let ctx = extract_context(&inv, &now, ContextConfig::default());
        assert_eq!(ctx.expiring_count, 2);

        let wider = ContextConfig {
            expiry_horizon_days: 4,
        };
        assert_eq!(extract_context(&inv, &now, wider).expiring_count, 3);
    }

    #[test]
    fn diversity_grows_with_distinct_kinds() {
        let now = at(2024, 6, 3, 12);
        let cfg = ContextConfig::default();
        let one = vec![
            InventoryItem::new("milk").with_category("dairy"),
            InventoryItem::new("cheese").with_category("Dairy"),
        ];
        assert_eq!(extract_context(&one, &now, cfg).inventory_diversity, 0.0);

        let two = vec![
            InventoryItem::new("milk").with_category("dairy"),
            InventoryItem::new("apple").with_category("produce"),
        ];
        let d2 = extract_context(&two, &now, cfg).inventory_diversity;
        assert!((d2 - 0.5).abs() < 1e-12);

        let many: Vec<InventoryItem> = (0..10)
            .map(|i| InventoryItem::new(format!("item{i}")))
            .collect();
        let d10 = extract_context(&many, &now, cfg).inventory_diversity;
        assert!(d10 > d2 && d10 < 1.0);
    }

    #[test]
    fn time_fields_use_the_supplied_timezone() {
        // 23:30 UTC Friday is 08:30 Saturday in UTC+9.
        let utc = Utc.with_ymd_and_hms(2024, 5, 31, 23, 30, 0).unwrap();
        let tokyo = utc.with_timezone(&FixedOffset::east_opt(9 * 3600).unwrap());

        let a = extract_context(&[], &utc, ContextConfig::default());
        assert_eq!(a.time_of_day, TimeOfDay::Night);
        assert!(!a.is_weekend);

        let b = extract_context(&[], &tokyo, ContextConfig::default());
        assert_eq!(b.time_of_day, TimeOfDay::Morning);
        assert!(b.is_weekend);
    }

    #[test]
    fn hour_buckets() {
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(22), TimeOfDay::Night);
    }

    #[test]
    fn feature_vector_layout() {
        let ctx = Context {
            has_expiring_items: true,
            expiring_count: 5,
            inventory_diversity: 0.25,
            time_of_day: TimeOfDay::Morning,
            day_of_week: 6,
            is_weekend: true,
        };
        assert_eq!(ctx.feature_vector(), [1.0, 0.5, 0.25, 1.0, 0.0, 1.0]);
        assert_eq!(ctx.arm_table(), ArmTable::Global);
    }
}
