//! The authoritative set of currently configured severity levels.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::ports::SeverityStore;

const LEVELS_SQL: &str = "SELECT level, label FROM scada.severity_level ORDER BY level";

/// Snapshot of valid severity levels, ordered ascending by level.
///
/// "Valid" means membership in this snapshot at evaluation time; the live
/// pre-write staleness check in the remap engine is the only later re-check.
#[derive(Debug, Clone, Default)]
pub struct SeverityRegistry {
    levels: BTreeMap<i64, String>,
}

impl SeverityRegistry {
    /// Load the configured levels from the store.
    pub async fn load(store: &dyn SeverityStore) -> Result<Self> {
        let mut levels = BTreeMap::new();
        for cells in store.run_query(LEVELS_SQL).await? {
            let (Some(level), Some(label)) = (
                cells.first().and_then(|c| c.coerce_i64()),
                cells.get(1).and_then(|c| c.as_str()),
            ) else {
                continue;
            };
            levels.insert(level, label.to_string());
        }
        Ok(Self::with_sentinel(levels))
    }

    /// Build a registry from explicit levels. Test and tooling constructor.
    pub fn from_levels<I>(levels: I) -> Self
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        Self::with_sentinel(levels.into_iter().collect())
    }

    fn with_sentinel(mut levels: BTreeMap<i64, String>) -> Self {
        // 0 is the "no severity" sentinel and must never read as invalid,
        // whether or not the store lists it.
        levels.entry(0).or_insert_with(|| "None".to_string());
        Self { levels }
    }

    pub fn contains(&self, level: i64) -> bool {
        self.levels.contains_key(&level)
    }

    pub fn label(&self, level: i64) -> Option<&str> {
        self.levels.get(&level).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels ascending.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.levels.iter().map(|(level, label)| (*level, label.as_str()))
    }

    /// The greatest level strictly below `v` — the automatic remap target.
    ///
    /// Nonzero levels are preferred; 0 is chosen only when it is the sole
    /// level below `v`. `None` when nothing lies below `v`.
    pub fn next_lower(&self, v: i64) -> Option<i64> {
        let mut zero_below = false;
        for (&level, _) in self.levels.range(..v).rev() {
            if level == 0 {
                zero_below = true;
                continue;
            }
            return Some(level);
        }
        if zero_below {
            Some(0)
        } else {
            None
        }
    }
}
