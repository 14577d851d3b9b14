use crate::domain::models::RemovalState;
use chrono::{DateTime, Duration, Utc};

/// Run-based reconciliation: one cooldown step per recommendation cycle.
/// Entries that reach zero are deleted; their names are returned so the
/// caller can reset them to baseline for the next cycle.
pub fn decrement_cooldowns(removals: &mut RemovalState) -> Vec<String> {
    let mut expired = Vec::new();
    for (activity, entry) in removals.iter_mut() {
        entry.cooldown -= 1;
        if entry.cooldown <= 0 {
            expired.push(activity.clone());
        }
    }
    for activity in &expired {
        removals.lift(activity);
    }
    expired
}

/// Time-based reconciliation: activities suspended at least `threshold` ago,
/// whatever their remaining cooldown.
pub fn stale_removals(
    removals: &RemovalState,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Vec<String> {
    removals
        .iter()
        .filter(|(_, entry)| now - entry.removed_at >= threshold)
        .map(|(activity, _)| activity.clone())
        .collect()
}
