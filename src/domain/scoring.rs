use crate::domain::models::{FeedbackHistory, RemovalState, MAX_MOOD, MIN_MOOD};
use chrono::{DateTime, Utc};

pub const BASELINE_SCORE: f64 = 5.0;
pub const RECENT_WINDOW: usize = 3;
/// Ratings at or below this are poor.
pub const POOR_RATING: i16 = 2;
pub const POOR_RATINGS_TO_SUSPEND: usize = 2;
/// Recommendation cycles a flagged activity stays suspended.
pub const SUSPENSION_COOLDOWN: i32 = 7;

const LOW_AVERAGE: f64 = 3.0;
const HIGH_AVERAGE: f64 = 8.0;
const LOW_PENALTY: f64 = 15.0;
const SCORE_FLOOR: f64 = -10.0;
const HIGH_BOOST: f64 = 5.0;
const SLOPE: f64 = 0.5;

pub fn clamp_average(avg: f64) -> f64 {
    if avg.is_nan() {
        return BASELINE_SCORE;
    }
    avg.clamp(MIN_MOOD as f64, MAX_MOOD as f64)
}

/// Maps a recent-window average onto an adjusted score. Non-decreasing in `avg`.
pub fn score_for_average(avg: f64) -> f64 {
    let avg = clamp_average(avg);
    if avg <= LOW_AVERAGE {
        (BASELINE_SCORE - LOW_PENALTY).max(SCORE_FLOOR)
    } else if avg >= HIGH_AVERAGE {
        BASELINE_SCORE + HIGH_BOOST
    } else {
        BASELINE_SCORE + (avg - BASELINE_SCORE) * SLOPE
    }
}

/// Adjusted score for `activity`, or `None` when its recent ratings flag it
/// for suspension. Flagging inserts (or overwrites) its removal entry with a
/// fresh [`SUSPENSION_COOLDOWN`].
pub fn adjust_score(
    activity: &str,
    history: &FeedbackHistory,
    removals: &mut RemovalState,
    now: DateTime<Utc>,
) -> Option<f64> {
    let window = history.window(RECENT_WINDOW);
    if window.is_empty() {
        return Some(BASELINE_SCORE);
    }

    let poor = window.iter().filter(|&&score| score <= POOR_RATING).count();
    if poor >= POOR_RATINGS_TO_SUSPEND {
        tracing::info!(
            "Suspending {} for {} cycles after {} poor ratings",
            activity,
            SUSPENSION_COOLDOWN,
            poor
        );
        removals.suspend(activity, SUSPENSION_COOLDOWN, now);
        return None;
    }

    let total: f64 = window.iter().map(|&score| score as f64).sum();
    Some(score_for_average(total / window.len() as f64))
}
