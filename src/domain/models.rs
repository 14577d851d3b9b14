use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lowest and highest rating the feedback slider can produce.
pub const MIN_MOOD: i16 = 1;
pub const MAX_MOOD: i16 = 10;
/// Rating written back when a suspended activity is restored.
pub const NEUTRAL_MOOD: i16 = 5;

/// How many past recommendations are consulted for the repeat penalty.
pub const RECOMMENDATION_HISTORY_DEPTH: usize = 5;

pub const DEFAULT_ACTIVITIES: [&str; 5] = [
    "Meditation",
    "Journaling",
    "Breathing Exercise",
    "Music",
    "Walking",
];

pub fn clamp_mood(value: i16) -> i16 {
    value.clamp(MIN_MOOD, MAX_MOOD)
}

/// Chronological mood ratings for one activity, most recent last.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackHistory {
    scores: Vec<i16>,
}

impl FeedbackHistory {
    pub fn new(scores: impl IntoIterator<Item = i16>) -> Self {
        Self {
            scores: scores.into_iter().map(clamp_mood).collect(),
        }
    }

    pub fn push(&mut self, score: i16) {
        self.scores.push(clamp_mood(score));
    }

    /// Drops the oldest ratings until at most `depth` remain.
    pub fn keep_last(&mut self, depth: usize) {
        let excess = self.scores.len().saturating_sub(depth);
        self.scores.drain(..excess);
    }

    pub fn scores(&self) -> &[i16] {
        &self.scores
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// The last `size` ratings (fewer if the history is shorter).
    pub fn window(&self, size: usize) -> &[i16] {
        let start = self.scores.len().saturating_sub(size);
        &self.scores[start..]
    }

    pub fn mean(&self) -> Option<f64> {
        mean(&self.scores)
    }

    /// Rewrites every rating to the neutral score, keeping the length.
    pub fn neutralize(&mut self) {
        for score in &mut self.scores {
            *score = NEUTRAL_MOOD;
        }
    }
}

pub fn mean(values: &[i16]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let total: f64 = values.iter().map(|&v| v as f64).sum();
    Some(total / values.len() as f64)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovalEntry {
    /// Remaining recommendation cycles; strictly positive while present.
    pub cooldown: i32,
    pub removed_at: DateTime<Utc>,
}

/// Suspended activities. An activity is removed iff it has an entry here.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovalState {
    entries: BTreeMap<String, RemovalEntry>,
}

impl RemovalState {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, RemovalEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Inserts or overwrites the entry for `activity`.
    pub fn suspend(&mut self, activity: &str, cooldown: i32, removed_at: DateTime<Utc>) {
        self.entries.insert(
            activity.to_string(),
            RemovalEntry {
                cooldown,
                removed_at,
            },
        );
    }

    /// Deletes the entry, returning it when one existed.
    pub fn lift(&mut self, activity: &str) -> Option<RemovalEntry> {
        self.entries.remove(activity)
    }

    pub fn contains(&self, activity: &str) -> bool {
        self.entries.contains_key(activity)
    }

    pub fn get(&self, activity: &str) -> Option<&RemovalEntry> {
        self.entries.get(activity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RemovalEntry)> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut RemovalEntry)> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The most recent selection, most recent first, bounded to
/// [`RECOMMENDATION_HISTORY_DEPTH`] entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecommendationHistory {
    recent: Vec<String>,
}

impl RecommendationHistory {
    pub fn new(recent: impl IntoIterator<Item = String>) -> Self {
        Self {
            recent: recent
                .into_iter()
                .take(RECOMMENDATION_HISTORY_DEPTH)
                .collect(),
        }
    }

    pub fn contains(&self, activity: &str) -> bool {
        self.recent.iter().any(|a| a == activity)
    }

    pub fn activities(&self) -> &[String] {
        &self.recent
    }
}

/// Everything a recommendation cycle reads and writes. Passed into and
/// returned from each cycle instead of living in process-wide state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineState {
    pub feedback: BTreeMap<String, FeedbackHistory>,
    pub removals: RemovalState,
    pub recent: RecommendationHistory,
}

impl EngineState {
    pub fn history(&self, activity: &str) -> Option<&FeedbackHistory> {
        self.feedback.get(activity)
    }

    /// Appends a rating, keeping only the last `depth` for the activity.
    pub fn record_feedback(&mut self, activity: &str, score: i16, depth: usize) {
        let history = self.feedback.entry(activity.to_string()).or_default();
        history.push(score);
        history.keep_last(depth);
    }

    /// Lifts the suspension of `activity` and neutralizes its ratings so the
    /// next cycle scores it at baseline. Returns false when it was not removed.
    pub fn restore(&mut self, activity: &str) -> bool {
        if self.removals.lift(activity).is_none() {
            return false;
        }
        if let Some(history) = self.feedback.get_mut(activity) {
            history.neutralize();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_clamps_and_windows() {
        let mut history = FeedbackHistory::new([0, 4, 12]);
        assert_eq!(history.scores(), &[1, 4, 10]);

        history.push(7);
        assert_eq!(history.window(3), &[4, 10, 7]);
        assert_eq!(history.window(10), &[1, 4, 10, 7]);
        assert_eq!(FeedbackHistory::default().window(3), &[] as &[i16]);
    }

    #[test]
    fn test_recorded_feedback_stays_within_depth() {
        let mut state = EngineState::default();
        for score in 1..=8 {
            state.record_feedback("Walking", score, 5);
        }
        assert_eq!(state.history("Walking").unwrap().scores(), &[4, 5, 6, 7, 8]);

        let mut history = FeedbackHistory::new([3, 4]);
        history.keep_last(5);
        assert_eq!(history.scores(), &[3, 4]);
    }

    #[test]
    fn test_recommendation_history_is_bounded() {
        let names = (0..8).map(|i| format!("a{i}"));
        let history = RecommendationHistory::new(names);
        assert_eq!(history.activities().len(), RECOMMENDATION_HISTORY_DEPTH);
        assert!(history.contains("a0"));
        assert!(!history.contains("a7"));
    }

    #[test]
    fn test_restore_neutralizes_history() {
        let mut state = EngineState::default();
        state.feedback.insert("Music".into(), FeedbackHistory::new([1, 2, 1]));
        state.removals.suspend("Music", 3, Utc::now());

        assert!(state.restore("Music"));
        assert!(!state.removals.contains("Music"));
        assert_eq!(state.history("Music").unwrap().scores(), &[5, 5, 5]);

        // Not removed any more: a second restore is a no-op.
        assert!(!state.restore("Music"));
        assert!(!state.restore("Walking"));
    }
}
