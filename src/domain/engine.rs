use crate::domain::models::{EngineState, FeedbackHistory, RecommendationHistory};
use crate::domain::selection::{self, Candidate, Optimizer};
use crate::domain::{removal, scoring};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Ok,
    /// Only one eligible activity; returned as-is.
    Degraded,
    /// Nothing eligible at all.
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub status: CycleStatus,
    /// Feedback queue, in the order activities should be rated.
    pub selected: Vec<String>,
    pub scores: Vec<(String, f64)>,
    /// Suspended this cycle because of poor ratings.
    pub flagged: Vec<String>,
    /// Cooldown ran out this cycle; scored at baseline from the next one.
    pub restored: Vec<String>,
    pub used_fallback: bool,
}

#[derive(Clone)]
pub struct RecommendationEngine {
    activities: Vec<String>,
    optimizer: Arc<dyn Optimizer>,
}

impl RecommendationEngine {
    pub fn new(activities: Vec<String>, optimizer: Arc<dyn Optimizer>) -> Self {
        Self {
            activities,
            optimizer,
        }
    }

    pub fn activities(&self) -> &[String] {
        &self.activities
    }

    pub fn knows(&self, activity: &str) -> bool {
        self.activities.iter().any(|a| a == activity)
    }

    /// One recommendation cycle: score eligible activities, select from the
    /// survivors, then advance every cooldown by one step.
    pub fn run_cycle(&self, mut state: EngineState, now: DateTime<Utc>) -> (EngineState, CycleOutcome) {
        let mut scores = Vec::new();
        let mut flagged = Vec::new();
        let empty = FeedbackHistory::default();

        for activity in &self.activities {
            if state.removals.contains(activity) {
                continue;
            }
            let history = state.feedback.get(activity).unwrap_or(&empty);
            match scoring::adjust_score(activity, history, &mut state.removals, now) {
                Some(score) => scores.push((activity.clone(), score)),
                None => flagged.push(activity.clone()),
            }
        }

        let candidates: Vec<Candidate> = scores
            .iter()
            .map(|(activity, score)| Candidate {
                activity: activity.clone(),
                score: *score,
                penalty: selection::penalty(
                    state.feedback.get(activity).and_then(|h| h.mean()),
                    state.removals.contains(activity),
                ),
                recently_recommended: state.recent.contains(activity),
            })
            .collect();

        let (status, selected, used_fallback) =
            match selection::select(&candidates, self.optimizer.as_ref()) {
                Ok(selection) => (CycleStatus::Ok, selection.activities, selection.used_fallback),
                Err(err) => {
                    tracing::warn!("{}, skipping optimization", err);
                    let status = if candidates.is_empty() {
                        CycleStatus::Unavailable
                    } else {
                        CycleStatus::Degraded
                    };
                    let remaining = candidates.into_iter().map(|c| c.activity).collect();
                    (status, remaining, false)
                }
            };

        let restored = removal::decrement_cooldowns(&mut state.removals);
        for activity in &restored {
            tracing::info!("Cooldown finished for {}, restoring to baseline", activity);
            if let Some(history) = state.feedback.get_mut(activity) {
                history.neutralize();
            }
        }

        state.recent = RecommendationHistory::new(selected.iter().cloned());

        let outcome = CycleOutcome {
            status,
            selected,
            scores,
            flagged,
            restored,
            used_fallback,
        };
        (state, outcome)
    }
}
