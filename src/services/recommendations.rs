use crate::db::ActivityStore;
use crate::domain::engine::{CycleOutcome, RecommendationEngine};
use crate::domain::models::{
    clamp_mood, EngineState, RecommendationHistory, RECOMMENDATION_HISTORY_DEPTH,
};
use crate::error::EngineError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityStatus {
    pub name: String,
    pub removed: bool,
    pub cooldown: Option<i32>,
    pub removed_at: Option<DateTime<Utc>>,
    pub recent_scores: Vec<i16>,
    pub average: Option<f64>,
}

/// Owns the in-memory [`EngineState`] and keeps it in step with the store.
/// Every method persists before touching memory, so a storage failure leaves
/// the in-memory state as it was and the call can simply be retried.
pub struct RecommendationService {
    engine: RecommendationEngine,
    store: Arc<dyn ActivityStore>,
    state: Mutex<EngineState>,
    history_depth: usize,
    stale_after: Duration,
}

impl RecommendationService {
    /// Loads feedback, removals and the last recommendation from `store`.
    pub async fn load(
        engine: RecommendationEngine,
        store: Arc<dyn ActivityStore>,
        history_depth: usize,
        stale_after: Duration,
    ) -> Result<Self, EngineError> {
        let state = load_state(store.as_ref(), history_depth).await?;
        Ok(Self {
            engine,
            store,
            state: Mutex::new(state),
            history_depth,
            stale_after,
        })
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub async fn snapshot(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    /// Runs one cycle and persists its effects in a single transaction.
    pub async fn recommend(&self, now: DateTime<Utc>) -> Result<CycleOutcome, EngineError> {
        let mut state = self.state.lock().await;
        let (next, outcome) = self.engine.run_cycle(state.clone(), now);

        self.store
            .commit_cycle(&outcome.selected, &next.removals, &outcome.restored, now)
            .await?;

        tracing::info!(
            "Recommended {:?} (status {:?}, flagged {:?}, restored {:?})",
            outcome.selected,
            outcome.status,
            outcome.flagged,
            outcome.restored
        );
        *state = next;
        Ok(outcome)
    }

    /// Records one mood rating. Out-of-range ratings are clamped.
    pub async fn submit_feedback(
        &self,
        activity: &str,
        score: i16,
        now: DateTime<Utc>,
    ) -> Result<i16, EngineError> {
        if !self.engine.knows(activity) {
            return Err(EngineError::UnknownActivity(activity.to_string()));
        }
        let clamped = clamp_mood(score);
        if clamped != score {
            tracing::warn!("Clamped mood rating {} for {} to {}", score, activity, clamped);
        }

        let mut state = self.state.lock().await;
        self.store.save_mood_feedback(activity, clamped, now).await?;
        state.record_feedback(activity, clamped, self.history_depth);
        tracing::info!("Feedback for {} saved: {}", activity, clamped);
        Ok(clamped)
    }

    /// Time-based restoration of suspensions older than the configured
    /// threshold. Idempotent.
    pub async fn reconcile_stale_removals(&self, now: DateTime<Utc>) -> Result<Vec<String>, EngineError> {
        let mut state = self.state.lock().await;
        let restored = self
            .store
            .reconcile_stale_removals(self.stale_after, now)
            .await?;
        for activity in &restored {
            state.restore(activity);
        }
        if !restored.is_empty() {
            tracing::info!("Restored stale removals: {:?}", restored);
        }
        Ok(restored)
    }

    /// Drops in-memory state and reloads it from the store.
    pub async fn reload(&self) -> Result<(), EngineError> {
        let fresh = load_state(self.store.as_ref(), self.history_depth).await?;
        *self.state.lock().await = fresh;
        Ok(())
    }

    pub async fn activity_statuses(&self) -> Result<Vec<ActivityStatus>, EngineError> {
        let averages = self.store.feedback_averages().await?;
        let state = self.state.lock().await;

        let statuses = self
            .engine
            .activities()
            .iter()
            .map(|name| {
                let entry = state.removals.get(name);
                ActivityStatus {
                    name: name.clone(),
                    removed: entry.is_some(),
                    cooldown: entry.map(|e| e.cooldown),
                    removed_at: entry.map(|e| e.removed_at),
                    recent_scores: state
                        .history(name)
                        .map(|h| h.window(self.history_depth).to_vec())
                        .unwrap_or_default(),
                    average: averages.get(name).copied(),
                }
            })
            .collect();
        Ok(statuses)
    }
}

pub async fn load_state(store: &dyn ActivityStore, history_depth: usize) -> Result<EngineState, EngineError> {
    let feedback = store.get_mood_feedback(history_depth).await?;
    let removals = store.get_removed_activities().await?;
    let recent = store
        .get_recent_recommendations(RECOMMENDATION_HISTORY_DEPTH)
        .await?;

    Ok(EngineState {
        feedback: feedback.into_iter().collect(),
        removals,
        recent: RecommendationHistory::new(recent),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::tests::{allow_feedback_updates, memory_store, reject_feedback_updates};
    use crate::db::SqliteStore;
    use crate::domain::engine::CycleStatus;
    use crate::domain::models::DEFAULT_ACTIVITIES;
    use crate::domain::scoring::SUSPENSION_COOLDOWN;
    use crate::domain::selection::tests::{Exhaustive, FixedPoint};
    use crate::domain::selection::Optimizer;

    async fn service_with(
        optimizer: Arc<dyn Optimizer>,
    ) -> (RecommendationService, Arc<dyn ActivityStore>) {
        service_on(memory_store().await, optimizer).await
    }

    pub(crate) async fn service_on(
        sqlite: SqliteStore,
        optimizer: Arc<dyn Optimizer>,
    ) -> (RecommendationService, Arc<dyn ActivityStore>) {
        let store: Arc<dyn ActivityStore> = Arc::new(sqlite);
        let engine = RecommendationEngine::new(
            DEFAULT_ACTIVITIES.iter().map(|a| a.to_string()).collect(),
            optimizer,
        );
        let service = RecommendationService::load(engine, store.clone(), 5, Duration::days(7))
            .await
            .unwrap();
        (service, store)
    }

    #[tokio::test]
    async fn test_recommend_persists_selection() {
        let (service, store) = service_with(Arc::new(Exhaustive)).await;
        let outcome = service.recommend(Utc::now()).await.unwrap();

        assert_eq!(outcome.status, CycleStatus::Ok);
        assert!((2..=3).contains(&outcome.selected.len()));
        let mut saved = store.get_recent_recommendations(5).await.unwrap();
        saved.reverse();
        assert_eq!(saved, outcome.selected);
        assert!(store.get_removed_activities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_flows_into_next_cycle() {
        let (service, store) = service_with(Arc::new(FixedPoint(vec![1.0; 5]))).await;
        let now = Utc::now();
        for (days_ago, score) in [(2, 1), (1, 2), (0, 1)] {
            service
                .submit_feedback("Walking", score, now - Duration::days(days_ago))
                .await
                .unwrap();
        }

        let outcome = service.recommend(now).await.unwrap();
        assert_eq!(outcome.flagged, vec!["Walking".to_string()]);
        assert!(!outcome.selected.contains(&"Walking".to_string()));

        let removals = store.get_removed_activities().await.unwrap();
        assert_eq!(removals.get("Walking").unwrap().cooldown, SUSPENSION_COOLDOWN - 1);
    }

    #[tokio::test]
    async fn test_cooldown_expiry_neutralizes_stored_feedback() {
        let (service, store) = service_with(Arc::new(FixedPoint(vec![1.0; 5]))).await;
        let now = Utc::now();
        service.submit_feedback("Music", 2, now - Duration::days(1)).await.unwrap();
        service.submit_feedback("Music", 1, now).await.unwrap();

        for _ in 0..SUSPENSION_COOLDOWN {
            service.recommend(now).await.unwrap();
        }
        assert!(store.get_removed_activities().await.unwrap().is_empty());
        let feedback = store.get_mood_feedback(5).await.unwrap();
        assert_eq!(feedback["Music"].scores(), &[5, 5]);

        // A restart sees the same neutral history and does not re-flag.
        service.reload().await.unwrap();
        let outcome = service.recommend(now).await.unwrap();
        assert!(outcome.flagged.is_empty());
    }

    #[tokio::test]
    async fn test_feedback_is_clamped_and_validated() {
        let (service, store) = service_with(Arc::new(Exhaustive)).await;
        let saved = service.submit_feedback("Music", 14, Utc::now()).await.unwrap();
        assert_eq!(saved, 10);
        assert_eq!(store.get_mood_feedback(5).await.unwrap()["Music"].scores(), &[10]);

        let err = service
            .submit_feedback("Skydiving", 5, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownActivity(_)));
    }

    #[tokio::test]
    async fn test_stale_reconciliation_restores_and_is_idempotent() {
        let (service, store) = service_with(Arc::new(Exhaustive)).await;
        let now = Utc::now();
        store.save_mood_feedback("Meditation", 1, now - Duration::days(10)).await.unwrap();
        let mut removals = crate::domain::models::RemovalState::default();
        removals.suspend("Meditation", 5, now - Duration::days(9));
        store.save_removed_activities(&removals).await.unwrap();
        service.reload().await.unwrap();

        let restored = service.reconcile_stale_removals(now).await.unwrap();
        assert_eq!(restored, vec!["Meditation".to_string()]);
        let snapshot = service.snapshot().await;
        assert!(snapshot.removals.is_empty());
        assert_eq!(snapshot.history("Meditation").unwrap().scores(), &[5]);

        assert!(service.reconcile_stale_removals(now).await.unwrap().is_empty());
        assert_eq!(service.snapshot().await, snapshot);
    }

    #[tokio::test]
    async fn test_statuses_report_removals() {
        let (service, _) = service_with(Arc::new(FixedPoint(vec![1.0; 5]))).await;
        let now = Utc::now();
        service.submit_feedback("Journaling", 1, now - Duration::days(1)).await.unwrap();
        service.submit_feedback("Journaling", 1, now).await.unwrap();
        service.recommend(now).await.unwrap();

        let statuses = service.activity_statuses().await.unwrap();
        assert_eq!(statuses.len(), 5);
        let journaling = statuses.iter().find(|s| s.name == "Journaling").unwrap();
        assert!(journaling.removed);
        assert_eq!(journaling.cooldown, Some(SUSPENSION_COOLDOWN - 1));
        assert_eq!(journaling.average, Some(1.0));
        assert!(statuses.iter().filter(|s| s.removed).count() == 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_resuspend_after_restart() {
        let sqlite = memory_store().await;
        let (service, store) = service_on(sqlite.clone(), Arc::new(FixedPoint(vec![1.0; 5]))).await;
        let now = Utc::now();
        service.submit_feedback("Music", 2, now - Duration::days(1)).await.unwrap();
        service.submit_feedback("Music", 1, now).await.unwrap();

        for _ in 1..SUSPENSION_COOLDOWN {
            service.recommend(now).await.unwrap();
        }
        let before = service.snapshot().await;
        assert_eq!(before.removals.get("Music").unwrap().cooldown, 1);

        // The cycle that lifts the suspension cannot write the neutral ratings.
        reject_feedback_updates(&sqlite).await;
        assert!(service.recommend(now).await.is_err());
        assert_eq!(service.snapshot().await, before);
        assert_eq!(store.get_removed_activities().await.unwrap(), before.removals);
        assert_eq!(store.get_mood_feedback(5).await.unwrap()["Music"].scores(), &[2, 1]);

        allow_feedback_updates(&sqlite).await;
        service.reload().await.unwrap();
        let outcome = service.recommend(now).await.unwrap();
        assert_eq!(outcome.restored, vec!["Music".to_string()]);
        assert!(outcome.flagged.is_empty());

        let outcome = service.recommend(now).await.unwrap();
        assert!(outcome.flagged.is_empty());
        assert!(outcome.scores.iter().any(|(name, _)| name == "Music"));
    }

    #[tokio::test]
    async fn test_in_memory_history_is_bounded() {
        let (service, _) = service_with(Arc::new(Exhaustive)).await;
        let now = Utc::now();
        for (day, score) in (1..=8).enumerate() {
            service
                .submit_feedback("Walking", score, now - Duration::days(8 - day as i64))
                .await
                .unwrap();
        }
        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.history("Walking").unwrap().scores(), &[4, 5, 6, 7, 8]);
    }
}
