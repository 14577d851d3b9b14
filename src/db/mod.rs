use crate::domain::models::{FeedbackHistory, RemovalEntry, RemovalState, NEUTRAL_MOOD};
use crate::domain::removal;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;

/// Durable state behind the recommendation engine.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Activities of the last saved recommendation, most recent first.
    async fn get_recent_recommendations(&self, limit: usize) -> Result<Vec<String>>;
    /// Replaces the previous recommendation record.
    async fn save_recommendations(&self, selected: &[String]) -> Result<()>;
    /// Last `depth` raw ratings per activity, oldest first.
    async fn get_mood_feedback(&self, depth: usize) -> Result<HashMap<String, FeedbackHistory>>;
    /// Mean of every stored rating per activity.
    async fn feedback_averages(&self) -> Result<HashMap<String, f64>>;
    /// Upserts the rating for `activity` on the calendar day of `at`.
    async fn save_mood_feedback(&self, activity: &str, score: i16, at: DateTime<Utc>) -> Result<()>;
    async fn get_removed_activities(&self) -> Result<RemovalState>;
    /// Full replace of the removal table.
    async fn save_removed_activities(&self, removals: &RemovalState) -> Result<()>;
    /// Persists one recommendation cycle atomically: the selection, the
    /// removal table and neutral ratings for every restored activity.
    async fn commit_cycle(
        &self,
        selected: &[String],
        removals: &RemovalState,
        restored: &[String],
        now: DateTime<Utc>,
    ) -> Result<()>;
    /// Restores every activity suspended at least `threshold` before `now`,
    /// returning their names.
    async fn reconcile_stale_removals(&self, threshold: Duration, now: DateTime<Utc>) -> Result<Vec<String>>;
}

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid DATABASE_URL {database_url}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, FromRow)]
struct RemovedRow {
    activity: String,
    cooldown: i64,
    date_removed: DateTime<Utc>,
}

impl RemovedRow {
    fn into_entry(self) -> Result<(String, RemovalEntry)> {
        let cooldown = i32::try_from(self.cooldown).with_context(|| {
            format!("cooldown {} for {} is out of range", self.cooldown, self.activity)
        })?;
        Ok((
            self.activity,
            RemovalEntry {
                cooldown,
                removed_at: self.date_removed,
            },
        ))
    }
}

fn removal_state(rows: Vec<RemovedRow>) -> Result<RemovalState> {
    let entries = rows
        .into_iter()
        .map(RemovedRow::into_entry)
        .collect::<Result<Vec<_>>>()?;
    Ok(RemovalState::from_entries(entries))
}

async fn replace_recommendations(
    conn: &mut SqliteConnection,
    selected: &[String],
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("DELETE FROM recommendations")
        .execute(&mut *conn)
        .await?;
    for (position, activity) in selected.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO recommendations (activity, position, created_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(activity)
        .bind(position as i64)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn replace_removals(conn: &mut SqliteConnection, removals: &RemovalState) -> Result<()> {
    sqlx::query("DELETE FROM removed_activities")
        .execute(&mut *conn)
        .await?;
    for (activity, entry) in removals.iter() {
        sqlx::query(
            r#"
            INSERT INTO removed_activities (activity, cooldown, date_removed)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(activity)
        .bind(entry.cooldown as i64)
        .bind(entry.removed_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Rewrites the activity's stored ratings to the neutral score.
async fn neutralize(conn: &mut SqliteConnection, activity: &str, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE mood_feedback SET mood_score = ?1, recorded_at = ?2 WHERE activity = ?3")
        .bind(NEUTRAL_MOOD as i64)
        .bind(at)
        .bind(activity)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn get_recent_recommendations(&self, limit: usize) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT activity FROM recommendations ORDER BY id DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("activity").map_err(Into::into))
            .collect()
    }

    async fn save_recommendations(&self, selected: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        replace_recommendations(&mut tx, selected, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_mood_feedback(&self, depth: usize) -> Result<HashMap<String, FeedbackHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT activity, mood_score
            FROM (
                SELECT
                    activity,
                    mood_score,
                    feedback_date,
                    id,
                    ROW_NUMBER() OVER (
                        PARTITION BY activity
                        ORDER BY feedback_date DESC, id DESC
                    ) AS recency
                FROM mood_feedback
            )
            WHERE recency <= ?1
            ORDER BY activity, feedback_date ASC, id ASC
            "#,
        )
        .bind(depth as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut feedback: HashMap<String, FeedbackHistory> = HashMap::new();
        for row in rows {
            let activity: String = row.try_get("activity")?;
            let score: i64 = row.try_get("mood_score")?;
            feedback.entry(activity).or_default().push(score as i16);
        }
        Ok(feedback)
    }

    async fn feedback_averages(&self) -> Result<HashMap<String, f64>> {
        let rows = sqlx::query(
            "SELECT activity, AVG(mood_score) AS average FROM mood_feedback GROUP BY activity",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut averages: HashMap<String, f64> = HashMap::new();
        for row in rows {
            averages.insert(row.try_get("activity")?, row.try_get("average")?);
        }
        Ok(averages)
    }

    async fn save_mood_feedback(&self, activity: &str, score: i16, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mood_feedback (activity, mood_score, feedback_date, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (activity, feedback_date) DO UPDATE
            SET mood_score = excluded.mood_score,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(activity)
        .bind(score as i64)
        .bind(at.date_naive())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_removed_activities(&self) -> Result<RemovalState> {
        let rows = sqlx::query_as::<_, RemovedRow>(
            "SELECT activity, cooldown, date_removed FROM removed_activities",
        )
        .fetch_all(&self.pool)
        .await?;
        removal_state(rows)
    }

    async fn save_removed_activities(&self, removals: &RemovalState) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        replace_removals(&mut tx, removals).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_cycle(
        &self,
        selected: &[String],
        removals: &RemovalState,
        restored: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        replace_recommendations(&mut tx, selected, now).await?;
        replace_removals(&mut tx, removals).await?;
        for activity in restored {
            neutralize(&mut tx, activity, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn reconcile_stale_removals(&self, threshold: Duration, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, RemovedRow>(
            "SELECT activity, cooldown, date_removed FROM removed_activities",
        )
        .fetch_all(&mut *tx)
        .await?;
        let removals = removal_state(rows)?;

        let stale = removal::stale_removals(&removals, threshold, now);
        for activity in &stale {
            tracing::info!("Restoring {} to neutral ({})", activity, NEUTRAL_MOOD);
            neutralize(&mut tx, activity, now).await?;
            sqlx::query("DELETE FROM removed_activities WHERE activity = ?1")
                .bind(activity)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(stale)
    }
}
