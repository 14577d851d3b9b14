use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Walks a recommendation queue one activity at a time. Each rating is
/// persisted on its own, so abandoning a session halfway is harmless.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSession {
    pub id: Uuid,
    pub queue: Vec<String>,
    pub current_index: usize,
    pub created_at: DateTime<Utc>,
}

impl FeedbackSession {
    pub fn new(queue: Vec<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue,
            current_index: 0,
            created_at,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.queue.get(self.current_index).map(String::as_str)
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.queue.len()
    }

    /// Moves past the current activity, returning the next one.
    pub fn advance(&mut self) -> Result<Option<&str>, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished);
        }
        self.current_index += 1;
        Ok(self.current())
    }

    pub fn is_expired(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.created_at > max_age
    }
}
