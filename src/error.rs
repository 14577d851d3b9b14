use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("not enough eligible activities: {available} available, at least 2 required")]
    InsufficientCandidates { available: usize },
    #[error("unknown activity: {0}")]
    UnknownActivity(String),
    #[error("storage failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("feedback session not found")]
    NotFound,
    #[error("feedback session already finished")]
    Finished,
}
