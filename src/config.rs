use crate::domain::models::DEFAULT_ACTIVITIES;
use crate::domain::scoring::RECENT_WINDOW;
use crate::domain::swarm::ParticleSwarm;
use anyhow::{bail, Context, Result};
use chrono::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://mental_health.db?mode=rwc";
/// One week.
const DEFAULT_STALE_REMOVAL_MINUTES: i64 = 7 * 24 * 60;
const DEFAULT_RECONCILE_CRON: &str = "0 0 * * * *";
const DEFAULT_HISTORY_DEPTH: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub activities: Vec<String>,
    pub stale_removal_after: Duration,
    /// `None` disables the periodic reconciliation job.
    pub reconcile_cron: Option<String>,
    pub history_depth: usize,
    pub swarm: ParticleSwarm,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| {
            let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        let activities = match lookup("ACTIVITIES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
            None => DEFAULT_ACTIVITIES.iter().map(|a| a.to_string()).collect(),
        };
        if activities.is_empty() {
            bail!("ACTIVITIES must name at least one activity");
        }
        let mut unique = activities.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != activities.len() {
            bail!("ACTIVITIES contains duplicate names");
        }

        let stale_minutes: i64 = parse_or(&lookup, "STALE_REMOVAL_MINUTES", DEFAULT_STALE_REMOVAL_MINUTES)?;
        if stale_minutes <= 0 {
            bail!("STALE_REMOVAL_MINUTES must be positive");
        }

        let reconcile_cron = match lookup("RECONCILE_CRON") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => Some(DEFAULT_RECONCILE_CRON.to_string()),
        };

        let history_depth: usize = parse_or(&lookup, "HISTORY_DEPTH", DEFAULT_HISTORY_DEPTH)?;
        if history_depth < RECENT_WINDOW {
            bail!("HISTORY_DEPTH must be at least {}", RECENT_WINDOW);
        }

        let defaults = ParticleSwarm::default();
        let swarm = ParticleSwarm {
            swarm_size: parse_or(&lookup, "SWARM_SIZE", defaults.swarm_size)?,
            iterations: parse_or(&lookup, "SWARM_ITERATIONS", defaults.iterations)?,
            seed: match lookup("OPTIMIZER_SEED") {
                Some(raw) => Some(raw.trim().parse().context("OPTIMIZER_SEED must be an integer")?),
                None => None,
            },
            ..defaults
        };

        Ok(Self {
            database_url,
            bind_addr,
            activities,
            stale_removal_after: Duration::minutes(stale_minutes),
            reconcile_cron,
            history_depth,
            swarm,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
