pub mod engine;
pub mod models;
pub mod removal;
pub mod scoring;
pub mod selection;
pub mod swarm;
