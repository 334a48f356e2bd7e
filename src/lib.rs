//! Airdrop project screening
//!
//! Batches of candidate projects are submitted over HTTP into a PostgreSQL
//! queue, claimed one at a time by workers, and evaluated project by project
//! through a chat-completions model under a monthly token budget. Each
//! project ends with a green/yellow/red/error verdict that is stored with the
//! batch and as the project's latest judgement.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;
