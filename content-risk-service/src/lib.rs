//! Harmful-content risk scoring service
//!
//! Ingests social posts from several sources, scores them across text,
//! video and audio modalities, fuses the scores into a single risk score,
//! and raises realtime alerts for high-risk content.

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod queue;
pub mod realtime;
pub mod services;

pub use config::Config;
pub use error::{Result, RiskServiceError};
