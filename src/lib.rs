//! Image intake pipeline
//!
//! Moderation and quality analysis for uploaded artwork and frame images.
//! Jobs are claimed from a durable queue, analysed with local image metrics
//! and an external vision service, and the resulting verdict is written back
//! to the artwork or frame record.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;
