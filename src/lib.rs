//! Ramadan Ingest Server Library
//!
//! Rate-limited ingestion of Sehri/Iftar schedules with transactional
//! persistence and live progress streaming.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
