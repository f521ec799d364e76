//! Common test utilities and helpers
//!
//! Shared by the integration suites: a PostgreSQL container, schedule
//! fixtures, a mock upstream and a store that fails on demand.

#![allow(dead_code)]


pub use db::TestDb;
pub use fixtures::{entries_for, entry, test_app_state, AppState, FlakyStore};
pub use upstream::{day_body, month_body, MockUpstream};
