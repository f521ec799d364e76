//! Unit tests module
//!
//! Contains tests for individual components in isolation.

mod normalization_test;
mod presets_test;
mod token_bucket_test;
