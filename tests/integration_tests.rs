//! Integration tests for querygate.
//!
//! Most tests run against the mock collaborators. The Postgres tests need a
//! running database: set DATABASE_URL to run them.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
