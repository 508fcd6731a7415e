//! querygate - natural-language SQL behind a safety and confirmation gate.
//!
//! This library exposes the core modules for the binary and integration tests.

pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod query;
pub mod safety;
pub mod server;
