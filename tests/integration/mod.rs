//! Integration tests for querygate.

pub mod audit_test;
pub mod gate_test;
pub mod http_test;
pub mod postgres_test;
