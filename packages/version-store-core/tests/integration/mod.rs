//! Integration test suite for the versioning core.
//!
//! Tests are organized by concern:
//! 1. End-to-end scenario (create, compare, rollback)
//! 2. Immutability and id allocation
//! 3. Crash recovery and corrupt state
//! 4. Concurrent writers

pub mod concurrency_tests;
pub mod crash_recovery_tests;
pub mod end_to_end_tests;
pub mod helpers;
pub mod immutability_tests;
