//! Shared repository tests.
//!
//! Each file holds test functions that take `&dyn XxxRepo`, followed by a
//! `sqlite_tests` module that runs them against an in-memory database with
//! the real migrations applied.
