//! Shared fakes and router-level tests.
