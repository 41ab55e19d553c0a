//! CLI integration tests.

mod common;

mod build_tests;
mod convert_tests;
