//! strata-lib: Core types and logic for Strata
//!
//! This crate provides the pieces of the build driver:
//! - `config`: the immutable per-invocation configuration
//! - `engine`: the analysis passes that load and lower modules
//! - `activity`: selection and execution of the one activity per run
//! - `account`: dependency and used-environment records

pub mod account;
pub mod activity;
pub mod config;
pub mod convert;
pub mod engine;
pub mod env;
pub mod external;
pub mod graph;
pub mod mixed;
pub mod overlay;
pub mod view;
