//! Common test utilities for API integration tests
//!
//! Shared infrastructure: an app wired to in-memory backends, request
//! helpers and report fixtures.

#![allow(unused_imports)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
