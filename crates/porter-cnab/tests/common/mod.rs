//! Common test utilities for porter-cnab
//!
//! - Manifests and bundles used across the integration tests
//! - Mocks for the registry seam

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
