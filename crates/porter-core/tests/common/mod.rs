//! Common test utilities for porter-core
//!
//! - Manifest builders producing porter.yaml text
//! - Ready-made manifests and temp-dir helpers

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod builders;
pub mod fixtures;

pub use builders::*;
pub use fixtures::*;
