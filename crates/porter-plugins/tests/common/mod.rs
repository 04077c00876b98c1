//! Common test utilities for porter-plugins
//!
//! - Mocks for the protocol and connector seams
//! - A recording plugin served from a task in the test process

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mocks;
pub mod plugin;

pub use mocks::*;
pub use plugin::*;
