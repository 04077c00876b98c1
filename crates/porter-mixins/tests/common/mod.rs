//! Shared helpers for porter-mixins integration tests

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mixins;

pub use mixins::*;
