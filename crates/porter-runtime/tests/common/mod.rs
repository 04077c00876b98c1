//! Common test utilities for porter-runtime
//!
//! - Manifests compiled into a sandboxed installer filesystem
//! - Shell-script mixins and a capturing process context

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mixins;

pub use fixtures::*;
pub use mixins::*;
