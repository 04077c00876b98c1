//! # porter-core
//!
//! Core library for porter providing:
//! - The porter.yaml manifest model, loading and validation
//! - Mustache-style templating with strict variable resolution
//! - Configuration loading (~/.porter/config.yaml)
//! - Well-known installer image paths and OCI references
//! - The process context used to run mixins

pub mod config;
pub mod error;
pub mod manifest;
pub mod paths;
pub mod process;
pub mod reference;
pub mod schema;
pub mod template;
pub mod utils;

pub use config::{ConfigLoader, PorterConfig};
pub use error::{Error, ErrorList, Result};
pub use manifest::Manifest;
pub use paths::CnabPaths;
pub use process::{ProcessContext, SharedBuffer, Sink};
pub use reference::OciReference;
pub use schema::Schema;
pub use utils::get_home_dir;
