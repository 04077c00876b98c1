//! # porter-runtime
//!
//! Runs a bundle action inside the installer image:
//! - Template data built from parameters, credentials, outputs and dependencies
//! - Step rendering with strict variable resolution and mixin execution
//! - File parameter decoding and output collection
//! - The state bag carried between runs
//! - Image reconciliation against the published and relocated references

pub mod context;
pub mod engine;
pub mod files;
pub mod images;
pub mod outputs;
pub mod state;

pub use context::{ContextBuilder, SensitiveValues, TemplateData};
pub use engine::{RuntimeEngine, RuntimeManifest};
