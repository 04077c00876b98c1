//! # porter-mixins
//!
//! Everything porter needs to talk to mixins:
//! - Locating mixin executables and running their commands
//! - Extracting step outputs from files, JSONPath and regular expressions
//! - Fanning a command out across every mixin in a manifest
//! - Mixin version metadata and manifest linting

pub mod error;
pub mod handler;
pub mod lint;
pub mod outputs;
pub mod package;
pub mod query;
pub mod runner;

pub use error::{MixinError, Result};
pub use handler::IgnoreErrorHandler;
pub use outputs::StepOutput;
pub use query::{InputGenerator, ManifestInputGenerator, MixinQuery};
pub use runner::{CommandOptions, CommandOutput, MixinExecutor, MixinRunner};
