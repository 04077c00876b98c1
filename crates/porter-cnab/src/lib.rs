//! # porter-cnab
//!
//! Turns a porter manifest into a CNAB bundle:
//! - Bundle descriptor model and the porter stamp
//! - Manifest to bundle conversion
//! - Required extensions (dependencies, parameter sources, docker, file parameters)
//! - Dependency version resolution against an OCI registry
//! - Installer image Dockerfile generation

pub mod bundle;
pub mod converter;
pub mod dockerfile;
pub mod extensions;
pub mod registry;
pub mod resolver;
pub mod stamp;

pub use bundle::Bundle;
pub use converter::ManifestConverter;
pub use dockerfile::DockerfileGenerator;
pub use registry::{RegistryClient, TagLister};
pub use resolver::{DependencyLock, DependencyResolver};
pub use stamp::Stamp;
