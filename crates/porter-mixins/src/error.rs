//! Errors raised while running mixins

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MixinError>;

#[derive(Error, Debug)]
pub enum MixinError {
    /// The mixin executable does not exist
    #[error("mixin {mixin} is not installed ({path})")]
    NotInstalled { mixin: String, path: PathBuf },

    /// The mixin executable could not be launched
    #[error("could not start mixin {mixin}: {source}")]
    Start {
        mixin: String,
        #[source]
        source: std::io::Error,
    },

    /// The mixin ran and exited unsuccessfully
    #[error("mixin {mixin} failed with exit code {code}\n{stderr}")]
    Exit {
        mixin: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// A step output could not be extracted
    #[error("could not extract output {name}: {message}")]
    InvalidOutput { name: String, message: String },

    /// The step body could not be interpreted
    #[error("invalid step for mixin {mixin}: {message}")]
    InvalidStep { mixin: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MixinError {
    pub fn invalid_output(name: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidOutput {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Exit code of a mixin that ran and failed
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }
}
