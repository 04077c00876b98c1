//! Process context shared by everything that runs mixins
//!
//! Carries the environment handed to child processes, the working
//! directory, the debug flag, and where output goes. Output written through
//! [`ProcessContext::write_out`] has every registered sensitive value masked.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

/// Replacement for sensitive values in console output
pub const CENSORED: &str = "*******";

/// In-memory output shared between a writer and whoever reads it back
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::other("output buffer lock poisoned"))?;
        buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => String::new(),
        }
    }
}

/// Destination for process output
#[derive(Debug, Clone, Default)]
pub enum Sink {
    #[default]
    Stdout,
    Stderr,
    Buffer(SharedBuffer),
    Discard,
}

impl Sink {
    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()
            }
            Sink::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(bytes)?;
                err.flush()
            }
            Sink::Buffer(buf) => buf.write_all(bytes),
            Sink::Discard => Ok(()),
        }
    }
}

/// Environment, working directory and output sinks for running mixins
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
    pub debug: bool,
    pub out: Sink,
    pub err: Sink,
    sensitive: Arc<RwLock<Vec<String>>>,
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self {
            env: BTreeMap::new(),
            working_dir: PathBuf::from("."),
            debug: false,
            out: Sink::Stdout,
            err: Sink::Stderr,
            sensitive: Arc::default(),
        }
    }
}

impl ProcessContext {
    /// Context with the given environment and working directory, writing to
    /// the process's stdout and stderr
    pub fn new(env: BTreeMap<String, String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            env,
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    /// Context inheriting the current process environment and directory.
    /// Debug is on when `PORTER_DEBUG` is `true`.
    pub fn from_env() -> Self {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut ctx = Self::new(utf8_env(std::env::vars_os()), working_dir);
        ctx.debug = ctx
            .getenv("PORTER_DEBUG")
            .is_some_and(|v| v.parse().unwrap_or(false));
        ctx
    }

    pub fn getenv(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Copy of this context writing to different sinks. Sensitive values
    /// stay shared with the parent.
    pub fn with_sinks(&self, out: Sink, err: Sink) -> Self {
        Self {
            out,
            err,
            ..self.clone()
        }
    }

    /// Replace the set of values masked in output
    pub fn set_sensitive_values(&self, values: Vec<String>) {
        if let Ok(mut guard) = self.sensitive.write() {
            *guard = values.into_iter().filter(|v| !v.is_empty()).collect();
        }
    }

    /// Mask every sensitive value in `text`
    pub fn censor(&self, text: &str) -> String {
        let Ok(values) = self.sensitive.read() else {
            return text.to_string();
        };
        values
            .iter()
            .fold(text.to_string(), |acc, v| acc.replace(v.as_str(), CENSORED))
    }

    /// Write to the output sink with sensitive values masked
    pub fn write_out(&self, text: &str) -> io::Result<()> {
        self.out.write_all(self.censor(text).as_bytes())
    }

    /// Write to the error sink with sensitive values masked
    pub fn write_err(&self, text: &str) -> io::Result<()> {
        self.err.write_all(self.censor(text).as_bytes())
    }
}

/// Environment entries that are valid UTF-8. Others cannot be passed on to
/// mixins and are dropped.
fn utf8_env(vars: impl IntoIterator<Item = (OsString, OsString)>) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
            (Ok(k), Ok(v)) => Some((k, v)),
            (Ok(k), Err(_)) => {
                tracing::debug!("Skipping environment variable {} with a non UTF-8 value", k);
                None
            }
            _ => None,
        })
        .collect()
}
