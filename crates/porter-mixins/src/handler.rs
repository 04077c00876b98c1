//! Step-level error handling
//!
//! ```yaml
//! ignoreError:
//!   all: false
//!   exitCodes: [2]
//!   output:
//!     contains: ["already exists"]
//!     regex: ["not found$"]
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Decides whether a failed mixin command should be treated as success
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreErrorHandler {
    /// Ignore every failure
    #[serde(default)]
    pub all: bool,

    #[serde(default)]
    pub exit_codes: Vec<i32>,

    #[serde(default)]
    pub output: IgnoreErrorWithOutput,
}

/// Rules matched against the command's stderr
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreErrorWithOutput {
    #[serde(default)]
    pub contains: Vec<String>,

    #[serde(default)]
    pub regex: Vec<String>,
}

impl IgnoreErrorHandler {
    /// True when the first matching rule allows the failure through
    pub fn ignores(&self, exit_code: i32, stderr: &str) -> bool {
        if exit_code == 0 {
            return true;
        }

        if self.all {
            debug!("Ignoring mixin command error because all errors are ignored");
            return true;
        }

        if self.exit_codes.contains(&exit_code) {
            debug!(
                "Ignoring mixin command error because exit code {} is allowed",
                exit_code
            );
            return true;
        }

        if let Some(needle) = self.output.contains.iter().find(|c| stderr.contains(c.as_str())) {
            debug!(
                "Ignoring mixin command error because stderr contained {:?}",
                needle
            );
            return true;
        }

        for pattern in &self.output.regex {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(stderr) => {
                    debug!(
                        "Ignoring mixin command error because stderr matched {:?}",
                        pattern
                    );
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "Could not ignore failed command because the regex {:?} is invalid: {}",
                        pattern, e
                    );
                    return false;
                }
            }
        }

        false
    }
}
