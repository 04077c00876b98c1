//! Step output extraction
//!
//! A step declares outputs the harness collects once the mixin has run:
//!
//! ```yaml
//! outputs:
//!   - name: config
//!     path: config.txt          # file contents
//!   - name: ids
//!     jsonPath: "$[*].id"       # JSONPath over stdout
//!   - name: token
//!     regex: "Token: (\\w+)"    # capture groups from stdout
//! ```
//!
//! Each value lands in `<outputs-dir>/<name>`.

use crate::error::{MixinError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json_path::JsonPath;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// An output declared on a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub json_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub regex: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl StepOutput {
    /// The extractor matching the output's declared capability
    pub fn extractor(&self) -> Option<Box<dyn OutputExtractor + '_>> {
        if !self.json_path.is_empty() {
            Some(Box::new(JsonPathOutput(&self.json_path)))
        } else if !self.regex.is_empty() {
            Some(Box::new(RegexOutput(&self.regex)))
        } else if !self.path.is_empty() {
            Some(Box::new(FileOutput(&self.path)))
        } else {
            None
        }
    }
}

/// Derives an output value from what a mixin left behind
pub trait OutputExtractor {
    fn extract(&self, stdout: &str, working_dir: &Path) -> std::result::Result<Vec<u8>, String>;
}

/// Reads a file relative to the working directory
pub struct FileOutput<'a>(pub &'a str);

impl OutputExtractor for FileOutput<'_> {
    fn extract(&self, _stdout: &str, working_dir: &Path) -> std::result::Result<Vec<u8>, String> {
        let path = working_dir.join(self.0);
        fs::read(&path).map_err(|e| format!("error reading {}: {}", path.display(), e))
    }
}

/// Evaluates a JSONPath expression against stdout parsed as JSON
pub struct JsonPathOutput<'a>(pub &'a str);

impl OutputExtractor for JsonPathOutput<'_> {
    fn extract(&self, stdout: &str, _working_dir: &Path) -> std::result::Result<Vec<u8>, String> {
        // The first JSON document on stdout; anything printed after it is ignored
        let document: Value = match serde_json::Deserializer::from_str(stdout)
            .into_iter::<Value>()
            .next()
        {
            None => Value::Object(Default::default()),
            Some(doc) => doc.map_err(|e| format!("error unmarshaling stdout as JSON: {}", e))?,
        };

        let path = JsonPath::parse(self.0)
            .map_err(|e| format!("invalid JSONPath {:?}: {}", self.0, e))?;
        let nodes = path.query(&document).all();

        let result = if is_singular(self.0) {
            match nodes.as_slice() {
                [one] => (*one).clone(),
                [] => return Err(format!("no match for JSONPath {:?}", self.0)),
                many => Value::Array(many.iter().map(|v| (*v).clone()).collect()),
            }
        } else {
            Value::Array(nodes.into_iter().cloned().collect())
        };

        serde_json::to_vec(&result).map_err(|e| e.to_string())
    }
}

/// Collects the capture groups of every match in stdout, one per line
pub struct RegexOutput<'a>(pub &'a str);

impl OutputExtractor for RegexOutput<'_> {
    fn extract(&self, stdout: &str, _working_dir: &Path) -> std::result::Result<Vec<u8>, String> {
        let re = Regex::new(self.0)
            .map_err(|e| format!("invalid regular expression {:?}: {}", self.0, e))?;

        let mut groups = Vec::new();
        for caps in re.captures_iter(stdout) {
            for i in 1..caps.len() {
                groups.push(caps.get(i).map_or("", |m| m.as_str()));
            }
        }
        Ok(groups.join("\n").into_bytes())
    }
}

/// A JSONPath selects at most one node when it has no wildcard, descendant,
/// filter, slice or union segment
fn is_singular(expr: &str) -> bool {
    let mut quote = None;
    let mut depth = 0usize;
    let mut prev = '\0';
    for c in expr.chars() {
        match (quote, c) {
            (Some(q), c) if c == q && prev != '\\' => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '*' | '?') => return false,
            (None, '.') if prev == '.' => return false,
            (None, ':' | ',') if depth > 0 => return false,
            _ => {}
        }
        prev = c;
    }
    true
}

/// Write an output value to `<outputs_dir>/<name>`, readable and writable
/// by the owner only
pub fn write_output(outputs_dir: &Path, name: &str, value: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(outputs_dir)?;
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(outputs_dir.join(name))?;
    file.write_all(value)
}

/// Extract every declared output and write it under `outputs_dir`
pub fn process_outputs(
    outputs: &[StepOutput],
    stdout: &str,
    working_dir: &Path,
    outputs_dir: &Path,
) -> Result<()> {
    for output in outputs {
        let Some(extractor) = output.extractor() else {
            warn!(
                "Output {} declares none of jsonPath, regex or path; skipping",
                output.name
            );
            continue;
        };
        let value = extractor
            .extract(stdout, working_dir)
            .map_err(|message| MixinError::invalid_output(&output.name, message))?;
        debug!(output = %output.name, "Writing step output");
        write_output(outputs_dir, &output.name, &value)?;
    }
    Ok(())
}
