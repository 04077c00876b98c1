//! Linting a manifest with its mixins

use crate::query::{ManifestInputGenerator, MixinQuery};
use crate::runner::MixinExecutor;
use anyhow::{Context, Result};
use porter_core::{Manifest, ProcessContext};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::debug;

/// Severity of a lint result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Prevents the bundle from building properly
    Error,
    /// A best practice or a problem that may not break the build
    Warning,
}

impl Level {
    fn code(self) -> u8 {
        match self {
            Level::Error => 0,
            Level::Warning => 2,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Mixins report levels as `0`/`2`; the names are accepted too
impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) if n.as_u64() == Some(0) => Ok(Level::Error),
            serde_json::Value::Number(n) if n.as_u64() == Some(2) => Ok(Level::Warning),
            serde_json::Value::String(s) if s == "error" => Ok(Level::Error),
            serde_json::Value::String(s) if s == "warning" => Ok(Level::Warning),
            other => Err(de::Error::custom(format!("unknown lint level {}", other))),
        }
    }
}

/// Line and column of a result in the manifest, 1-based. Zero when the
/// result could not be located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Location in manifest: Line: {}, Column: {}",
            self.line, self.column
        )
    }
}

/// A single problem reported by a mixin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LintResult {
    pub level: Level,

    /// Text that locates the problem in the manifest
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub location: Location,

    /// Identifier such as `exec-105`
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, rename = "URL")]
    pub url: String,
}

impl fmt::Display for LintResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}({}) - {}", self.level, self.code, self.title)?;
        writeln!(f, "{}", self.location)?;
        if !self.message.is_empty() {
            writeln!(f, "{}", self.message)?;
        }
        if !self.url.is_empty() {
            writeln!(f, "See {} for more information", self.url)?;
        }
        writeln!(f, "---")
    }
}

/// Everything the linters found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintResults(pub Vec<LintResult>);

impl LintResults {
    pub fn has_error(&self) -> bool {
        self.0.iter().any(|r| r.level == Level::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LintResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sorted: Vec<&LintResult> = self.0.iter().collect();
        sorted.sort_by_key(|r| r.level);
        for result in sorted {
            write!(f, "{}", result)?;
        }
        Ok(())
    }
}

/// Runs `lint` on each of a manifest's mixins
pub struct Linter<'a> {
    executor: &'a dyn MixinExecutor,
}

impl<'a> Linter<'a> {
    pub fn new(executor: &'a dyn MixinExecutor) -> Self {
        Self { executor }
    }

    pub async fn lint(&self, ctx: &ProcessContext, manifest: &Manifest) -> Result<LintResults> {
        debug!("Running linters for each mixin used in the manifest");

        let responses = MixinQuery::new(self.executor)
            .execute(ctx, "lint", &ManifestInputGenerator::new(manifest))
            .await?;

        let text = String::from_utf8_lossy(&manifest.raw);
        let mut results = Vec::new();
        for (mixin, response) in responses {
            let parsed: Vec<LintResult> = serde_json::from_str(&response)
                .with_context(|| format!("unable to parse lint response from mixin {:?}", mixin))?;
            results.extend(parsed.into_iter().map(|mut r| {
                r.location = locate(&text, &r.key);
                r
            }));
        }
        Ok(LintResults(results))
    }
}

/// First line containing `key`, with the column where it starts
pub fn locate(manifest: &str, key: &str) -> Location {
    if key.is_empty() {
        return Location::default();
    }
    manifest
        .lines()
        .enumerate()
        .find_map(|(i, line)| {
            line.find(key).map(|col| Location {
                line: i + 1,
                column: line[..col].chars().count() + 1,
            })
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixin_results() {
        let results: Vec<LintResult> = serde_json::from_str(
            r#"[{"Level":0,"Key":"command: bash","Code":"exec-100","Title":"bash -c argument missing","URL":"https://porter.sh/best-practices/exec-mixin/#quoting-escaping-bash-and-yaml"},
                {"Level":"warning","Code":"exec-101","Title":"just a warning"}]"#,
        )
        .unwrap();
        assert_eq!(results[0].level, Level::Error);
        assert!(results[0].url.starts_with("https://"));
        assert_eq!(results[1].level, Level::Warning);
        assert!(LintResults(results).has_error());
    }

    #[test]
    fn test_locate() {
        let manifest = "name: hello\ninstall:\n  - exec:\n      command: bash\n";
        assert_eq!(
            locate(manifest, "command: bash"),
            Location { line: 4, column: 7 }
        );
        assert_eq!(locate(manifest, "nowhere"), Location::default());
        assert_eq!(locate(manifest, ""), Location::default());
    }

    #[test]
    fn test_display_sorts_errors_first() {
        let warning = LintResult {
            level: Level::Warning,
            key: String::new(),
            location: Location::default(),
            code: "exec-101".into(),
            title: "warn".into(),
            message: String::new(),
            url: String::new(),
        };
        let error = LintResult {
            level: Level::Error,
            code: "exec-100".into(),
            title: "bad".into(),
            message: "fix it".into(),
            ..warning.clone()
        };
        let text = LintResults(vec![warning, error]).to_string();
        assert!(text.starts_with("error(exec-100) - bad\n"));
        assert!(text.contains("fix it\n---\nwarning(exec-101) - warn\n"));
    }
}
