//! Manifest templating
//!
//! Manifests use Mustache-style variables. Schema versions after
//! `1.0.0-alpha.1` switch the delimiters to `${ }` by prepending
//! [`TEMPLATE_DELIMITER_PREFIX`] before the text is rendered or scanned.

mod lexer;
mod render;

pub use lexer::{tokenize, Token};
pub use render::{lookup, render, variables};

use crate::error::Result;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Set-delimiter tag switching templates to `${ }`
pub const TEMPLATE_DELIMITER_PREFIX: &str = "{{=${ }=}}\n";

/// Schema versions after this one use the `${ }` delimiters
static DELIMITER_THRESHOLD: LazyLock<semver::Version> =
    LazyLock::new(|| semver::Version::parse("1.0.0-alpha.1").expect("threshold version is valid"));

/// Template prefix for a manifest schema version.
///
/// Unversioned and unparseable manifests use the Mustache default.
pub fn prefix_for_schema(schema_version: &str) -> &'static str {
    if schema_version.is_empty() {
        return "";
    }
    match semver::Version::parse(schema_version.trim_start_matches('v')) {
        Ok(v) if v > *DELIMITER_THRESHOLD => TEMPLATE_DELIMITER_PREFIX,
        _ => "",
    }
}

/// Output references found by scanning manifest text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateReferences {
    /// Every variable used, sorted
    pub variables: Vec<String>,
    /// Names referenced as `bundle.outputs.<name>`
    pub outputs: BTreeSet<String>,
    /// `(dependency, output)` pairs referenced as
    /// `bundle.dependencies.<dep>.outputs.<output>`
    pub dependency_outputs: BTreeSet<(String, String)>,
}

static OUTPUT_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^bundle\.outputs\.(.+)$").expect("output regex is valid"));

static DEPENDENCY_OUTPUT_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^bundle\.dependencies\.(.+)\.outputs\.(.+)$")
        .expect("dependency output regex is valid")
});

/// Scan raw manifest text for the outputs it references
pub fn scan_references(prefix: &str, manifest: &str) -> Result<TemplateReferences> {
    let source = format!("{}{}", prefix, manifest);
    let mut variables = variables(&source)?;
    variables.sort();

    let mut refs = TemplateReferences::default();
    for var in &variables {
        if let Some(caps) = DEPENDENCY_OUTPUT_REF.captures(var) {
            refs.dependency_outputs
                .insert((caps[1].to_string(), caps[2].to_string()));
        } else if let Some(caps) = OUTPUT_REF.captures(var) {
            refs.outputs.insert(caps[1].to_string());
        }
    }
    refs.variables = variables;
    Ok(refs)
}
