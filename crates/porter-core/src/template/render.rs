//! Strict rendering of tokenized templates through Tera

use super::lexer::{tokenize, Token};
use crate::error::{Error, Result};
use serde_json::Value;
use tera::{Context, Tera};

/// Render `template` against `data`.
///
/// Every variable must resolve; the first one that does not fails the render
/// with [`Error::UnresolvedVariable`]. Values are emitted without escaping.
pub fn render(template: &str, data: &Value) -> Result<String> {
    let tokens = tokenize(template)?;

    for token in &tokens {
        if let Token::Variable(name) = token {
            if lookup(data, name).is_none() {
                return Err(Error::unresolved_variable(name));
            }
        }
    }

    let source = to_tera_source(&tokens)?;
    let context = Context::from_value(data.clone())
        .map_err(|e| Error::Template(format!("invalid template data: {}", e)))?;
    Tera::one_off(&source, &context, false)
        .map_err(|e| Error::Template(format!("{:#}", anyhow::Error::new(e))))
}

/// Variable names used by `template`, in order of first appearance
pub fn variables(template: &str) -> Result<Vec<String>> {
    let mut seen = Vec::new();
    for token in tokenize(template)? {
        if let Token::Variable(name) = token {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }
    Ok(seen)
}

/// Resolve a dotted name against the data tree
pub fn lookup<'a>(data: &'a Value, name: &str) -> Option<&'a Value> {
    name.split('.')
        .try_fold(data, |node, segment| node.as_object()?.get(segment))
}

fn to_tera_source(tokens: &[Token]) -> Result<String> {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Text(text) => {
                // A literal "{% endraw %}" would close the raw block early
                for (i, part) in text.split("{% endraw %}").enumerate() {
                    if i > 0 {
                        out.push_str("{{ \"{% endraw %}\" }}");
                    }
                    if !part.is_empty() {
                        out.push_str("{% raw %}");
                        out.push_str(part);
                        out.push_str("{% endraw %}");
                    }
                }
            }
            Token::Variable(name) => {
                out.push_str("{{ ");
                out.push_str(&tera_path(name)?);
                out.push_str(" }}");
            }
        }
    }
    Ok(out)
}

/// `bundle.parameters.my-param` => `bundle["parameters"]["my-param"]`
fn tera_path(name: &str) -> Result<String> {
    let mut segments = name.split('.');
    let root = segments.next().unwrap_or_default();
    let valid_root = root
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && root.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_root {
        return Err(Error::Template(format!(
            "invalid variable name {:?}",
            name
        )));
    }

    let mut path = root.to_string();
    for segment in segments {
        let quote = ['"', '\'', '`']
            .into_iter()
            .find(|q| !segment.contains(*q))
            .ok_or_else(|| Error::Template(format!("invalid variable name {:?}", name)))?;
        path.push('[');
        path.push(quote);
        path.push_str(segment);
        path.push(quote);
        path.push(']');
    }
    Ok(path)
}
