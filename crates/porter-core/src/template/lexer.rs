//! Mustache-style tag scanner
//!
//! Only variable tags are meaningful to porter; comments are dropped and set
//! delimiter tags (`{{=${ }=}}`) switch the delimiters for the rest of the
//! input. Sections and partials are rejected.

use crate::error::{Error, Result};

/// A piece of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text, emitted as-is
    Text(String),
    /// A variable reference such as `bundle.parameters.name`
    Variable(String),
}

/// Split `src` into literal text and variable references
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut open = "{{".to_string();
    let mut close = "}}".to_string();
    let mut rest = src;
    let mut text = String::new();

    while let Some(start) = rest.find(open.as_str()) {
        text.push_str(&rest[..start]);
        let after_open = &rest[start + open.len()..];

        // Triple mustache is only recognized with the default delimiters
        let (inner, consumed) = if open == "{{" && after_open.starts_with('{') {
            let end = after_open
                .find("}}}")
                .ok_or_else(|| unclosed(&after_open[1..]))?;
            (&after_open[1..end], end + 3)
        } else {
            let end = after_open
                .find(close.as_str())
                .ok_or_else(|| unclosed(after_open))?;
            (&after_open[..end], end + close.len())
        };
        rest = &after_open[consumed..];

        let inner = inner.trim();
        match inner.chars().next() {
            Some('!') => {}
            Some('=') => {
                let body = inner
                    .strip_prefix('=')
                    .and_then(|b| b.strip_suffix('='))
                    .ok_or_else(|| {
                        Error::Template(format!("malformed set delimiter tag {:?}", inner))
                    })?;
                let mut parts = body.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(o), Some(c), None) => {
                        open = o.to_string();
                        close = c.to_string();
                    }
                    _ => {
                        return Err(Error::Template(format!(
                            "malformed set delimiter tag {:?}",
                            inner
                        )))
                    }
                }
            }
            Some('#') | Some('^') | Some('/') | Some('>') => {
                return Err(Error::Template(format!(
                    "unsupported template tag {:?}, only variables may be used",
                    inner
                )));
            }
            Some('&') => push_variable(&mut tokens, &mut text, inner[1..].trim())?,
            Some(_) => push_variable(&mut tokens, &mut text, inner)?,
            None => return Err(Error::Template("empty template tag".to_string())),
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    Ok(tokens)
}

fn push_variable(tokens: &mut Vec<Token>, text: &mut String, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Template("empty template tag".to_string()));
    }
    if !text.is_empty() {
        tokens.push(Token::Text(std::mem::take(text)));
    }
    tokens.push(Token::Variable(name.to_string()));
    Ok(())
}

fn unclosed(after: &str) -> Error {
    let snippet: String = after.chars().take(40).collect();
    Error::Template(format!("unclosed template tag near {:?}", snippet))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(tokens: &[Token]) -> Vec<&str> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Variable(v) => Some(v.as_str()),
                Token::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_default_delimiters() {
        let tokens = tokenize("echo {{ bundle.parameters.greeting }}!").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Text("echo ".into()),
                Token::Variable("bundle.parameters.greeting".into()),
                Token::Text("!".into()),
            ]
        );
    }

    #[test]
    fn test_dollar_delimiters_after_set_tag() {
        let tokens = tokenize("{{=${ }=}}\ncommand: echo ${ bundle.name } {{ literal }}").unwrap();
        assert_eq!(vars(&tokens), vec!["bundle.name"]);
        let text: String = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Text(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "\ncommand: echo  {{ literal }}");
    }

    #[test]
    fn test_triple_and_ampersand_are_variables() {
        let tokens = tokenize("{{{ env.HOME }}} {{& env.USER }}").unwrap();
        assert_eq!(vars(&tokens), vec!["env.HOME", "env.USER"]);
    }

    #[test]
    fn test_comments_are_dropped() {
        let tokens = tokenize("a{{! ignored }}b").unwrap();
        assert_eq!(tokens, vec![Token::Text("ab".into())]);
    }

    #[test]
    fn test_sections_are_rejected() {
        assert!(tokenize("{{#items}}x{{/items}}").is_err());
    }

    #[test]
    fn test_unclosed_tag() {
        let err = tokenize("echo {{ bundle.name").unwrap_err();
        assert!(err.to_string().contains("unclosed"));
    }
}
