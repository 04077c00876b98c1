//! OCI reference parsing and normalization
//!
//! Handles references such as `nginx`, `ghcr.io/acme/db:1.2.0` and
//! `localhost:5000/acme/app@sha256:...`. Short names are normalized the way
//! container registries do: no domain means `docker.io`, and a single path
//! component on docker.io lives under `library/`.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Registry assumed when a reference has no domain
pub const DEFAULT_DOMAIN: &str = "docker.io";

/// A parsed, normalized OCI reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OciReference {
    /// Registry hostname with optional port (e.g. "ghcr.io", "localhost:5000")
    domain: String,
    /// Repository path within the registry (e.g. "acme/db")
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl OciReference {
    /// Parse a reference string like "ghcr.io/acme/db:v1.0.0"
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::invalid_reference(s, "reference is empty"));
        }

        // Split by @ for digest references
        let (name_part, digest) = match s.split_once('@') {
            Some((name, digest)) => {
                validate_digest(s, digest)?;
                (name, Some(digest.to_string()))
            }
            None => (s, None),
        };

        // A ':' after the last '/' separates the tag, anything before is a port
        let (name, tag) = match name_part.rfind(':') {
            Some(idx) if !name_part[idx + 1..].contains('/') => {
                let tag = &name_part[idx + 1..];
                validate_tag(s, tag)?;
                (&name_part[..idx], Some(tag.to_string()))
            }
            _ => (name_part, None),
        };

        let (domain, path) = split_domain(name);
        validate_path(s, &path)?;

        Ok(Self {
            domain,
            path,
            tag,
            digest,
        })
    }

    /// Registry hostname
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Repository path within the registry
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fully qualified repository, e.g. "docker.io/library/nginx"
    pub fn repository(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }

    /// Repository as a user would type it, e.g. "nginx"
    pub fn familiar_name(&self) -> String {
        if self.domain == DEFAULT_DOMAIN {
            self.path
                .strip_prefix("library/")
                .unwrap_or(&self.path)
                .to_string()
        } else {
            self.repository()
        }
    }

    pub fn has_tag(&self) -> bool {
        self.tag.is_some()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn has_digest(&self) -> bool {
        self.digest.is_some()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Neither a tag nor a digest was specified
    pub fn is_repository_only(&self) -> bool {
        self.tag.is_none() && self.digest.is_none()
    }

    /// Copy of this reference with a different tag
    pub fn with_tag(&self, tag: &str) -> Result<Self> {
        validate_tag(tag, tag)?;
        Ok(Self {
            tag: Some(tag.to_string()),
            ..self.clone()
        })
    }

    /// Copy of this reference pinned to a digest
    pub fn with_digest(&self, digest: &str) -> Result<Self> {
        validate_digest(digest, digest)?;
        Ok(Self {
            digest: Some(digest.to_string()),
            ..self.clone()
        })
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for OciReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for OciReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OciReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn split_domain(name: &str) -> (String, String) {
    match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        Some(_) => (DEFAULT_DOMAIN.to_string(), name.to_string()),
        None => (DEFAULT_DOMAIN.to_string(), format!("library/{}", name)),
    }
}

fn validate_path(reference: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::invalid_reference(reference, "repository is empty"));
    }
    for component in path.split('/') {
        if component.is_empty() {
            return Err(Error::invalid_reference(
                reference,
                "repository contains an empty path component",
            ));
        }
        if component.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(Error::invalid_reference(
                reference,
                "repository name must be lowercase",
            ));
        }
        let valid = component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c));
        if !valid {
            return Err(Error::invalid_reference(
                reference,
                format!("invalid repository path component {:?}", component),
            ));
        }
    }
    Ok(())
}

fn validate_tag(reference: &str, tag: &str) -> Result<()> {
    let valid = !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-".contains(c));
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_reference(
            reference,
            format!("invalid tag {:?}", tag),
        ))
    }
}

fn validate_digest(reference: &str, digest: &str) -> Result<()> {
    match digest.split_once(':') {
        Some((algorithm, hex))
            if !algorithm.is_empty()
                && hex.len() >= 32
                && hex.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            Ok(())
        }
        _ => Err(Error::invalid_reference(
            reference,
            format!("invalid digest {:?}", digest),
        )),
    }
}
