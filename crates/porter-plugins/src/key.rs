//! Plugin keys: `[INTERFACE].BINARY.IMPLEMENTATION`

use crate::error::PluginError;
use std::fmt;
use std::str::FromStr;

/// Binary serving internal plugins
pub const INTERNAL_BINARY: &str = "porter";

/// Identifies a plugin implementation and the binary that serves it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginKey {
    pub interface: String,
    pub binary: String,
    pub implementation: String,
    /// Served by the porter binary itself
    pub is_internal: bool,
}

impl PluginKey {
    pub fn parse(value: &str) -> Result<Self, PluginError> {
        let parts: Vec<&str> = value.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(PluginError::InvalidKey {
                key: value.to_string(),
            });
        }

        match parts.as_slice() {
            [implementation] => Ok(Self {
                binary: INTERNAL_BINARY.to_string(),
                implementation: implementation.to_string(),
                is_internal: true,
                ..Default::default()
            }),
            [binary, implementation] => Ok(Self {
                binary: binary.to_string(),
                implementation: implementation.to_string(),
                is_internal: *binary == INTERNAL_BINARY,
                ..Default::default()
            }),
            [interface, binary, implementation] => Ok(Self {
                interface: interface.to_string(),
                binary: binary.to_string(),
                implementation: implementation.to_string(),
                is_internal: *binary == INTERNAL_BINARY,
            }),
            _ => Err(PluginError::InvalidKey {
                key: value.to_string(),
            }),
        }
    }

    /// The same key bound to `interface`
    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interface = interface.to_string();
        self
    }
}

impl FromStr for PluginKey {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.interface.is_empty() {
            write!(f, "{}.{}", self.binary, self.implementation)
        } else {
            write!(f, "{}.{}.{}", self.interface, self.binary, self.implementation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_full_key() {
        let key = PluginKey::parse("signing.cosign.sigstore").unwrap();
        assert_eq!(key.interface, "signing");
        assert_eq!(key.binary, "cosign");
        assert_eq!(key.implementation, "sigstore");
        assert!(!key.is_internal);
        assert_eq!(key.to_string(), "signing.cosign.sigstore");
    }

    #[test]
    fn test_parse_binary_and_implementation() {
        let key = PluginKey::parse("syft.generator").unwrap();
        assert!(key.interface.is_empty());
        assert_eq!(key.binary, "syft");
        assert_eq!(
            key.with_interface("sbom-generator").to_string(),
            "sbom-generator.syft.generator"
        );
    }

    #[test]
    fn test_one_part_key_is_internal() {
        let key: PluginKey = "notation".parse().unwrap();
        assert!(key.is_internal);
        assert_eq!(key.binary, INTERNAL_BINARY);
        assert_eq!(key.implementation, "notation");
    }

    #[test]
    fn test_porter_binary_is_internal() {
        let key = PluginKey::parse("signing.porter.cosign").unwrap();
        assert!(key.is_internal);
        assert_eq!(key.implementation, "cosign");
        assert!(PluginKey::parse("porter.syft").unwrap().is_internal);
    }

    #[test_case("" ; "empty")]
    #[test_case("a.b.c.d" ; "too many parts")]
    #[test_case("signing..cosign" ; "empty part")]
    fn test_invalid_keys(value: &str) {
        let err = PluginKey::parse(value).unwrap_err();
        assert!(err.to_string().contains("[INTERFACE].BINARY.IMPLEMENTATION"));
    }
}
