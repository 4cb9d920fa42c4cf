use arch::FormatVersion;
use serde::{Deserialize, Serialize};

/// Options for one assembly unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsmConfig {
    /// Format the unit is assembled for. Fixed for the unit's lifetime.
    pub version: FormatVersion,
    /// Write label names and offsets into the symbol section.
    pub emit_symbols: bool,
    /// Write instruction source positions into the symbol section.
    pub emit_spans: bool,
    /// Upper bound on layout passes, below the bound derived from the code.
    pub max_layout_passes: Option<usize>,
    /// Append `; comment` to listing lines.
    pub comments: bool,
    /// Prefix of instruction lines in listings.
    pub indent: String,
}

impl Default for AsmConfig {
    fn default() -> Self {
        Self {
            version: FormatVersion::default(),
            emit_symbols: true,
            emit_spans: true,
            max_layout_passes: None,
            comments: false,
            indent: "    ".to_string(),
        }
    }
}

impl AsmConfig {
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let config = AsmConfig {
            version: FormatVersion::V3,
            max_layout_passes: Some(4),
            comments: true,
            ..AsmConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(AsmConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = AsmConfig::from_json(r#"{ "version": "V1", "emit_spans": false }"#).unwrap();
        assert_eq!(config.version, FormatVersion::V1);
        assert!(!config.emit_spans);
        assert!(config.emit_symbols);
        assert_eq!(config.indent, "    ");
    }

    #[test]
    fn unknown_version_rejected() {
        assert!(AsmConfig::from_json(r#"{ "version": "V9" }"#).is_err());
    }
}
