// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipeline configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration:
//!
//! ```toml
//! [pipeline]
//! name = "classic-bridge"
//! log_level = "debug"
//!
//! [[packets]]
//! id = 0x6C
//! length = 19
//!
//! [[filters]]
//! direction = "outgoing"
//! type_id = 0x6C
//! conditions = [{ position = 6, expected = [0x03] }]
//! ```

use crate::catalog::PacketCatalog;
use crate::condition::ByteCondition;
use crate::engine::FilterRule;
use crate::envelope::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Packet length catalog.
    #[serde(default)]
    pub packets: Vec<PacketLengthConfig>,

    /// Static suppression rules installed at build time.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Pipeline name (for identification in logs).
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Default logger filter for `packetgate-replay`; `--log-level` and
    /// `RUST_LOG` override it.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_pipeline_name() -> String {
    "packetgate".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            log_level: default_log_level(),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketLengthConfig {
    pub id: u8,
    /// Fixed length in bytes, `0` for variable-length packets.
    pub length: u16,
}

/// One suppression rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub direction: Direction,
    pub type_id: u8,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

/// One byte condition; `length` defaults to `expected.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    pub expected: Vec<u8>,
}

impl ConditionConfig {
    pub fn to_condition(&self) -> ByteCondition {
        match self.length {
            Some(length) => {
                ByteCondition::with_length(self.position, length, self.expected.clone())
            }
            None => ByteCondition::new(self.position, self.expected.clone()),
        }
    }
}

impl FilterConfig {
    pub fn new(direction: Direction, type_id: u8) -> Self {
        Self {
            direction,
            type_id,
            conditions: Vec::new(),
        }
    }

    /// Add a condition.
    pub fn condition(mut self, position: usize, expected: impl Into<Vec<u8>>) -> Self {
        self.conditions.push(ConditionConfig {
            position,
            length: None,
            expected: expected.into(),
        });
        self
    }

    pub fn to_rule(&self) -> FilterRule {
        FilterRule::new(self.type_id)
            .conditions(self.conditions.iter().map(ConditionConfig::to_condition))
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.name.trim().is_empty() {
            return Err(ConfigError::Invalid("Pipeline name is empty".into()));
        }

        let mut seen = HashSet::new();
        for entry in &self.packets {
            if !seen.insert(entry.id) {
                return Err(ConfigError::Invalid(format!(
                    "Packet {:#04x} listed more than once",
                    entry.id
                )));
            }
        }

        for (i, filter) in self.filters.iter().enumerate() {
            for cond in &filter.conditions {
                if cond.expected.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "Filter {} has a condition with empty expected bytes",
                        i
                    )));
                }
                if let Some(length) = cond.length {
                    if length != cond.expected.len() {
                        return Err(ConfigError::Invalid(format!(
                            "Filter {} condition at {} has length {} but {} expected bytes",
                            i,
                            cond.position,
                            length,
                            cond.expected.len()
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn catalog(&self) -> PacketCatalog {
        PacketCatalog::from_entries(self.packets.iter().map(|p| (p.id, p.length)))
    }

    /// Set a catalog entry.
    pub fn packet(mut self, id: u8, length: u16) -> Self {
        self.packets.retain(|p| p.id != id);
        self.packets.push(PacketLengthConfig { id, length });
        self
    }

    /// Add a static filter.
    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.filters.push(filter);
        self
    }

    /// Configuration written by `gen-config`.
    pub fn example() -> Self {
        Self {
            pipeline: PipelineSection {
                name: "example-pipeline".into(),
                log_level: "info".into(),
            },
            ..Default::default()
        }
        .packet(0x02, 7)
        .packet(0x3C, 0)
        .packet(0x6C, 19)
        .packet(0x73, 2)
        .packet(0xB1, 0)
        .packet(0xD6, 0)
        .packet(0xEF, 21)
        // hide target cursor cancellations from the server
        .filter(FilterConfig::new(Direction::Outgoing, 0x6C).condition(6, [0x03]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_with_hex_ids() {
        let config = PipelineConfig::from_toml_str(
            r#"
[pipeline]
name = "bridge"

[[packets]]
id = 0x3C
length = 0

[[packets]]
id = 0x6C
length = 19

[[filters]]
direction = "outgoing"
type_id = 0x6C
conditions = [{ position = 6, expected = [0x03] }]
"#,
        )
        .expect("parse");

        assert_eq!(config.pipeline.name, "bridge");
        assert_eq!(config.pipeline.log_level, "info");
        let catalog = config.catalog();
        assert!(catalog.is_variable(0x3C));
        assert_eq!(catalog.length(0x6C), Some(19));
        assert_eq!(config.filters[0].direction, Direction::Outgoing);
        assert_eq!(config.filters[0].to_rule().condition_list().len(), 1);
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = PipelineConfig::from_toml_str("").expect("parse");
        assert_eq!(config.pipeline.name, "packetgate");
        assert!(config.packets.is_empty());
        assert!(config.filters.is_empty());
    }

    #[test]
    fn test_duplicate_packet_rejected() {
        let err = PipelineConfig::from_toml_str(
            "[[packets]]\nid = 1\nlength = 2\n[[packets]]\nid = 1\nlength = 3\n",
        )
        .expect_err("duplicate");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_condition_length_mismatch_rejected() {
        let config = PipelineConfig::default().filter(FilterConfig {
            direction: Direction::Incoming,
            type_id: 0x3C,
            conditions: vec![ConditionConfig {
                position: 19,
                length: Some(4),
                expected: vec![1, 2],
            }],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_expected_rejected() {
        let config = PipelineConfig::default()
            .filter(FilterConfig::new(Direction::Incoming, 0x3C).condition(1, Vec::new()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_direction_rejected() {
        let err = PipelineConfig::from_toml_str(
            "[[filters]]\ndirection = \"sideways\"\ntype_id = 1\n",
        )
        .expect_err("bad direction");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_example_survives_file_roundtrip() {
        let example = PipelineConfig::example();
        let text = example.to_toml_string().expect("serialize");

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(text.as_bytes()).expect("write");

        let loaded = PipelineConfig::from_file(file.path()).expect("load");
        assert_eq!(loaded, example);
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_file("/nonexistent/packetgate.toml").expect_err("missing");
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
