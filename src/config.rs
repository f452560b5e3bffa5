//! Configuration file support
//!
//! Supports loading configuration from TOML files. Every section and field
//! has a default, so an empty file is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// Root configuration structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection and timing analysis settings
    pub analysis: AnalysisSettings,

    /// Frame processing settings
    pub pipeline: PipelineSettings,

    /// Output settings
    pub report: ReportSettings,
}

/// Reference point for relative connection times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// First packet of the first-discovered connection
    #[default]
    FirstConnection,
    /// Earliest timestamp among all accepted packets
    Earliest,
}

/// How packets are matched to existing connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    /// Scan connections in discovery order
    #[default]
    Linear,
    /// Hash map keyed by the unordered endpoint pair
    Hashed,
}

/// How sequence numbers are matched to later acknowledgments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RttMatcherKind {
    /// Forward scan from every packet
    #[default]
    NestedScan,
    /// Acknowledgment positions indexed by value
    SeqIndex,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub anchor: AnchorPolicy,
    pub resolver: ResolverKind,
    pub rtt_matcher: RttMatcherKind,
    /// Abort when a connection grows past this many packets (unbounded if unset)
    pub max_packets_per_connection: Option<usize>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            anchor: AnchorPolicy::FirstConnection,
            resolver: ResolverKind::Linear,
            rtt_matcher: RttMatcherKind::NestedScan,
            max_packets_per_connection: None,
        }
    }
}

/// What to do with a frame that fails to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Report the frame and continue
    #[default]
    Skip,
    /// Stop at the first rejected frame
    Abort,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub error_policy: ErrorPolicy,
    /// Read frames on a separate thread
    pub threaded: bool,
    /// Frames buffered between reader and analyzer
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::Skip,
            threaded: false,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub format: ReportFormat,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TraceError::Config(format!("Failed to read config file: {}", e))
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TraceError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to a TOML string
    pub fn to_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TraceError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Reject settings the analyzer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.channel_capacity == 0 {
            return Err(TraceError::Config("pipeline.channel_capacity must be at least 1".into()));
        }
        if self.analysis.max_packets_per_connection == Some(0) {
            return Err(TraceError::Config(
                "analysis.max_packets_per_connection must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.analysis.anchor, AnchorPolicy::FirstConnection);
        assert_eq!(config.pipeline.error_policy, ErrorPolicy::Skip);
        assert_eq!(config.pipeline.channel_capacity, 1024);
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::from_str(
            r#"
            [analysis]
            anchor = "earliest"
            resolver = "hashed"
            rtt_matcher = "seq_index"
            max_packets_per_connection = 1000

            [pipeline]
            error_policy = "abort"
            threaded = true

            [report]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.analysis.anchor, AnchorPolicy::Earliest);
        assert_eq!(config.analysis.resolver, ResolverKind::Hashed);
        assert_eq!(config.analysis.rtt_matcher, RttMatcherKind::SeqIndex);
        assert_eq!(config.analysis.max_packets_per_connection, Some(1000));
        assert_eq!(config.pipeline.error_policy, ErrorPolicy::Abort);
        assert!(config.pipeline.threaded);
        assert_eq!(config.pipeline.channel_capacity, 1024);
        assert_eq!(config.report.format, ReportFormat::Json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_str("[analysis]\nanchor = \"latest\"").is_err());
        assert!(Config::from_str("[pipeline]\nchannel_capacity = 0").is_err());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let mut config = Config::default();
        config.analysis.resolver = ResolverKind::Hashed;

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), config.to_string().unwrap()).unwrap();

        let loaded = Config::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
