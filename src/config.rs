//! Configuration management
//!
//! Handles loading, parsing and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::control_mapping::{ControlMapping, MappingEntry};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,
    /// CSV file with additional `control,property` rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_csv: Option<String>,
}

/// MIDI device configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Input port name pattern (case-insensitive substring)
    pub input_port: String,
    /// Output port name pattern, defaults to `input_port`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    /// Outgoing MIDI channel (1-16)
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Abort when the device is absent instead of running unbound
    #[serde(default = "default_true")]
    pub require_device: bool,
}

impl MidiConfig {
    pub fn output_port(&self) -> &str {
        self.output_port.as_deref().unwrap_or(&self.input_port)
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;
        Ok(config)
    }

    /// Parse and validate YAML content
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.input_port.is_empty() {
            anyhow::bail!("MIDI input_port cannot be empty");
        }
        if self.midi.output_port.as_deref() == Some("") {
            anyhow::bail!("MIDI output_port cannot be empty");
        }
        if self.midi.channel == 0 || self.midi.channel > 16 {
            anyhow::bail!(
                "Invalid MIDI channel {} (must be 1-16)",
                self.midi.channel
            );
        }
        for entry in &self.mappings {
            if entry.property.is_empty() {
                anyhow::bail!("Control {} property name cannot be empty", entry.control);
            }
        }
        ControlMapping::from_entries(&self.mappings).context("Invalid control mappings")?;
        Ok(())
    }

    /// Build the control mapping from inline entries and the optional CSV file
    ///
    /// A relative CSV path is resolved against `base_dir` (the config file's
    /// directory).
    pub async fn control_mapping(&self, base_dir: &Path) -> Result<ControlMapping> {
        let mut entries = self.mappings.clone();
        if let Some(csv) = &self.mapping_csv {
            let path = base_dir.join(csv);
            entries.extend(ControlMapping::load_csv(&path).await?);
        }
        ControlMapping::from_entries(&entries).context("Invalid control mappings")
    }

    /// Outgoing channel, 0-based
    pub fn midi_channel(&self) -> u8 {
        self.midi.channel - 1
    }
}

fn default_channel() -> u8 { 1 }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
midi:
  input_port: nanoKONTROL
  channel: 2
mappings:
  - { control: 7, property: brightness }
  - { control: 64, property: invert }
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = AppConfig::parse(CONFIG).unwrap();
        assert_eq!(config.midi.input_port, "nanoKONTROL");
        assert_eq!(config.midi.output_port(), "nanoKONTROL");
        assert!(config.midi.require_device);
        assert_eq!(config.midi_channel(), 1);
        assert_eq!(config.mappings.len(), 2);
        assert!(config.mapping_csv.is_none());
    }

    #[test]
    fn test_rejects_invalid_channel() {
        let yaml = "midi:\n  input_port: x\n  channel: 17\n";
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[test]
    fn test_rejects_duplicate_controls() {
        let yaml = r#"
midi:
  input_port: x
mappings:
  - { control: 7, property: brightness }
  - { control: 7, property: zoom }
"#;
        let err = AppConfig::parse(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Control number 7 mapped more than once"));
    }

    #[test]
    fn test_rejects_empty_port() {
        assert!(AppConfig::parse("midi:\n  input_port: \"\"\n").is_err());
    }

    #[tokio::test]
    async fn test_load_with_mapping_csv() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "midi:\n  input_port: x\n  require_device: false\nmappings:\n  - { control: 7, property: brightness }\nmapping_csv: extra.csv\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("extra.csv"), "control,property\n8,zoom\n").unwrap();

        let config = AppConfig::load(config_path.to_str().unwrap()).await.unwrap();
        assert!(!config.midi.require_device);

        let mapping = config.control_mapping(dir.path()).await.unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.property(8), Some("zoom"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        assert!(AppConfig::load("/nonexistent/config.yaml").await.is_err());
    }
}
