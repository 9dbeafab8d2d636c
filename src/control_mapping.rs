//! Control mapping between MIDI control numbers and state properties
//!
//! A mapping is a validated 1:1 table. It can be built in code, from the YAML
//! config entries, or from a CSV file with a `control,property` header.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{StateError, StateResult};
use crate::midi::MAX_7BIT;

/// One `control -> property` entry as found in config and CSV files
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MappingEntry {
    pub control: u8,
    pub property: String,
}

/// Bidirectional control number <-> property name table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlMapping {
    by_control: HashMap<u8, String>,
    by_property: HashMap<String, u8>,
}

impl ControlMapping {
    /// Build a mapping, rejecting duplicate controls or properties
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (u8, S)>) -> StateResult<Self> {
        let mut mapping = Self::default();
        for (control, property) in entries {
            mapping.insert(control, property.into())?;
        }
        Ok(mapping)
    }

    /// Start a mapping declared control by control
    pub fn builder() -> ControlMappingBuilder {
        ControlMappingBuilder::default()
    }

    /// Build from config/CSV entries
    pub fn from_entries(entries: &[MappingEntry]) -> StateResult<Self> {
        Self::new(entries.iter().map(|e| (e.control, e.property.clone())))
    }

    fn insert(&mut self, control: u8, property: String) -> StateResult<()> {
        if control > MAX_7BIT {
            return Err(StateError::InvalidControl(control));
        }
        if self.by_control.contains_key(&control) {
            return Err(StateError::DuplicateControl(control));
        }
        if self.by_property.contains_key(&property) {
            return Err(StateError::DuplicateMappedProperty(property));
        }
        self.by_property.insert(property.clone(), control);
        self.by_control.insert(control, property);
        Ok(())
    }

    /// Property bound to a control number
    pub fn property(&self, control: u8) -> Option<&str> {
        self.by_control.get(&control).map(|s| s.as_str())
    }

    /// Control number bound to a property
    pub fn control(&self, property: &str) -> Option<u8> {
        self.by_property.get(property).copied()
    }

    /// All `(control, property)` pairs, ordered by control number
    pub fn entries(&self) -> Vec<(u8, &str)> {
        let mut entries: Vec<(u8, &str)> = self
            .by_control
            .iter()
            .map(|(control, property)| (*control, property.as_str()))
            .collect();
        entries.sort_by_key(|(control, _)| *control);
        entries
    }

    pub fn len(&self) -> usize {
        self.by_control.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_control.is_empty()
    }

    /// Parse CSV content with a `control,property` header
    pub fn parse_csv(csv_content: &str) -> Result<Vec<MappingEntry>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(csv_content.as_bytes());

        let mut entries = Vec::new();
        for result in reader.deserialize() {
            let entry: MappingEntry = result.context("Failed to parse CSV row")?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Load mapping entries from a CSV file
    pub async fn load_csv(path: impl AsRef<Path>) -> Result<Vec<MappingEntry>> {
        let path = path.as_ref();
        let csv_content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

        let entries = Self::parse_csv(&csv_content)
            .with_context(|| format!("Invalid mapping CSV: {}", path.display()))?;
        info!("Loaded {} control mappings from {}", entries.len(), path.display());
        Ok(entries)
    }
}

/// Collects `control(no, property)` declarations; validation happens in `build`
#[derive(Debug, Default)]
pub struct ControlMappingBuilder {
    entries: Vec<(u8, String)>,
}

impl ControlMappingBuilder {
    pub fn control(mut self, no: u8, property: &str) -> Self {
        self.entries.push((no, property.to_string()));
        self
    }

    pub fn build(self) -> StateResult<ControlMapping> {
        ControlMapping::new(self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_ways() {
        let mapping = ControlMapping::builder()
            .control(7, "brightness")
            .control(64, "invert")
            .build()
            .unwrap();

        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.property(7), Some("brightness"));
        assert_eq!(mapping.control("invert"), Some(64));
        assert_eq!(mapping.property(8), None);
        assert_eq!(mapping.control("zoom"), None);
        assert_eq!(mapping.entries(), vec![(7, "brightness"), (64, "invert")]);
    }

    #[test]
    fn test_duplicate_control_fails() {
        let err = ControlMapping::new([(7, "brightness"), (7, "zoom")])
            .err()
            .unwrap();
        assert!(matches!(err, StateError::DuplicateControl(7)));
    }

    #[test]
    fn test_duplicate_property_fails() {
        let err = ControlMapping::builder()
            .control(1, "zoom")
            .control(2, "zoom")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, StateError::DuplicateMappedProperty(p) if p == "zoom"));
    }

    #[test]
    fn test_control_out_of_range_fails() {
        let err = ControlMapping::new([(128, "zoom")]).err().unwrap();
        assert!(matches!(err, StateError::InvalidControl(128)));
    }

    #[test]
    fn test_parse_csv() {
        let csv = "control,property\n7, brightness\n64,invert\n";
        let entries = ControlMapping::parse_csv(csv).unwrap();
        assert_eq!(
            entries,
            vec![
                MappingEntry {
                    control: 7,
                    property: "brightness".to_string()
                },
                MappingEntry {
                    control: 64,
                    property: "invert".to_string()
                },
            ]
        );

        let mapping = ControlMapping::from_entries(&entries).unwrap();
        assert_eq!(mapping.property(7), Some("brightness"));
    }

    #[test]
    fn test_parse_csv_rejects_bad_rows() {
        assert!(ControlMapping::parse_csv("control,property\nseven,brightness\n").is_err());
        assert!(ControlMapping::parse_csv("control,property\n300,brightness\n").is_err());
    }

    #[tokio::test]
    async fn test_load_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.csv");
        std::fs::write(&path, "control,property\n16,zoom\n").unwrap();

        let entries = ControlMapping::load_csv(&path).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].control, 16);
    }
}
