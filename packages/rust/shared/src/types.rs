//! Curriculum data model consumed by the assembly pipeline.
//!
//! A [`CurriculumContext`] is the fully resolved record handed over by the
//! metadata service (usually via its persisted `context.json`). The pipeline
//! never mutates a shared context: every document kind works on its own clone.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PacketError, Result};
use crate::ident::normalize_identifier;

// ---------------------------------------------------------------------------
// CurriculumContext
// ---------------------------------------------------------------------------

/// Root value passed through the pipeline for one curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumContext {
    /// Curriculum display name; its identifier names the output directory.
    pub curriculum_name: String,
    /// Short program name, used in the packet footer.
    pub program_name: String,
    /// Long program name, shown on the cover.
    #[serde(default)]
    pub program_long_name: String,
    /// Program time period (e.g. "Spring 2024").
    #[serde(default)]
    pub time_period: String,
    /// Chronological label, e.g. "Week 5".
    #[serde(default)]
    pub chron_info: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    /// Organization logo (raster).
    pub logo_path: PathBuf,
    /// Theme colors as hex strings without `#`.
    #[serde(default)]
    pub color_primary: String,
    #[serde(default)]
    pub color_primary_faded: String,
    #[serde(default)]
    pub color_secondary: String,
    #[serde(default)]
    pub core_readings: Vec<Reading>,
    #[serde(default)]
    pub further_readings: Vec<Reading>,
    #[serde(default)]
    pub cohorts: Vec<Cohort>,
    /// Facilitator guide supplied for this meeting only.
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub meeting_ta_guide_pdf: Option<PathBuf>,
    /// Organization-wide facilitator guide appended to every cohort guide.
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub base_ta_guide_pdf: Option<PathBuf>,
}

impl CurriculumContext {
    /// Load a context from its persisted JSON form.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PacketError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            PacketError::validation(format!("invalid curriculum context {}: {e}", path.display()))
        })
    }

    /// Identifier of this curriculum, used for its directory and packet name.
    pub fn curriculum_id(&self) -> String {
        normalize_identifier(&self.curriculum_name)
    }

    /// Check every core reading has something printable.
    ///
    /// Runs before any rendering so an invalid curriculum writes nothing.
    pub fn validate(&self) -> Result<()> {
        for reading in &self.core_readings {
            reading.validate()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A single reading (core or further).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub title: String,
    /// Optional section label, e.g. "Sections 1-3".
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub subsection: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub year: String,
    /// Link to the reading; may be empty.
    #[serde(default)]
    pub url: String,
    /// Read on a device rather than printed: rendered as a QR-code page.
    #[serde(default, deserialize_with = "bool_or_empty")]
    pub read_on_device: bool,
    /// Pre-trimmed page document for printed readings.
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub trimmed_pdf: Option<PathBuf>,
    /// Link thumbnail, derived during enrichment when absent.
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub thumbnail_path: Option<PathBuf>,
}

impl Reading {
    /// Identifier derived from the title.
    pub fn id(&self) -> String {
        normalize_identifier(&self.title)
    }

    /// A reading must be either pre-trimmed or read on a device.
    pub fn validate(&self) -> Result<()> {
        if self.trimmed_pdf.is_none() && !self.read_on_device {
            return Err(PacketError::validation(format!(
                "Reading {} has no trimmed pdf and is not labeled as read_on_device.",
                self.title
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cohort
// ---------------------------------------------------------------------------

/// A facilitator cohort; one guide packet is produced per cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    pub name: String,
    #[serde(default)]
    pub global_cohort_i: u32,
    #[serde(default)]
    pub num_members: u32,
}

impl Cohort {
    /// Identifier derived from the cohort name.
    pub fn id(&self) -> String {
        normalize_identifier(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

// The metadata service writes "" for absent attachments and text fields.

fn empty_string_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn empty_path_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(empty_string_as_none(deserializer)?.map(PathBuf::from))
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn bool_or_empty<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Null => Ok(false),
        serde_json::Value::String(s) if s.is_empty() => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected boolean, got {other}"
        ))),
    }
}
