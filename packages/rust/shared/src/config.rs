//! Application configuration for PacketMaker.
//!
//! User config lives at `~/.packetmaker/packetmaker.toml`.
//! CLI flags override config file values, which override defaults.
//! The loaded value is threaded explicitly through the pipeline; nothing
//! reads configuration ambiently.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PacketError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "packetmaker.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".packetmaker";

// ---------------------------------------------------------------------------
// Config structs (matching packetmaker.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory; each curriculum gets `<output_dir>/<curriculum-id>/`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Placeholder page document used when a conversion fails.
    #[serde(default = "default_error_pdf")]
    pub error_pdf: PathBuf,

    /// Replace artifacts left by a previous run.
    #[serde(default)]
    pub overwrite: bool,

    /// Template per document kind.
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Which parts of a curriculum to produce.
    #[serde(default)]
    pub generate: GenerateConfig,

    /// External document converter.
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Running footer stamped on the packet.
    #[serde(default)]
    pub footer: FooterConfig,

    /// Link thumbnail fetching.
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    /// Registered curricula.
    #[serde(default)]
    pub curricula: Vec<CurriculumEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            error_pdf: default_error_pdf(),
            overwrite: false,
            templates: TemplatesConfig::default(),
            generate: GenerateConfig::default(),
            converter: ConverterConfig::default(),
            footer: FooterConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            curricula: Vec::new(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_error_pdf() -> PathBuf {
    PathBuf::from("templates/ERROR.pdf")
}

/// `[templates]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    pub cover: PathBuf,
    pub device_reading: PathBuf,
    pub further_reading: PathBuf,
    pub ta_guide: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            cover: PathBuf::from("templates/cover.fodt"),
            device_reading: PathBuf::from("templates/device_reading.fodt"),
            further_reading: PathBuf::from("templates/further_reading.fodt"),
            ta_guide: PathBuf::from("templates/ta_guide.fodt"),
        }
    }
}

/// `[generate]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    #[serde(default = "default_true")]
    pub cover: bool,
    #[serde(default = "default_true")]
    pub device_readings: bool,
    #[serde(default = "default_true")]
    pub further_readings: bool,
    #[serde(default = "default_true")]
    pub packet: bool,
    #[serde(default)]
    pub ta_guides: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            cover: true,
            device_readings: true,
            further_readings: true,
            packet: true,
            ta_guides: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[converter]` section.
///
/// `args` may contain `{input}`, `{outdir}` and `{output}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_converter_program")]
    pub program: String,
    #[serde(default = "default_converter_args")]
    pub args: Vec<String>,
    /// Upper bound on a single conversion.
    #[serde(default = "default_converter_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: default_converter_program(),
            args: default_converter_args(),
            timeout_secs: default_converter_timeout(),
        }
    }
}

fn default_converter_program() -> String {
    "soffice".into()
}
fn default_converter_args() -> Vec<String> {
    ["--headless", "--convert-to", "pdf", "--outdir", "{outdir}", "{input}"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_converter_timeout() -> u64 {
    300
}

/// `[footer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FooterConfig {
    /// `{program}`, `{i}` and `{n}` are substituted.
    #[serde(default = "default_footer_template")]
    pub template: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Baseline distance from the bottom edge, in points.
    #[serde(default = "default_bottom_margin")]
    pub bottom_margin: f32,
    #[serde(default)]
    pub skip: FooterSkip,
}

impl Default for FooterConfig {
    fn default() -> Self {
        Self {
            template: default_footer_template(),
            font_size: default_font_size(),
            bottom_margin: default_bottom_margin(),
            skip: FooterSkip::default(),
        }
    }
}

fn default_footer_template() -> String {
    "{program} Readings — Page {i} of {n}".into()
}
fn default_font_size() -> f32 {
    8.0
}
fn default_bottom_margin() -> f32 {
    20.0
}

/// Which leading pages are left without a footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FooterSkip {
    /// A fixed set of 1-based page numbers.
    Fixed { pages: BTreeSet<u32> },
    /// Every page of the (padded) cover section.
    CoverSection,
}

impl Default for FooterSkip {
    fn default() -> Self {
        Self::Fixed {
            pages: BTreeSet::from([1, 2]),
        }
    }
}

impl FooterSkip {
    /// Resolve the skip set given the page count of the padded cover section.
    pub fn resolve(&self, cover_section_pages: u32) -> BTreeSet<u32> {
        match self {
            Self::Fixed { pages } => pages.clone(),
            Self::CoverSection => (1..=cover_section_pages).collect(),
        }
    }
}

/// `[thumbnails]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Fetch favicons for readings without a thumbnail.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_thumbnail_timeout")]
    pub timeout_secs: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_thumbnail_timeout(),
        }
    }
}

fn default_thumbnail_timeout() -> u64 {
    10
}

/// `[[curricula]]` entry: a curriculum known to this installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumEntry {
    /// Display name.
    pub name: String,
    /// Record identifier in the metadata service.
    #[serde(default)]
    pub record_id: String,
    /// Resolved context JSON written by the metadata service.
    pub context: PathBuf,
    /// Include this curriculum in `run`.
    #[serde(default = "default_true")]
    pub make_packet: bool,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.packetmaker/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| PacketError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.packetmaker/packetmaker.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PacketError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PacketError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PacketError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PacketError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PacketError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the templates and placeholder page the enabled steps need exist.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut required: Vec<(&str, &Path)> = vec![("error_pdf", &config.error_pdf)];
    if config.generate.cover {
        required.push(("templates.cover", &config.templates.cover));
    }
    if config.generate.device_readings {
        required.push(("templates.device_reading", &config.templates.device_reading));
    }
    if config.generate.further_readings {
        required.push(("templates.further_reading", &config.templates.further_reading));
    }
    if config.generate.ta_guides {
        required.push(("templates.ta_guide", &config.templates.ta_guide));
    }

    for (key, path) in required {
        if !path.is_file() {
            return Err(PacketError::config(format!(
                "{key} points to {}, which does not exist",
                path.display()
            )));
        }
    }
    Ok(())
}
