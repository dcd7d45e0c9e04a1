//! Packet and guide assembly, plus the per-curriculum run manifest.
//!
//! Takes the page documents produced by the renderers, merges them with
//! duplex padding, stamps the running footer on the packet, and records
//! what was produced in `manifest.json`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use packetmaker_pdf::{FooterStyle, page_count, stamp_footer};
use packetmaker_shared::{FooterConfig, PacketError, Reading, Result};

use crate::enrichment::DocumentKind;
use crate::renderer::{DocumentArtifact, DocumentState};

// ---------------------------------------------------------------------------
// PacketAssembly
// ---------------------------------------------------------------------------

/// Ordered page documents for one merged output; `None` entries are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketAssembly {
    parts: Vec<Option<PathBuf>>,
}

impl PacketAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, part: Option<PathBuf>) {
        self.parts.push(part);
    }

    pub fn parts(&self) -> &[Option<PathBuf>] {
        &self.parts
    }

    /// Merge the parts into `output`, padding every section to an even length.
    pub fn merge_into(self, output: &Path) -> Result<PathBuf> {
        packetmaker_pdf::merge(&self.parts, output, true)
    }
}

// ---------------------------------------------------------------------------
// Reading packet
// ---------------------------------------------------------------------------

/// Inputs for the reading packet of one curriculum.
#[derive(Debug, Clone)]
pub struct PacketPlan<'a> {
    pub program_name: &'a str,
    pub cover: Option<&'a Path>,
    /// Core readings in declared order; device readings already point at their rendered page.
    pub readings: &'a [Reading],
    /// Rendered device-reading pages, in rendering order.
    pub device_readings: &'a [PathBuf],
    pub further: Option<&'a Path>,
}

/// Merge cover, core readings, device readings and further readings into `output`, then stamp the footer.
#[instrument(skip_all, fields(output = %output.display(), readings = plan.readings.len()))]
pub fn assemble_packet(plan: &PacketPlan<'_>, footer: &FooterConfig, output: &Path) -> Result<PathBuf> {
    let mut assembly = PacketAssembly::new();
    assembly.push(plan.cover.map(Path::to_path_buf));
    for reading in plan.readings {
        let trimmed = reading.trimmed_pdf.clone().ok_or_else(|| {
            PacketError::validation(format!(
                "Reading {} has no page document to include in the packet.",
                reading.title
            ))
        })?;
        assembly.push(Some(trimmed));
    }
    for page in plan.device_readings {
        assembly.push(Some(page.clone()));
    }
    assembly.push(plan.further.map(Path::to_path_buf));

    let merged = assembly.merge_into(output)?;

    let cover_section = match plan.cover {
        Some(cover) => padded(page_count(cover)?),
        None => 0,
    };
    let skip: BTreeSet<u32> = footer.skip.resolve(cover_section);
    let template = footer.template.replace("{program}", plan.program_name);
    let style = FooterStyle {
        font_size: footer.font_size,
        bottom_margin: footer.bottom_margin,
    };
    debug!(?skip, %template, "stamping packet footer");

    let packet = stamp_footer(&merged, &merged, &template, &skip, &style)?;
    info!(path = %packet.display(), "packet assembled");
    Ok(packet)
}

fn padded(pages: u32) -> u32 {
    pages + pages % 2
}

// ---------------------------------------------------------------------------
// Facilitator guides
// ---------------------------------------------------------------------------

/// Merge a cohort's rendered guide with the supplied meeting and base guides.
#[instrument(skip_all, fields(output = %output.display()))]
pub fn assemble_guide(
    guide: &Path,
    meeting_guide: Option<&Path>,
    base_guide: Option<&Path>,
    output: &Path,
) -> Result<PathBuf> {
    if base_guide.is_none() {
        warn!("no base facilitator guide supplied");
    }

    let mut assembly = PacketAssembly::new();
    assembly.push(Some(guide.to_path_buf()));
    assembly.push(meeting_guide.map(Path::to_path_buf));
    assembly.push(base_guide.map(Path::to_path_buf));

    let merged = assembly.merge_into(output)?;
    info!(path = %merged.display(), "guide assembled");
    Ok(merged)
}

// ---------------------------------------------------------------------------
// Run manifest
// ---------------------------------------------------------------------------

/// Record of one generated document.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    pub kind: DocumentKind,
    pub intermediate: PathBuf,
    pub page_document: PathBuf,
    pub state: DocumentState,
    /// SHA-256 of the page document, if it could be read.
    pub sha256: Option<String>,
}

impl ArtifactRecord {
    pub fn from_artifact(artifact: &DocumentArtifact) -> Self {
        Self {
            kind: artifact.kind,
            intermediate: artifact.intermediate.clone(),
            page_document: artifact.page_document.clone(),
            state: artifact.state,
            sha256: file_sha256(&artifact.page_document),
        }
    }
}

/// Summary of one curriculum run, written to `<curriculum dir>/manifest.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: String,
    pub curriculum_name: String,
    pub curriculum_id: String,
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactRecord>,
    pub packet: Option<PathBuf>,
    pub guides: Vec<PathBuf>,
}

impl RunManifest {
    /// Number of documents that fell back to the placeholder page.
    pub fn failed_count(&self) -> usize {
        self.artifacts
            .iter()
            .filter(|a| a.state == DocumentState::Failed)
            .count()
    }
}

/// Write `value` as pretty JSON via a temporary file and a rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PacketError::validation(format!("JSON serialization failed: {e}")))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| PacketError::io(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output.json".to_string());
    let temp = dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| PacketError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| PacketError::io(path, e))?;

    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

fn file_sha256(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetmaker_pdf::test_support::{page_texts, write_test_pdf};
    use packetmaker_shared::FooterSkip;

    fn pdf(dir: &Path, name: &str, pages: u32) -> PathBuf {
        let path = dir.join(format!("{name}.pdf"));
        write_test_pdf(&path, pages, name);
        path
    }

    fn trimmed(title: &str, path: &Path) -> Reading {
        Reading {
            title: title.into(),
            subsection: None,
            author: String::new(),
            year: String::new(),
            url: String::new(),
            read_on_device: false,
            trimmed_pdf: Some(path.to_path_buf()),
            thumbnail_path: None,
        }
    }

    #[test]
    fn packet_orders_sections_and_stamps_footer() {
        let dir = tempfile::tempdir().unwrap();
        let cover = pdf(dir.path(), "cover", 1);
        let readings = vec![
            trimmed("One", &pdf(dir.path(), "one", 3)),
            trimmed("Two", &pdf(dir.path(), "two", 2)),
        ];
        let further = pdf(dir.path(), "further", 1);
        let out = dir.path().join("aisf.pdf");

        let plan = PacketPlan {
            program_name: "AISF",
            cover: Some(&cover),
            readings: &readings,
            device_readings: &[],
            further: Some(&further),
        };
        assemble_packet(&plan, &FooterConfig::default(), &out).unwrap();

        let texts = page_texts(&out);
        // cover+pad, one(3)+pad, two(2), further+pad
        assert_eq!(texts.len(), 10);
        assert_eq!(texts[0], vec!["cover 1"]);
        assert!(texts[1].is_empty());
        assert_eq!(texts[2][0], "one 1");
        assert!(texts[2][1].starts_with("AISF Readings"));
        assert!(texts[2][1].ends_with("Page 3 of 10"));
        assert_eq!(texts[6][0], "two 1");
        assert!(texts[6][1].ends_with("Page 7 of 10"));
        assert_eq!(texts[8][0], "further 1");
    }

    #[test]
    fn device_section_follows_core_readings() {
        let dir = tempfile::tempdir().unwrap();
        let device = pdf(dir.path(), "device", 1);
        let readings = vec![
            trimmed("One", &pdf(dir.path(), "one", 2)),
            trimmed("Device", &device),
        ];
        let further = pdf(dir.path(), "further", 2);
        let out = dir.path().join("packet.pdf");

        let plan = PacketPlan {
            program_name: "P",
            cover: None,
            readings: &readings,
            device_readings: std::slice::from_ref(&device),
            further: Some(&further),
        };
        assemble_packet(&plan, &FooterConfig::default(), &out).unwrap();

        let firsts: Vec<_> = page_texts(&out)
            .into_iter()
            .map(|page| page.first().cloned().unwrap_or_default())
            .collect();
        // one(2), device+pad in its slot, device+pad in the device section, further(2)
        assert_eq!(firsts.len(), 8);
        assert_eq!(firsts[0], "one 1");
        assert_eq!(firsts[2], "device 1");
        assert_eq!(firsts[4], "device 1");
        assert_eq!(firsts[6], "further 1");
    }

    #[test]
    fn cover_section_skip_follows_cover_length() {
        let dir = tempfile::tempdir().unwrap();
        let cover = pdf(dir.path(), "cover", 3);
        let readings = vec![trimmed("One", &pdf(dir.path(), "one", 2))];
        let out = dir.path().join("packet.pdf");
        let footer = FooterConfig {
            template: "{i}/{n}".into(),
            skip: FooterSkip::CoverSection,
            ..FooterConfig::default()
        };

        let plan = PacketPlan {
            program_name: "P",
            cover: Some(&cover),
            readings: &readings,
            device_readings: &[],
            further: None,
        };
        assemble_packet(&plan, &footer, &out).unwrap();

        let texts = page_texts(&out);
        assert_eq!(texts.len(), 6);
        for page in &texts[..4] {
            assert!(!page.iter().any(|t| t.contains('/')), "cover section stamped: {page:?}");
        }
        assert_eq!(texts[4].last().unwrap(), "5/6");
    }

    #[test]
    fn reading_without_page_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut reading = trimmed("Orphan", dir.path());
        reading.trimmed_pdf = None;
        let plan = PacketPlan {
            program_name: "P",
            cover: None,
            readings: std::slice::from_ref(&reading),
            device_readings: &[],
            further: None,
        };
        let err = assemble_packet(&plan, &FooterConfig::default(), &dir.path().join("p.pdf")).unwrap_err();
        assert!(err.to_string().contains("Orphan"));
    }

    #[test]
    fn guide_merges_in_fixed_order_and_skips_missing_meeting_guide() {
        let dir = tempfile::tempdir().unwrap();
        let guide = pdf(dir.path(), "guide", 2);
        let base = pdf(dir.path(), "base", 1);
        let out = dir.path().join("cohort_a n6.pdf");

        assemble_guide(&guide, None, Some(&base), &out).unwrap();

        let texts = page_texts(&out);
        assert_eq!(texts.len(), 4);
        assert_eq!(texts[0], vec!["guide 1"]);
        assert_eq!(texts[2], vec!["base 1"]);
    }

    #[test]
    fn json_is_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        write_json_atomic(&path, &serde_json::json!({"ok": true})).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["ok"], true);
        assert!(!dir.path().join(".manifest.json.tmp").exists());
    }

    #[test]
    fn sha256_of_missing_file_is_none() {
        assert_eq!(file_sha256(Path::new("/definitely/not/here.pdf")), None);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
