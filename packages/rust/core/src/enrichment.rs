//! Enrichment registry: per-kind derivation of render contexts.
//!
//! Every document kind takes its own owned copy of the curriculum context and
//! returns a new, kind-specific render context. The base curriculum fields
//! are carried through unchanged; each kind adds only its documented keys:
//!
//! | Kind            | Added keys                          |
//! |-----------------|-------------------------------------|
//! | Cover           | `logo`, `styled_readings`           |
//! | DeviceReading   | `logo`, `device_reading`            |
//! | Further         | `logo`, `further_links`             |
//! | Guide           | `logo`, `cohort`                    |
//!
//! Image paths in a render context are relative to the artifact directory,
//! which is where the rendered document (and the converter) lives.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use packetmaker_assets::{FaviconFetcher, make_qr_code};
use packetmaker_shared::{Cohort, CurriculumContext, PacketError, Reading, Result};

/// Logo width on full-page documents (cover, guide).
const LOGO_LARGE_CM: f32 = 10.0;
/// Logo width on link pages (device reading, further readings).
const LOGO_SMALL_CM: f32 = 2.0;
/// Printed QR code edge length.
const QR_CODE_CM: f32 = 3.0;
/// Printed thumbnail edge length.
const THUMBNAIL_CM: f32 = 3.0;

const QR_CODE_DIR: &str = "qr_codes";
const THUMBNAIL_DIR: &str = "thumbnails";

// ---------------------------------------------------------------------------
// Document kinds
// ---------------------------------------------------------------------------

/// The four kinds of generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Cover,
    DeviceReading,
    Further,
    Guide,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::DeviceReading => "device_reading",
            Self::Further => "further",
            Self::Guide => "guide",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Render context building blocks
// ---------------------------------------------------------------------------

/// An image placed in a document at a fixed printed size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedImage {
    /// Path relative to the artifact directory.
    pub path: PathBuf,
    pub width_cm: f32,
    pub height_cm: f32,
}

/// A run of text in a theme color (hex, no `#`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyledRun {
    pub text: String,
    pub color: String,
}

/// A core reading as listed on the cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyledReading {
    pub title: StyledRun,
    /// `"\n(<subsection>)"`, or empty text when the reading has none.
    pub subsection: StyledRun,
    /// `"(<author>, <year>)"`.
    pub author_year: StyledRun,
}

/// A reading with its link presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedReading {
    #[serde(flatten)]
    pub reading: Reading,
    /// Identifier derived from the title; names the QR code and thumbnail files.
    pub id: String,
    /// URL without scheme and leading `www.`; empty when there is no URL.
    pub truncated_url: String,
    pub qr_code: Option<EmbeddedImage>,
    pub thumbnail: Option<EmbeddedImage>,
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// What a document kind needs to be enriched.
#[derive(Debug, Clone)]
pub enum EnrichmentInput {
    Cover(CurriculumContext),
    DeviceReading {
        context: CurriculumContext,
        reading: Reading,
    },
    Further(CurriculumContext),
    Guide {
        context: CurriculumContext,
        cohort: Cohort,
    },
}

impl EnrichmentInput {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Cover(_) => DocumentKind::Cover,
            Self::DeviceReading { .. } => DocumentKind::DeviceReading,
            Self::Further(_) => DocumentKind::Further,
            Self::Guide { .. } => DocumentKind::Guide,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverContext {
    #[serde(flatten)]
    pub base: CurriculumContext,
    pub logo: EmbeddedImage,
    pub styled_readings: Vec<StyledReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReadingContext {
    #[serde(flatten)]
    pub base: CurriculumContext,
    pub logo: EmbeddedImage,
    pub device_reading: LinkedReading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FurtherContext {
    #[serde(flatten)]
    pub base: CurriculumContext,
    pub logo: EmbeddedImage,
    pub further_links: Vec<LinkedReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuideContext {
    #[serde(flatten)]
    pub base: CurriculumContext,
    pub logo: EmbeddedImage,
    pub cohort: Cohort,
}

/// The context a template is rendered with. Serializes as the inner context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderContext {
    Cover(CoverContext),
    DeviceReading(DeviceReadingContext),
    Further(FurtherContext),
    Guide(GuideContext),
}

impl RenderContext {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Cover(_) => DocumentKind::Cover,
            Self::DeviceReading(_) => DocumentKind::DeviceReading,
            Self::Further(_) => DocumentKind::Further,
            Self::Guide(_) => DocumentKind::Guide,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Dispatches each document kind to its enrichment function.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentRegistry {
    thumbnails: Option<FaviconFetcher>,
}

impl EnrichmentRegistry {
    /// A registry that fetches link thumbnails with `thumbnails`, if given.
    pub fn new(thumbnails: Option<FaviconFetcher>) -> Self {
        Self { thumbnails }
    }

    /// Enrich `input` for rendering into `artifact_dir`.
    ///
    /// Derived images (logo copy, QR codes, thumbnails) are written under
    /// `artifact_dir`. Link assets are best-effort: a failure leaves the
    /// corresponding field empty.
    #[instrument(skip_all, fields(kind = %input.kind(), dir = %artifact_dir.display()))]
    pub async fn enrich(&self, input: EnrichmentInput, artifact_dir: &Path) -> Result<RenderContext> {
        let context = match input {
            EnrichmentInput::Cover(base) => {
                let logo = embed_logo(&base.logo_path, artifact_dir, LOGO_LARGE_CM)?;
                let styled_readings = style_readings(&base);
                RenderContext::Cover(CoverContext {
                    base,
                    logo,
                    styled_readings,
                })
            }
            EnrichmentInput::DeviceReading { context, reading } => {
                let logo = embed_logo(&context.logo_path, artifact_dir, LOGO_SMALL_CM)?;
                let device_reading = self.link_reading(reading, artifact_dir).await;
                RenderContext::DeviceReading(DeviceReadingContext {
                    base: context,
                    logo,
                    device_reading,
                })
            }
            EnrichmentInput::Further(base) => {
                let logo = embed_logo(&base.logo_path, artifact_dir, LOGO_SMALL_CM)?;
                let mut further_links = Vec::with_capacity(base.further_readings.len());
                for reading in base.further_readings.iter().cloned() {
                    further_links.push(self.link_reading(reading, artifact_dir).await);
                }
                RenderContext::Further(FurtherContext {
                    base,
                    logo,
                    further_links,
                })
            }
            EnrichmentInput::Guide { context, cohort } => {
                let logo = embed_logo(&context.logo_path, artifact_dir, LOGO_LARGE_CM)?;
                RenderContext::Guide(GuideContext {
                    base: context,
                    logo,
                    cohort,
                })
            }
        };
        debug!("enriched context");
        Ok(context)
    }

    /// Attach the display URL, QR code and thumbnail of one reading.
    async fn link_reading(&self, reading: Reading, artifact_dir: &Path) -> LinkedReading {
        let id = reading.id();
        let url = reading.url.trim().to_string();
        if url.is_empty() {
            return LinkedReading {
                reading,
                id,
                truncated_url: String::new(),
                qr_code: None,
                thumbnail: None,
            };
        }

        let qr_code = match make_qr_code(&url, &id, &artifact_dir.join(QR_CODE_DIR)) {
            Ok(path) => Some(square_image(artifact_dir, &path, QR_CODE_CM)),
            Err(e) => {
                warn!(reading = %reading.title, error = %e, "no QR code for reading");
                None
            }
        };

        let thumbnail_source = match (&reading.thumbnail_path, &self.thumbnails) {
            (Some(existing), _) => Some(existing.clone()),
            (None, Some(fetcher)) => {
                fetcher
                    .fetch(&url, &id, &artifact_dir.join(THUMBNAIL_DIR))
                    .await
            }
            (None, None) => None,
        };
        let thumbnail = thumbnail_source
            .and_then(|path| localize(&path, artifact_dir))
            .map(|path| square_image(artifact_dir, &path, THUMBNAIL_CM));

        LinkedReading {
            reading,
            id,
            truncated_url: truncate_url(&url),
            qr_code,
            thumbnail,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strip the scheme and a leading `www.` for display.
pub fn truncate_url(url: &str) -> String {
    let without_scheme = match Url::parse(url) {
        Ok(parsed) => url
            .strip_prefix(parsed.scheme())
            .and_then(|rest| rest.strip_prefix("://"))
            .unwrap_or(url),
        Err(_) => url,
    };
    without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme)
        .to_string()
}

/// Cover listing: title, optional subsection and "(author, year)" in the faded primary color.
fn style_readings(context: &CurriculumContext) -> Vec<StyledReading> {
    let color = &context.color_primary_faded;
    let run = |text: String| StyledRun {
        text,
        color: color.clone(),
    };
    context
        .core_readings
        .iter()
        .map(|reading| StyledReading {
            title: run(reading.title.clone()),
            subsection: run(
                reading
                    .subsection
                    .as_deref()
                    .map(|s| format!("\n({s})"))
                    .unwrap_or_default(),
            ),
            author_year: run(format!("({}, {})", reading.author, reading.year)),
        })
        .collect()
}

/// Copy the logo next to the document and size it to `width_cm`, keeping its aspect ratio.
fn embed_logo(logo: &Path, artifact_dir: &Path, width_cm: f32) -> Result<EmbeddedImage> {
    let name = logo
        .file_name()
        .ok_or_else(|| PacketError::validation(format!("logo path {} has no file name", logo.display())))?;
    std::fs::create_dir_all(artifact_dir).map_err(|e| PacketError::io(artifact_dir, e))?;
    let target = artifact_dir.join(name);
    if target != logo {
        std::fs::copy(logo, &target).map_err(|e| PacketError::io(logo, e))?;
    }

    let (width, height) = image::image_dimensions(&target)
        .map_err(|e| PacketError::Image(format!("{}: {e}", target.display())))?;
    let height_cm = if width == 0 {
        width_cm
    } else {
        width_cm * height as f32 / width as f32
    };

    Ok(EmbeddedImage {
        path: PathBuf::from(name),
        width_cm,
        height_cm,
    })
}

fn square_image(artifact_dir: &Path, path: &Path, edge_cm: f32) -> EmbeddedImage {
    EmbeddedImage {
        path: path.strip_prefix(artifact_dir).unwrap_or(path).to_path_buf(),
        width_cm: edge_cm,
        height_cm: edge_cm,
    }
}

/// Bring a supplied image inside the artifact directory; `None` if it is unusable.
fn localize(path: &Path, artifact_dir: &Path) -> Option<PathBuf> {
    if path.starts_with(artifact_dir) {
        return path.is_file().then(|| path.to_path_buf());
    }
    let name = path.file_name()?;
    let dir = artifact_dir.join(THUMBNAIL_DIR);
    let target = dir.join(name);
    let copied = std::fs::create_dir_all(&dir).and_then(|_| std::fs::copy(path, &target));
    match copied {
        Ok(_) => Some(target),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "supplied thumbnail unusable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{context, reading, write_logo};

    #[test]
    fn truncates_scheme_and_www() {
        assert_eq!(truncate_url("https://www.example.com/a?b=c"), "example.com/a?b=c");
        assert_eq!(truncate_url("http://arxiv.org/abs/1"), "arxiv.org/abs/1");
        assert_eq!(truncate_url("example.org/www.page"), "example.org/www.page");
    }

    #[tokio::test]
    async fn cover_styles_every_core_reading() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.core_readings[1].subsection = Some("Sections 1-3".into());

        let registry = EnrichmentRegistry::default();
        let out = registry
            .enrich(EnrichmentInput::Cover(ctx.clone()), &dir.path().join("Cover"))
            .await
            .unwrap();

        let RenderContext::Cover(cover) = out else {
            panic!("expected cover context");
        };
        assert_eq!(cover.base, ctx);
        assert_eq!(cover.styled_readings.len(), 2);
        assert!(cover.styled_readings[0].subsection.text.is_empty());
        let device = &cover.styled_readings[1];
        assert_eq!(device.title.text, "Frontier AI Regulation");
        assert_eq!(device.subsection.text, "\n(Sections 1-3)");
        assert_eq!(device.author_year.text, "(Anderljung et al., 2023)");
        assert_eq!(device.author_year.color, "8EA9DB");

        assert_eq!(cover.logo.width_cm, LOGO_LARGE_CM);
        // Fixture logo is 40x20.
        assert!((cover.logo.height_cm - 5.0).abs() < 1e-4);
        assert!(dir.path().join("Cover").join(&cover.logo.path).is_file());
    }

    #[tokio::test]
    async fn device_reading_gets_qr_code_and_display_url() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let device = ctx.core_readings[1].clone();
        let artifact_dir = dir.path().join("Device Readings").join(device.id());

        let out = EnrichmentRegistry::default()
            .enrich(
                EnrichmentInput::DeviceReading {
                    context: ctx,
                    reading: device,
                },
                &artifact_dir,
            )
            .await
            .unwrap();

        let RenderContext::DeviceReading(dr) = out else {
            panic!("expected device reading context");
        };
        assert_eq!(dr.logo.width_cm, LOGO_SMALL_CM);
        assert_eq!(dr.device_reading.id, "frontier_ai_regulation");
        assert_eq!(dr.device_reading.truncated_url, "arxiv.org/abs/2307.03718");
        let qr = dr.device_reading.qr_code.as_ref().unwrap();
        assert_eq!(qr.path, Path::new("qr_codes/frontier_ai_regulation QRCode.png"));
        assert!(artifact_dir.join(&qr.path).is_file());
        assert_eq!(dr.device_reading.thumbnail, None);
    }

    #[tokio::test]
    async fn empty_url_skips_link_assets() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.further_readings = vec![reading("No Link", "", Some("x.pdf"), false)];

        let out = EnrichmentRegistry::default()
            .enrich(EnrichmentInput::Further(ctx), &dir.path().join("Further"))
            .await
            .unwrap();

        let RenderContext::Further(further) = out else {
            panic!("expected further context");
        };
        let link = &further.further_links[0];
        assert_eq!(link.id, "no_link");
        assert!(link.truncated_url.is_empty());
        assert!(link.qr_code.is_none());
        assert!(link.thumbnail.is_none());
        assert!(!dir.path().join("Further").join(QR_CODE_DIR).exists());
    }

    #[tokio::test]
    async fn further_links_have_independent_ids_and_supplied_thumbnails() {
        let dir = tempfile::tempdir().unwrap();
        let thumb = dir.path().join("supplied.png");
        write_logo(&thumb);

        let mut ctx = context(dir.path());
        let mut with_thumb = reading("Model Cards", "https://www.example.com/cards", None, false);
        with_thumb.thumbnail_path = Some(thumb);
        ctx.further_readings = vec![
            with_thumb,
            reading("§2 Evals", "https://evals.example.org", None, false),
        ];

        let artifact_dir = dir.path().join("Further");
        let out = EnrichmentRegistry::default()
            .enrich(EnrichmentInput::Further(ctx.clone()), &artifact_dir)
            .await
            .unwrap();

        let RenderContext::Further(further) = out else {
            panic!("expected further context");
        };
        assert_eq!(further.base.further_readings, ctx.further_readings);
        let ids: Vec<_> = further.further_links.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["model_cards", "section2_evals"]);

        let thumb = further.further_links[0].thumbnail.as_ref().unwrap();
        assert_eq!(thumb.path, Path::new("thumbnails/supplied.png"));
        assert!(artifact_dir.join(&thumb.path).is_file());
        // No fetcher configured and nothing supplied.
        assert!(further.further_links[1].thumbnail.is_none());
    }

    #[tokio::test]
    async fn guide_adds_logo_and_cohort_only() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let cohort = ctx.cohorts[0].clone();

        let out = EnrichmentRegistry::default()
            .enrich(
                EnrichmentInput::Guide {
                    context: ctx.clone(),
                    cohort: cohort.clone(),
                },
                &dir.path().join("TA Guides").join(cohort.id()),
            )
            .await
            .unwrap();

        assert_eq!(out.kind(), DocumentKind::Guide);
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["cohort"]["name"], "Cohort A");
        assert_eq!(value["title"], ctx.title.as_str());
        assert!(value.get("styled_readings").is_none());
        assert!(value.get("device_reading").is_none());
    }

    #[tokio::test]
    async fn missing_logo_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.logo_path = dir.path().join("nope.png");

        let err = EnrichmentRegistry::default()
            .enrich(EnrichmentInput::Cover(ctx), &dir.path().join("Cover"))
            .await
            .unwrap_err();
        assert!(matches!(err, PacketError::Io { .. }));
    }
}
