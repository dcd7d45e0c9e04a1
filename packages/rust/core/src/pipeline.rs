//! End-to-end curriculum pipeline: context → documents → packet and guides.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use packetmaker_assets::{FaviconFetcher, normalize_logo};
use packetmaker_shared::{
    AppConfig, CurriculumContext, CurriculumEntry, FooterConfig, GenerateConfig, PacketError,
    Result, TemplatesConfig,
};

use crate::assembler::{
    ArtifactRecord, PacketPlan, RunManifest, assemble_guide, assemble_packet, write_json_atomic,
};
use crate::converter::DocumentConverter;
use crate::enrichment::{DocumentKind, EnrichmentInput, EnrichmentRegistry};
use crate::renderer::{DocumentArtifact, DocumentRenderer, DocumentState};

const WRITE_CHECK_FILE: &str = ".packetmaker-write-test";

/// Settings for one pipeline instance, taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory; each curriculum gets `<output_dir>/<curriculum-id>/`.
    pub output_dir: PathBuf,
    /// Placeholder page document for failed conversions.
    pub error_pdf: PathBuf,
    pub overwrite: bool,
    pub templates: TemplatesConfig,
    pub generate: GenerateConfig,
    pub footer: FooterConfig,
    /// Tool version string recorded in the manifest.
    pub tool_version: String,
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            error_pdf: config.error_pdf.clone(),
            overwrite: config.overwrite,
            templates: config.templates.clone(),
            generate: config.generate.clone(),
            footer: config.footer.clone(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Everything one curriculum run produced.
#[derive(Debug)]
pub struct CurriculumOutput {
    pub curriculum_id: String,
    /// `<output_dir>/<curriculum-id>/`.
    pub dir: PathBuf,
    pub artifacts: Vec<DocumentArtifact>,
    pub packet: Option<PathBuf>,
    pub guides: Vec<PathBuf>,
    pub manifest_path: PathBuf,
    pub elapsed: std::time::Duration,
}

impl CurriculumOutput {
    /// Documents that fell back to the placeholder page.
    pub fn failed_documents(&self) -> impl Iterator<Item = &DocumentArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.state == DocumentState::Failed)
    }
}

/// Outcome of a registry-wide run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<CurriculumOutput>,
    /// Curriculum name and the error that aborted its run.
    pub failed: Vec<(String, PacketError)>,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each document is rendered and converted.
    fn document_finished(&self, artifact: &DocumentArtifact);
    /// Called when a curriculum run completes.
    fn curriculum_finished(&self, output: &CurriculumOutput);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_finished(&self, _artifact: &DocumentArtifact) {}
    fn curriculum_finished(&self, _output: &CurriculumOutput) {}
}

// ---------------------------------------------------------------------------
// Permission check
// ---------------------------------------------------------------------------

/// Ensure `root` exists and is readable and writable.
pub fn check_output_permissions(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| PacketError::permission(root, e.to_string()))?;
    std::fs::read_dir(root).map_err(|e| PacketError::permission(root, e.to_string()))?;

    let check_file = root.join(WRITE_CHECK_FILE);
    std::fs::write(&check_file, b"").map_err(|e| PacketError::permission(root, e.to_string()))?;
    std::fs::remove_file(&check_file).map_err(|e| PacketError::permission(root, e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Produces the documents, packet and guides for curricula.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    registry: EnrichmentRegistry,
    converter: DocumentConverter,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, registry: EnrichmentRegistry, converter: DocumentConverter) -> Self {
        Self {
            config,
            registry,
            converter,
        }
    }

    /// Build a pipeline from the application config.
    pub fn from_app_config(app: &AppConfig) -> Result<Self> {
        let thumbnails = if app.thumbnails.enabled {
            Some(FaviconFetcher::new(app.thumbnails.timeout_secs)?)
        } else {
            None
        };
        Ok(Self::new(
            PipelineConfig::from_app_config(app),
            EnrichmentRegistry::new(thumbnails),
            DocumentConverter::new(&app.converter),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one curriculum start to finish.
    ///
    /// Validation happens before anything is written. Conversion failures
    /// degrade to the placeholder page and do not abort the run.
    #[instrument(skip_all, fields(curriculum = %context.curriculum_name))]
    pub async fn build_curriculum(
        &self,
        context: CurriculumContext,
        progress: &dyn ProgressReporter,
    ) -> Result<CurriculumOutput> {
        let start = Instant::now();
        let started_at = Utc::now();

        progress.phase("Validating curriculum");
        context.validate()?;
        self.check_packet_inputs(&context)?;

        let mut context = context;
        let curriculum_id = context.curriculum_id();
        let dir = self.config.output_dir.join(&curriculum_id);
        info!(%curriculum_id, dir = %dir.display(), "starting curriculum run");

        progress.phase("Normalizing logo");
        std::fs::create_dir_all(&dir).map_err(|e| PacketError::io(&dir, e))?;
        context.logo_path = normalize_logo(&context.logo_path, &dir)?;

        let generate = &self.config.generate;
        let templates = &self.config.templates;
        let mut artifacts = Vec::new();

        let cover = if generate.cover {
            let artifact = self
                .render_document(
                    DocumentKind::Cover,
                    &templates.cover,
                    dir.join("Cover"),
                    EnrichmentInput::Cover(context.clone()),
                    progress,
                )
                .await?;
            let page = artifact.page_document.clone();
            artifacts.push(artifact);
            Some(page)
        } else {
            None
        };

        let mut device_pages = Vec::new();
        if generate.device_readings {
            let device_dir = dir.join("Device Readings");
            for i in 0..context.core_readings.len() {
                if !context.core_readings[i].read_on_device {
                    continue;
                }
                let reading = context.core_readings[i].clone();
                let artifact = self
                    .render_document(
                        DocumentKind::DeviceReading,
                        &templates.device_reading,
                        device_dir.join(reading.id()),
                        EnrichmentInput::DeviceReading {
                            context: context.clone(),
                            reading,
                        },
                        progress,
                    )
                    .await?;
                context.core_readings[i].trimmed_pdf = Some(artifact.page_document.clone());
                device_pages.push(artifact.page_document.clone());
                artifacts.push(artifact);
            }
        }

        let further = if generate.further_readings && !context.further_readings.is_empty() {
            let artifact = self
                .render_document(
                    DocumentKind::Further,
                    &templates.further_reading,
                    dir.join("Further"),
                    EnrichmentInput::Further(context.clone()),
                    progress,
                )
                .await?;
            let page = artifact.page_document.clone();
            artifacts.push(artifact);
            Some(page)
        } else {
            None
        };

        let packet = if generate.packet {
            progress.phase("Assembling packet");
            let plan = PacketPlan {
                program_name: &context.program_name,
                cover: cover.as_deref(),
                readings: &context.core_readings,
                device_readings: &device_pages,
                further: further.as_deref(),
            };
            let output = dir.join(format!("{curriculum_id}.pdf"));
            Some(assemble_packet(&plan, &self.config.footer, &output)?)
        } else {
            None
        };

        let mut guides = Vec::new();
        if generate.ta_guides {
            let guides_dir = dir.join("TA Guides");
            for cohort in &context.cohorts {
                let cohort_id = cohort.id();
                let artifact = self
                    .render_document(
                        DocumentKind::Guide,
                        &templates.ta_guide,
                        guides_dir.join(&cohort_id),
                        EnrichmentInput::Guide {
                            context: context.clone(),
                            cohort: cohort.clone(),
                        },
                        progress,
                    )
                    .await?;

                progress.phase("Assembling facilitator guide");
                let output = guides_dir.join(format!("{cohort_id} n{}.pdf", cohort.num_members));
                guides.push(assemble_guide(
                    &artifact.page_document,
                    context.meeting_ta_guide_pdf.as_deref(),
                    context.base_ta_guide_pdf.as_deref(),
                    &output,
                )?);
                artifacts.push(artifact);
            }
        }

        write_json_atomic(&dir.join("context.json"), &context)?;

        let manifest = RunManifest {
            run_id: Uuid::now_v7().to_string(),
            curriculum_name: context.curriculum_name.clone(),
            curriculum_id: curriculum_id.clone(),
            tool_version: self.config.tool_version.clone(),
            started_at,
            completed_at: Utc::now(),
            artifacts: artifacts.iter().map(ArtifactRecord::from_artifact).collect(),
            packet: packet.clone(),
            guides: guides.clone(),
        };
        let manifest_path = dir.join("manifest.json");
        write_json_atomic(&manifest_path, &manifest)?;

        let failed = manifest.failed_count();
        if failed > 0 {
            warn!(failed, "some documents were replaced by the placeholder page");
        }

        let output = CurriculumOutput {
            curriculum_id,
            dir,
            artifacts,
            packet,
            guides,
            manifest_path,
            elapsed: start.elapsed(),
        };
        info!(
            documents = output.artifacts.len(),
            failed,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "curriculum run complete"
        );
        progress.curriculum_finished(&output);
        Ok(output)
    }

    /// Run every registry entry marked `make_packet`.
    ///
    /// The output root is checked once up front; a failing curriculum is
    /// recorded and the remaining ones still run.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn run_all(
        &self,
        entries: &[CurriculumEntry],
        progress: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        check_output_permissions(&self.config.output_dir)?;

        let mut report = BatchReport::default();
        for entry in entries.iter().filter(|e| e.make_packet) {
            progress.phase(&format!("Curriculum {}", entry.name));
            let result = match CurriculumContext::load(&entry.context) {
                Ok(context) => self.build_curriculum(context, progress).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(output) => report.succeeded.push(output),
                Err(e) => {
                    error!(curriculum = %entry.name, error = %e, "curriculum run failed");
                    report.failed.push((entry.name.clone(), e));
                }
            }
        }
        Ok(report)
    }

    /// Every core reading must have a page document by packet time.
    ///
    /// Device readings only get one when they are rendered, so with device
    /// rendering off they have to be pre-trimmed.
    fn check_packet_inputs(&self, context: &CurriculumContext) -> Result<()> {
        if !self.config.generate.packet || self.config.generate.device_readings {
            return Ok(());
        }
        match context.core_readings.iter().find(|r| r.trimmed_pdf.is_none()) {
            Some(reading) => Err(PacketError::validation(format!(
                "Reading {} has no trimmed pdf and device readings are not generated.",
                reading.title
            ))),
            None => Ok(()),
        }
    }

    async fn render_document(
        &self,
        kind: DocumentKind,
        template: &Path,
        dir: PathBuf,
        input: EnrichmentInput,
        progress: &dyn ProgressReporter,
    ) -> Result<DocumentArtifact> {
        progress.phase(&format!("Rendering {kind}"));
        let mut renderer = DocumentRenderer::new(kind, template, dir);
        let rendered = renderer
            .render(input, &self.registry, self.config.overwrite)
            .await?;
        let artifact = renderer
            .convert(rendered, &self.converter, &self.config.error_pdf)
            .await;
        progress.document_finished(&artifact);
        Ok(artifact)
    }
}
