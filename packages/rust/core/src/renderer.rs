//! Template renderer: enriched context → intermediate document → page document.
//!
//! One renderer is bound to a document kind, a template and an artifact
//! directory. A document moves through
//! `NotStarted → Rendered → Converted | Failed`; a failed conversion is
//! replaced by the placeholder page document and never surfaces as an error.

use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::{error, info, instrument};

use packetmaker_shared::{PacketError, Result};

use crate::converter::{ConversionOutcome, DocumentConverter};
use crate::enrichment::{DocumentKind, EnrichmentInput, EnrichmentRegistry, RenderContext};

/// Template extensions whose output is markup and gets HTML/XML escaping.
const MARKUP_EXTENSIONS: [&str; 6] = ["fodt", "fods", "html", "htm", "xml", "svg"];

/// Lifecycle of one generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    NotStarted,
    Rendered,
    Converted,
    Failed,
}

// ---------------------------------------------------------------------------
// DocumentRenderer
// ---------------------------------------------------------------------------

/// Renders one document kind into its own artifact directory.
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    kind: DocumentKind,
    template: PathBuf,
    output_dir: PathBuf,
    state: DocumentState,
}

impl DocumentRenderer {
    pub fn new(kind: DocumentKind, template: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            template: template.into(),
            output_dir: output_dir.into(),
            state: DocumentState::NotStarted,
        }
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    /// `<output_dir>/<dir name>.<template extension>`.
    pub fn intermediate_path(&self) -> PathBuf {
        let ext = self
            .template
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "txt".to_string());
        self.output_dir.join(format!("{}.{ext}", self.dir_name()))
    }

    /// `<output_dir>/<dir name>.pdf`.
    pub fn page_document_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.pdf", self.dir_name()))
    }

    fn dir_name(&self) -> String {
        self.output_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.kind.to_string())
    }

    /// Enrich `input` and render the template with the result.
    ///
    /// Fails with [`PacketError::ArtifactExists`] before touching the
    /// filesystem when the intermediate document exists and `overwrite` is
    /// false.
    #[instrument(skip_all, fields(kind = %self.kind, dir = %self.output_dir.display()))]
    pub async fn render(
        &mut self,
        input: EnrichmentInput,
        registry: &EnrichmentRegistry,
        overwrite: bool,
    ) -> Result<RenderedDocument> {
        if input.kind() != self.kind {
            return Err(PacketError::validation(format!(
                "{} input given to the {} renderer",
                input.kind(),
                self.kind
            )));
        }

        let intermediate = self.intermediate_path();
        if intermediate.exists() && !overwrite {
            return Err(PacketError::ArtifactExists { path: intermediate });
        }

        let source = std::fs::read_to_string(&self.template)
            .map_err(|e| PacketError::io(&self.template, e))?;

        std::fs::create_dir_all(&self.output_dir).map_err(|e| PacketError::io(&self.output_dir, e))?;
        let context = registry.enrich(input, &self.output_dir).await?;

        let template_name = self
            .template
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.kind.to_string());
        let rendered = render_template(&template_name, &source, &context)?;
        std::fs::write(&intermediate, rendered).map_err(|e| PacketError::io(&intermediate, e))?;

        self.state = DocumentState::Rendered;
        info!(path = %intermediate.display(), "rendered document");

        Ok(RenderedDocument {
            kind: self.kind,
            intermediate,
            page_document: self.page_document_path(),
            context,
        })
    }

    /// Convert a rendered document to its page document, falling back to
    /// `placeholder` on failure. Leaves the renderer `Converted` or `Failed`.
    #[instrument(skip_all, fields(kind = %rendered.kind, path = %rendered.intermediate.display()))]
    pub async fn convert(
        &mut self,
        rendered: RenderedDocument,
        converter: &DocumentConverter,
        placeholder: &Path,
    ) -> DocumentArtifact {
        let (page_document, state) = match converter.convert(&rendered.intermediate).await {
            ConversionOutcome::Converted(path) => {
                info!(path = %path.display(), "converted document");
                (path, DocumentState::Converted)
            }
            ConversionOutcome::Failed { reason } => {
                error!(
                    %reason,
                    placeholder = %placeholder.display(),
                    "conversion failed, using placeholder page"
                );
                (placeholder.to_path_buf(), DocumentState::Failed)
            }
        };

        self.state = state;
        DocumentArtifact {
            kind: rendered.kind,
            intermediate: rendered.intermediate,
            page_document,
            context: rendered.context,
            state,
        }
    }
}

fn render_template(name: &str, source: &str, context: &RenderContext) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_auto_escape_callback(|name| {
        let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
        if MARKUP_EXTENSIONS.contains(&ext.as_str()) {
            AutoEscape::Html
        } else {
            AutoEscape::None
        }
    });

    env.render_named_str(name, source, context)
        .map_err(|e| PacketError::Template(format!("{name}: {e}")))
}

// ---------------------------------------------------------------------------
// RenderedDocument / DocumentArtifact
// ---------------------------------------------------------------------------

/// A rendered intermediate document awaiting conversion.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub kind: DocumentKind,
    pub intermediate: PathBuf,
    /// Where the converter is expected to write the page document.
    pub page_document: PathBuf,
    pub context: RenderContext,
}

/// The finished output of one renderer invocation.
#[derive(Debug, Clone)]
pub struct DocumentArtifact {
    pub kind: DocumentKind,
    pub intermediate: PathBuf,
    /// The converted page document, or the placeholder when conversion failed.
    pub page_document: PathBuf,
    /// The enriched context the document was rendered with.
    pub context: RenderContext,
    pub state: DocumentState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{context, failing_converter, fixture_converter, placeholder_pdf};
    use packetmaker_pdf::test_support::write_test_pdf;

    fn cover_template(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("cover.fodt");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn renders_enriched_context_into_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = cover_template(
            dir.path(),
            "<title>{{ title }}</title>{% for r in styled_readings %}<r color=\"{{ r.title.color }}\">{{ r.title.text }}</r>{% endfor %}<img src=\"{{ logo.path }}\"/>",
        );
        let mut ctx = context(dir.path());
        ctx.title = "Governance & Policy".into();

        let mut renderer = DocumentRenderer::new(DocumentKind::Cover, &template, dir.path().join("Cover"));
        assert_eq!(renderer.state(), DocumentState::NotStarted);
        let rendered = renderer
            .render(EnrichmentInput::Cover(ctx), &EnrichmentRegistry::default(), false)
            .await
            .unwrap();

        assert_eq!(renderer.state(), DocumentState::Rendered);
        assert_eq!(rendered.intermediate, dir.path().join("Cover/Cover.fodt"));
        assert_eq!(rendered.page_document, dir.path().join("Cover/Cover.pdf"));

        let text = std::fs::read_to_string(&rendered.intermediate).unwrap();
        assert!(text.contains("<title>Governance &amp; Policy</title>"));
        assert!(text.contains(">Frontier AI Regulation</r>"));
        assert!(text.contains("color=\"8EA9DB\""));
    }

    #[tokio::test]
    async fn existing_artifact_without_overwrite_fails_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let template = cover_template(dir.path(), "{{ title }}");
        let out_dir = dir.path().join("Cover");
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(out_dir.join("Cover.fodt"), "previous run").unwrap();

        let mut renderer = DocumentRenderer::new(DocumentKind::Cover, &template, &out_dir);
        let err = renderer
            .render(EnrichmentInput::Cover(context(dir.path())), &EnrichmentRegistry::default(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, PacketError::ArtifactExists { .. }));
        assert_eq!(renderer.state(), DocumentState::NotStarted);
        assert_eq!(std::fs::read_to_string(out_dir.join("Cover.fodt")).unwrap(), "previous run");
        let entries: Vec<_> = std::fs::read_dir(&out_dir).unwrap().collect();
        assert_eq!(entries.len(), 1, "logo or other assets were written");
    }

    #[tokio::test]
    async fn overwrite_replaces_existing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let template = cover_template(dir.path(), "{{ program_name }}");
        let out_dir = dir.path().join("Cover");
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(out_dir.join("Cover.fodt"), "previous run").unwrap();

        let mut renderer = DocumentRenderer::new(DocumentKind::Cover, &template, &out_dir);
        renderer
            .render(EnrichmentInput::Cover(context(dir.path())), &EnrichmentRegistry::default(), true)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(out_dir.join("Cover.fodt")).unwrap(), "AISF");
    }

    #[tokio::test]
    async fn undefined_variable_is_a_template_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = cover_template(dir.path(), "{{ no_such_field }}");

        let mut renderer = DocumentRenderer::new(DocumentKind::Cover, &template, dir.path().join("Cover"));
        let err = renderer
            .render(EnrichmentInput::Cover(context(dir.path())), &EnrichmentRegistry::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PacketError::Template(_)));
    }

    #[tokio::test]
    async fn mismatched_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let template = cover_template(dir.path(), "x");
        let mut renderer = DocumentRenderer::new(DocumentKind::Further, &template, dir.path().join("Further"));
        let err = renderer
            .render(EnrichmentInput::Cover(context(dir.path())), &EnrichmentRegistry::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PacketError::Validation { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn conversion_success_and_failure_paths() {
        let dir = tempfile::tempdir().unwrap();
        let template = cover_template(dir.path(), "{{ title }}");
        let placeholder = placeholder_pdf(dir.path());
        let fixtures = dir.path().join("fixtures");
        std::fs::create_dir_all(&fixtures).unwrap();
        write_test_pdf(&fixtures.join("Cover.pdf"), 1, "cover");

        let mut renderer = DocumentRenderer::new(DocumentKind::Cover, &template, dir.path().join("Cover"));
        let rendered = renderer
            .render(EnrichmentInput::Cover(context(dir.path())), &EnrichmentRegistry::default(), false)
            .await
            .unwrap();
        let artifact = renderer
            .convert(rendered.clone(), &fixture_converter(&fixtures), &placeholder)
            .await;
        assert_eq!(artifact.state, DocumentState::Converted);
        assert_eq!(renderer.state(), DocumentState::Converted);
        assert_eq!(artifact.page_document, dir.path().join("Cover/Cover.pdf"));

        let artifact = renderer
            .convert(rendered, &failing_converter(), &placeholder)
            .await;
        assert_eq!(artifact.state, DocumentState::Failed);
        assert_eq!(renderer.state(), DocumentState::Failed);
        assert_eq!(artifact.page_document, placeholder);
        assert_eq!(artifact.kind, DocumentKind::Cover);
    }
}
