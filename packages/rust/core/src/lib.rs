//! Core pipeline orchestration and domain logic for PacketMaker.
//!
//! This crate ties together enrichment, template rendering, conversion and
//! packet assembly into the per-curriculum run (`Pipeline::build_curriculum`).

pub mod assembler;
pub mod converter;
pub mod enrichment;
pub mod pipeline;
pub mod renderer;

#[cfg(test)]
mod test_fixtures;

pub use assembler::{PacketAssembly, PacketPlan, RunManifest, assemble_guide, assemble_packet};
pub use converter::{ConversionOutcome, DocumentConverter};
pub use enrichment::{DocumentKind, EnrichmentInput, EnrichmentRegistry, RenderContext};
pub use pipeline::{
    BatchReport, CurriculumOutput, Pipeline, PipelineConfig, ProgressReporter, SilentProgress,
    check_output_permissions,
};
pub use renderer::{DocumentArtifact, DocumentRenderer, DocumentState, RenderedDocument};
