//! Shared types, error model, and configuration for PacketMaker.
//!
//! This crate is the foundation depended on by all other PacketMaker crates.
//! It provides:
//! - [`PacketError`] — the unified error type
//! - Domain types ([`CurriculumContext`], [`Reading`], [`Cohort`])
//! - [`normalize_identifier`] — title to filesystem-safe identifier
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod ident;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConverterConfig, CurriculumEntry, FooterConfig, FooterSkip, GenerateConfig,
    TemplatesConfig, ThumbnailConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_config,
};
pub use error::{PacketError, Result};
pub use ident::normalize_identifier;
pub use types::{Cohort, CurriculumContext, Reading};
