//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use packetmaker_core::{
    CurriculumOutput, DocumentArtifact, DocumentState, Pipeline, ProgressReporter,
    check_output_permissions,
};
use packetmaker_shared::{
    AppConfig, CurriculumContext, init_config, load_config, load_config_from, validate_config,
};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// PacketMaker — assemble printable reading packets for a curriculum.
#[derive(Parser)]
#[command(
    name = "packetmaker",
    version,
    about = "Render curriculum documents from templates and merge them into reading packets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.packetmaker/packetmaker.toml).
    #[arg(long, global = true, env = "PACKETMAKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build the documents and packet for one curriculum context.
    Build {
        /// Resolved curriculum context (JSON).
        context: PathBuf,

        /// Output root (overrides `output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Replace artifacts from a previous run.
        #[arg(long)]
        overwrite: bool,

        /// Also build facilitator guides.
        #[arg(long)]
        guides: bool,
    },

    /// Build every registered curriculum marked `make_packet`.
    Run {
        /// Output root (overrides `output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Replace artifacts from a previous run.
        #[arg(long)]
        overwrite: bool,
    },

    /// List registered curricula.
    List,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "packetmaker=info",
        1 => "packetmaker=debug",
        _ => "packetmaker=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Build {
            context,
            out,
            overwrite,
            guides,
        } => {
            let mut config = resolve_config(config_path.as_deref(), out, overwrite)?;
            config.generate.ta_guides |= guides;
            cmd_build(&config, &context).await
        }
        Command::Run { out, overwrite } => {
            let config = resolve_config(config_path.as_deref(), out, overwrite)?;
            cmd_run(&config).await
        }
        Command::List => cmd_list(&read_config(config_path.as_deref())?),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&read_config(config_path.as_deref())?),
        },
    }
}

fn read_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Load config and apply command-line overrides.
fn resolve_config(path: Option<&Path>, out: Option<PathBuf>, overwrite: bool) -> Result<AppConfig> {
    let mut config = read_config(path)?;
    if let Some(out) = out {
        config.output_dir = out;
    }
    config.overwrite |= overwrite;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(config: &AppConfig, context_path: &Path) -> Result<()> {
    validate_config(config)?;
    let context = CurriculumContext::load(context_path)?;
    check_output_permissions(&config.output_dir)?;

    info!(
        curriculum = %context.curriculum_name,
        output = %config.output_dir.display(),
        "building curriculum"
    );

    let pipeline = Pipeline::from_app_config(config)?;
    let reporter = CliProgress::new();
    let result = pipeline.build_curriculum(context, &reporter).await;
    reporter.finish();
    let output = result?;

    print_summary(&output);
    Ok(())
}

async fn cmd_run(config: &AppConfig) -> Result<()> {
    validate_config(config)?;
    if config.curricula.is_empty() {
        return Err(eyre!("no curricula registered; add [[curricula]] entries to the config"));
    }

    let pipeline = Pipeline::from_app_config(config)?;
    let reporter = CliProgress::new();
    let result = pipeline.run_all(&config.curricula, &reporter).await;
    reporter.finish();
    let report = result?;

    for output in &report.succeeded {
        print_summary(output);
    }
    for (name, error) in &report.failed {
        eprintln!("  {name}: {error}");
    }

    if !report.failed.is_empty() {
        return Err(eyre!(
            "{} of {} curricula failed",
            report.failed.len(),
            report.failed.len() + report.succeeded.len()
        ));
    }
    Ok(())
}

fn cmd_list(config: &AppConfig) -> Result<()> {
    if config.curricula.is_empty() {
        println!("No curricula registered.");
        return Ok(());
    }
    for entry in &config.curricula {
        let marker = if entry.make_packet { "*" } else { " " };
        println!("{marker} {:<40} {}", entry.name, entry.context.display());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(output: &CurriculumOutput) {
    let failed = output.failed_documents().count();
    println!();
    println!("  Curriculum: {}", output.curriculum_id);
    println!("  Documents:  {} ({failed} failed)", output.artifacts.len());
    if let Some(packet) = &output.packet {
        println!("  Packet:     {}", packet.display());
    }
    for guide in &output.guides {
        println!("  Guide:      {}", guide.display());
    }
    println!("  Time:       {:.1}s", output.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_finished(&self, artifact: &DocumentArtifact) {
        if artifact.state == DocumentState::Failed {
            warn!(kind = %artifact.kind, path = %artifact.intermediate.display(), "placeholder page used");
            self.spinner.println(format!(
                "  ! {} conversion failed: {}",
                artifact.kind,
                artifact.intermediate.display()
            ));
        }
    }

    fn curriculum_finished(&self, output: &CurriculumOutput) {
        self.spinner
            .println(format!("  done {} in {:.1}s", output.curriculum_id, output.elapsed.as_secs_f64()));
    }
}
