//! PacketMaker CLI: assembles printable curriculum reading packets.
//!
//! Renders cover, device-reading, further-reading and facilitator-guide
//! documents from templates and merges them into duplex-ready packets.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
