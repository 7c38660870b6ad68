// Path: crates/node/src/main.rs
//! The artifex node binary.
//!
//! Subcommands: `build` compiles a source function into a WASM artifact
//! and appends its manifest record, `hash` prints the structural hash of a
//! source file, `resolve` runs a one-shot resolution, and `serve` runs the
//! gateway with the metrics and health surfaces.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "artifex-node", version, about = "Content-addressed WASM artifact pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source function into a deterministic WASM artifact.
    Build {
        /// Path to the `.axs` source file.
        source: PathBuf,
        /// Directory receiving the compiled `.wasm` module.
        #[arg(long, default_value = "artifacts/out")]
        out_dir: PathBuf,
        /// Manifest file the record is appended to.
        #[arg(long, default_value = "artifacts/manifests/build.json")]
        manifest: PathBuf,
        /// Skip the structural pass.
        #[arg(long)]
        no_structural: bool,
        /// Extra labels for the record.
        #[arg(long)]
        label: Vec<String>,
    },
    /// Print the structural hash of a source file.
    Hash {
        /// Path to the `.axs` source file.
        source: PathBuf,
    },
    /// Resolve one artifact and print where the bytes came from.
    Resolve {
        /// A byte-CID text form or `name:<logical>`.
        target: String,
        /// Configuration file (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Plan only; skip every network step.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the gateway.
    Serve {
        /// Configuration file (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    artifex_telemetry::init::init_tracing()?;
    let cli = Cli::parse();
    match cli.command {
        Command::Build {
            source,
            out_dir,
            manifest,
            no_structural,
            label,
        } => commands::build::run(&source, &out_dir, &manifest, !no_structural, label),
        Command::Hash { source } => commands::hash::run(&source),
        Command::Resolve {
            target,
            config,
            dry_run,
        } => commands::resolve::run(&target, config.as_deref(), dry_run).await,
        Command::Serve { config } => commands::serve::run(config.as_deref()).await,
    }
}
