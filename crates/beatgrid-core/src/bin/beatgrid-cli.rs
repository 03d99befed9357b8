use std::path::PathBuf;

use anyhow::Context;
use beatgrid_core::{
    EngineConfig, GraphBuilder,
    diagnostics::init_tracing,
    export::{export_wav, write_wav_file},
    fixtures::demo_project,
    generate_parity_report,
    parity::write_parity_report,
    persistence::{load_project, save_project},
    renderer::capture_live,
    wav::encode_wav,
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "beatgrid-cli")]
#[command(about = "Headless tools for beatgrid export, capture and parity workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides the configured log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Fixes the noise stream for reproducible output.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Writes the demo project and its offline render.
    DemoExport {
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Renders a saved project file to WAV.
    Export {
        project: PathBuf,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        loops: Option<u32>,
    },
    /// Plays a project through the live transport and records the output.
    LiveCapture {
        #[arg(long)]
        project: Option<PathBuf>,

        #[arg(long, default_value = "data/exports/live_capture.wav")]
        output: PathBuf,
    },
    /// Compares live and offline renders of the demo project.
    ParityReport {
        #[arg(long, default_value = "data/parity/report.json")]
        output: PathBuf,
    },
}

fn builder_for(seed: Option<u64>) -> GraphBuilder {
    seed.map_or_else(GraphBuilder::default, GraphBuilder::seeded)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = EngineConfig::load_or_default()?;
    if cli.seed.is_some() {
        config.audio.noise_seed = cli.seed;
    }
    let log_dir = cli.log_dir.unwrap_or_else(|| config.paths.logs_dir.clone());
    let _telemetry = init_tracing(&log_dir, &config.diagnostics)?;
    let seed = config.audio.noise_seed;

    match cli.command {
        Commands::DemoExport { output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| config.paths.export_dir.clone());
            let project = demo_project();
            save_project(&output_dir.join("demo.beatgrid.json"), &project)?;
            let path = output_dir.join(&config.export.file_name);
            export_wav(
                &project,
                &path,
                &config.render_options(),
                &mut builder_for(seed),
            )?;
            tracing::info!(path = %path.display(), "demo exported");
        }
        Commands::Export {
            project,
            output,
            loops,
        } => {
            let loaded = load_project(&project)?;
            for notice in &loaded.notices {
                tracing::warn!(%notice, "project loaded with defaults");
            }

            let mut options = config.render_options();
            if let Some(loops) = loops {
                options.loops = loops.max(1);
            }
            let path = output.unwrap_or_else(|| config.export_path());
            export_wav(&loaded.project, &path, &options, &mut builder_for(seed))?;
            tracing::info!(path = %path.display(), "project exported");
        }
        Commands::LiveCapture { project, output } => {
            let project = match project {
                Some(path) => load_project(&path)?.project,
                None => demo_project(),
            };
            let buffer = capture_live(
                &project,
                &config.render_options(),
                &config.live_options(),
                &mut builder_for(seed),
            )?;
            let bytes = encode_wav(&buffer)?;
            write_wav_file(&output, &bytes)
                .context("failed to write live capture")?;
            tracing::info!(path = %output.display(), frames = buffer.frame_count(), "live capture written");
        }
        Commands::ParityReport { output } => {
            let report = generate_parity_report(
                &demo_project(),
                &config.render_options(),
                &config.live_options(),
                seed.unwrap_or_default(),
            )?;
            write_parity_report(&output, &report)?;
            tracing::info!(path = %output.display(), matches = report.matches, "parity report generated");
        }
    }

    Ok(())
}
