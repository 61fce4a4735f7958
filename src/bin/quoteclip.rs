use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rand::{SeedableRng as _, rngs::StdRng};
use tracing_subscriber::EnvFilter;

use quoteclip::{PipelineConfig, QuoteText, pipeline};

#[derive(Parser, Debug)]
#[command(name = "quoteclip", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a quote video as an MP4 (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Render only the text overlay as a PNG, for inspection.
    Overlay(OverlayArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Pipeline configuration JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output MP4 path (overrides the configured path).
    #[arg(long)]
    out: Option<PathBuf>,

    /// RNG seed for reproducible asset/quote/offset picks.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
struct OverlayArgs {
    /// Pipeline configuration JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Quote body to lay out.
    #[arg(long)]
    text: String,

    /// Optional attribution line.
    #[arg(long)]
    author: Option<String>,

    /// Output PNG path.
    #[arg(long, default_value = "out/overlay.png")]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Overlay(args) => cmd_overlay(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("load config '{}'", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(args.config.as_ref())?;
    if let Some(out) = args.out {
        cfg.output.path = out;
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let rendered = pipeline::run_pipeline(&cfg, &mut rng)?;
    eprintln!(
        "wrote {} ({} frames, {:.2}s)",
        rendered.out_path.display(),
        rendered.frames_total,
        rendered.duration_sec
    );
    Ok(())
}

fn cmd_overlay(args: OverlayArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let quote = QuoteText::new(args.text, args.author)?;
    pipeline::render_overlay_png(&cfg, &quote, &args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
