use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use stepdoc::export::{ExportOptions, export_images};
use stepdoc::model::MarkerAppearance;
use stepdoc::project_io::load_project;

#[derive(Parser, Debug)]
#[command(name = "stepdoc", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flatten every step of a saved project into numbered PNGs.
    Export(ExportArgs),
    /// Print a summary of a saved project.
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Directory that contains the project folder.
    #[arg(long = "in")]
    in_dir: PathBuf,

    /// Project name (folder under --in with project.json inside).
    #[arg(long)]
    project: String,

    /// Output directory for the flattened images.
    #[arg(long)]
    out: PathBuf,

    /// Marker settings JSON; defaults are used when absent.
    #[arg(long)]
    marker: Option<PathBuf>,

    /// Skip the attribution text stamped bottom-right.
    #[arg(long)]
    no_watermark: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Directory that contains the project folder.
    #[arg(long = "in")]
    in_dir: PathBuf,

    /// Project name.
    #[arg(long)]
    project: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Inspect(args) => cmd_inspect(args),
    }
}

fn load_marker(path: Option<&Path>) -> anyhow::Result<MarkerAppearance> {
    match path {
        Some(p) => MarkerAppearance::load(p)
            .with_context(|| format!("read marker settings '{}'", p.display())),
        None => Ok(MarkerAppearance::default()),
    }
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let project = load_project(&args.in_dir, &args.project)
        .with_context(|| format!("load project '{}'", args.project))?;
    let marker = load_marker(args.marker.as_deref())?;

    let opts = ExportOptions {
        out_dir: args.out.clone(),
        watermark: !args.no_watermark,
    };
    let written = export_images(&project, &marker, &opts, |done, total| {
        eprintln!("  {done}/{total}");
    })?;

    eprintln!("wrote {} images to {}", written.len(), args.out.display());
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let project = load_project(&args.in_dir, &args.project)
        .with_context(|| format!("load project '{}'", args.project))?;

    println!("project: {}", args.project);
    println!("steps:   {}", project.steps.len());
    println!("globals: {}", project.global_layers.len());
    match project.crop {
        Some(c) => println!(
            "crop:    {},{} .. {},{}",
            c.rect.x0, c.rect.y0, c.rect.x1, c.rect.y1
        ),
        None => println!("crop:    none"),
    }
    for (i, step) in project.steps.iter().enumerate() {
        let (w, h) = step.image.dimensions();
        println!(
            "  step {:>2}: {}x{} click=({},{}) layers={} {:?}",
            i + 1,
            w,
            h,
            step.click_x,
            step.click_y,
            step.layers.len(),
            step.description,
        );
    }
    Ok(())
}
