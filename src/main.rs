use clap::{Parser, Subcommand};
use futures::StreamExt;
use futures::stream;
use imgdim::config::{self, TransformConfig};
use imgdim::imaging::probe::probe_file;
use imgdim::output;
use imgdim::transform::{
    DocumentReport, ReportSummary, Transformed, Transformer, is_html_document,
};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "imgdim")]
#[command(about = "Rewrite <img> markup in a built site into responsive, sized markup")]
#[command(long_about = "\
Rewrite <img> markup in a built site into responsive, sized markup

Runs over rendered HTML after the site generator is done. For every <img>
and <amp-img> whose file lives in the site:

  svg            width/height added
  gif            replaced by an autoplaying <video> (needs ffmpeg)
  <img>          wrapped in <picture> with avif, webp and png/jpeg sources,
                 a blurred inline placeholder, width/height, lazy loading
  <amp-img>      given a png/jpeg srcset (left alone if it already has one)

Remote (http://, https://, //) and data: sources are never touched.
Generated files are written under <root>/img/remote/ by default.

Run 'imgdim gen-config' to generate a documented imgdim.toml.")]
#[command(version)]
struct Cli {
    /// Built site directory (overrides output_root from the config)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Log every per-image decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct TransformArgs {
    /// Documents to transform (default: every .html file under the root)
    files: Vec<PathBuf>,

    /// Report what would change without writing documents
    #[arg(long)]
    dry_run: bool,

    /// Write the per-document report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite image markup in built HTML documents in place
    Transform(TransformArgs),
    /// Show dimensions, format and handling branch of image files
    Probe {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Print a stock imgdim.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Probe { ref images } => {
            let mut failed = 0;
            for path in images {
                match probe_file(path) {
                    Ok(dims) => output::print_probe(path, &dims),
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "probe failed");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} image(s) could not be probed").into());
            }
        }
        Command::Transform(ref args) => {
            let config = load_config(&cli)?;
            run_transform(config, args).await?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "imgdim=debug" } else { "imgdim=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<TransformConfig, Box<dyn std::error::Error>> {
    if cli.config != Path::new(config::DEFAULT_CONFIG_FILE) && !cli.config.exists() {
        return Err(format!("config file not found: {}", cli.config.display()).into());
    }
    let mut config = config::load_config(&cli.config)?;
    if let Some(root) = &cli.root {
        config.output_root = root.clone();
    }
    Ok(config)
}

/// Every `.html` file under `root`, in a stable order.
fn collect_documents(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_html_document(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

async fn transform_file(
    transformer: &Transformer,
    path: &Path,
    dry_run: bool,
) -> io::Result<Transformed> {
    let html = tokio::fs::read_to_string(path).await?;
    let transformed = transformer.transform_document(&html, path).await;
    if transformed.changed && !dry_run {
        tokio::fs::write(path, &transformed.html).await?;
    }
    Ok(transformed)
}

async fn run_transform(
    config: TransformConfig,
    args: &TransformArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = config.output_root.clone();
    if !root.is_dir() {
        return Err(format!("site root not found: {}", root.display()).into());
    }
    let documents = if args.files.is_empty() {
        collect_documents(&root)
    } else {
        args.files.clone()
    };
    info!(root = %root.display(), documents = documents.len(), "starting transform");

    // Pixel work runs on blocking threads, so a few documents in flight keep
    // them busy without holding every parsed tree at once.
    let in_flight = std::thread::available_parallelism().map_or(1, |n| n.get());
    let transformer = Transformer::new(config);
    let results: Vec<(PathBuf, io::Result<Transformed>)> = stream::iter(documents)
        .map(|path| {
            let transformer = &transformer;
            async move {
                let result = transform_file(transformer, &path, args.dry_run).await;
                (path, result)
            }
        })
        .buffered(in_flight)
        .collect()
        .await;

    let mut summary = ReportSummary::default();
    let mut reports: Vec<DocumentReport> = Vec::new();
    let mut changed = 0;
    let mut unreadable = 0;
    for (path, result) in &results {
        match result {
            Ok(transformed) => {
                output::print_document_report(&transformed.report, &root);
                summary += transformed.report.summary();
                if transformed.changed {
                    changed += 1;
                }
                reports.push(transformed.report.clone());
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not transform document");
                unreadable += 1;
            }
        }
    }
    output::print_run_summary(&summary, changed, results.len());

    if let Some(report_path) = &args.report {
        let json = serde_json::to_string_pretty(&reports)?;
        std::fs::write(report_path, json)?;
    }
    if unreadable > 0 {
        return Err(format!("{unreadable} document(s) could not be transformed").into());
    }
    Ok(())
}
