use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shelfscan::{label_images, ConsolePrompt, LabelError};
use shelfscan_core::LabelerConfig;
use shelfscan_ocr::{InvoiceReader, OcrBackend};
use shelfscan_storage::{summarize, LabelTable, LABELS_FILE};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "shelfscan.toml";

#[derive(Parser)]
#[command(name = "shelfscan", version)]
#[command(about = "Label product photos against the line items of a supplier invoice")]
struct Cli {
    /// Config file (defaults to ./shelfscan.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Label every image in a folder using an invoice's descriptions
    Label {
        /// Invoice image or PDF
        #[arg(long)]
        invoice: PathBuf,
        /// Folder of product photos
        #[arg(long)]
        images: PathBuf,
        /// Auto-label threshold in 0..=1
        #[arg(long)]
        threshold: Option<f32>,
        /// Dataset root (labels.csv and images/)
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Correction map JSON file
        #[arg(long)]
        corrections: Option<PathBuf>,
        /// Exit with status 2 when the invoice cannot be read
        #[arg(long)]
        strict: bool,
    },
    /// Print the structured invoice as JSON
    Invoice {
        path: PathBuf,
    },
    /// Summarize the labels recorded so far
    Classes {
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shelfscan=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Label { invoice, images, threshold, dataset, corrections, strict } => {
            if let Some(t) = threshold {
                config.threshold = t;
            }
            if let Some(d) = dataset {
                config.dataset_dir = d;
            }
            if let Some(c) = corrections {
                config.corrections_path = c;
            }
            config.validate()?;
            run_label(config, &invoice, &images, strict)
        }
        Command::Invoice { path } => {
            let extraction = InvoiceReader::new(invoice_recognizer())
                .read_file(&path)
                .with_context(|| format!("Failed to read invoice {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&extraction)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Classes { dataset, json } => {
            let root = dataset.unwrap_or(config.dataset_dir);
            print_classes(&root, json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<LabelerConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => return Ok(LabelerConfig::default()),
    };
    let config = LabelerConfig::load(&path)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

fn run_label(config: LabelerConfig, invoice: &Path, images: &Path, strict: bool) -> Result<ExitCode> {
    let prompt = ConsolePrompt::stdio();
    match label_images(config, invoice, images, invoice_recognizer(), recognizer(), prompt) {
        Ok(stats) => {
            println!();
            println!("Labeled {} images", stats.total);
            println!("  auto-labeled: {}", stats.auto_labeled);
            println!("  needs review: {}", stats.needs_review);
            println!("  failed:       {}", stats.failed);
            Ok(ExitCode::SUCCESS)
        }
        Err(LabelError::Engine(e)) => Err(e).context("Labeling run aborted"),
        Err(e) => {
            eprintln!("{e}");
            Ok(ExitCode::from(e.exit_status(strict)))
        }
    }
}

fn print_classes(root: &Path, json: bool) -> Result<()> {
    let path = root.join(LABELS_FILE);
    if !path.exists() {
        bail!("No label table at {}", path.display());
    }
    let records = LabelTable::open(&path)?.read_all()?;
    let classes = summarize(&records);
    if json {
        println!("{}", serde_json::to_string_pretty(&classes)?);
        return Ok(());
    }
    for c in &classes {
        println!("{:>3}  {:<32} {:>5} images  {:>5} flagged  {}", c.id, c.label, c.images, c.needs_review, c.slug);
    }
    let unmatched = records.iter().filter(|r| r.is_unmatched()).count();
    println!("{} classes, {} rows, {} unmatched", classes.len(), records.len(), unmatched);
    Ok(())
}

#[cfg(feature = "tesseract")]
fn recognizer() -> Box<dyn OcrBackend> {
    use shelfscan_ocr::recognizer::tesseract_backend::TesseractRecognizer;
    use shelfscan_ocr::FallbackRecognizer;

    let data_path = std::env::var("TESSDATA_PREFIX").ok();
    Box::new(FallbackRecognizer::new(
        TesseractRecognizer::new(data_path.clone(), "eng"),
        TesseractRecognizer::new(data_path, "eng").with_page_seg_mode("11"),
    ))
}

#[cfg(not(feature = "tesseract"))]
fn recognizer() -> Box<dyn OcrBackend> {
    tracing::warn!("built without the `tesseract` feature; OCR is unavailable");
    Box::new(shelfscan_ocr::UnavailableRecognizer)
}

/// Image recognizer that also renders PDF invoices page by page.
#[cfg(feature = "pdf")]
fn invoice_recognizer() -> Box<dyn OcrBackend> {
    use shelfscan_ocr::document::pdfium_backend::PdfiumRasterizer;

    Box::new(shelfscan_ocr::PdfRecognizer::new(recognizer(), PdfiumRasterizer))
}

#[cfg(not(feature = "pdf"))]
fn invoice_recognizer() -> Box<dyn OcrBackend> {
    recognizer()
}
