use shelfscan_core::LabelRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const LABELS_FILE: &str = "labels.csv";
pub const IMAGES_DIR: &str = "images";
pub const LABELS_HEADER: &str = "filename,label,confidence,needs_review";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Not a plain file name: '{0}'")]
    InvalidFilename(String),
}

// ── Label table ───────────────────────────────────────────────────────────────

/// Append-only CSV of label records. The file is opened per operation; no
/// handle is held between images.
#[derive(Debug, Clone)]
pub struct LabelTable {
    path: PathBuf,
}

impl LabelTable {
    /// Create the table (with header) if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            std::fs::write(&path, format!("{LABELS_HEADER}\n"))?;
        }
        Ok(Self { path })
    }

    /// Append one row with a single write.
    pub fn append(&self, record: &LabelRecord) -> Result<(), DatasetError> {
        let row = format_row(record);
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(row.as_bytes())?;
        debug!(file = %record.filename, label = %record.label, "label row appended");
        Ok(())
    }

    /// Parse every row. Legacy `filename,label,timestamp` rows are accepted
    /// with confidence 0 and no review flag.
    pub fn read_all(&self) -> Result<Vec<LabelRecord>, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result?;
            let (Some(filename), Some(label)) = (row.get(0), row.get(1)) else {
                continue;
            };
            let filename = filename.trim();
            if filename.is_empty() {
                continue;
            }
            let is_current = row.len() >= 4;
            records.push(LabelRecord {
                filename: filename.to_string(),
                label: label.trim().to_string(),
                confidence: if is_current {
                    row.get(2).and_then(|c| c.trim().parse().ok()).unwrap_or(0.0)
                } else {
                    0.0
                },
                needs_review: is_current && row.get(3).is_some_and(|r| r.trim() == "true"),
            });
        }
        Ok(records)
    }
}

/// `name,"label",0.000,true|false` plus newline. The label is always quoted
/// with embedded quotes doubled; the filename is quoted only when it would
/// otherwise break the row.
pub fn format_row(record: &LabelRecord) -> String {
    let filename = if record.filename.contains([',', '"', '\n', '\r']) {
        quote(&record.filename)
    } else {
        record.filename.clone()
    };
    format!(
        "{},{},{:.3},{}\n",
        filename,
        quote(&record.label),
        record.confidence,
        record.needs_review
    )
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

// ── Image store ───────────────────────────────────────────────────────────────

/// Flat directory of accepted images, keyed by original file name.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Write `bytes` under `filename`, replacing any earlier file of that name.
    pub fn store(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, DatasetError> {
        let is_plain = Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename);
        if !is_plain || filename == "." || filename == ".." {
            return Err(DatasetError::InvalidFilename(filename.to_string()));
        }
        let dest = self.dir.join(filename);
        std::fs::write(&dest, bytes)?;
        Ok(dest)
    }
}

// ── Dataset ───────────────────────────────────────────────────────────────────

/// `<root>/labels.csv` plus `<root>/images/`.
#[derive(Debug, Clone)]
pub struct Dataset {
    table: LabelTable,
    images: ImageStore,
}

impl Dataset {
    pub fn open(root: &Path) -> Result<Self, DatasetError> {
        Ok(Self {
            table: LabelTable::open(root.join(LABELS_FILE))?,
            images: ImageStore::open(root.join(IMAGES_DIR))?,
        })
    }

    pub fn table(&self) -> &LabelTable {
        &self.table
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
