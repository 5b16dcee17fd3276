use shelfscan_core::{LabelOutcome, LabelerConfig, MatchCandidate, RunStats};
use shelfscan_matching::{score, CorrectionPair, CorrectionStore, Matcher};
use shelfscan_ocr::{InvoiceError, InvoiceReader, OcrBackend, OcrError};
use shelfscan_storage::{Dataset, DatasetError};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single product image could not be labeled. Always recovered from:
/// the image is recorded as unmatched and the run continues.
#[derive(Debug, Error)]
pub enum ImageFailure {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Not a recognizable image: {0}")]
    NotAnImage(String),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("Could not copy into the dataset: {0}")]
    Store(#[source] DatasetError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to list images in {path}: {source}")]
    ListImages {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Dataset write failed: {0}")]
    Dataset(#[from] DatasetError),
}

#[derive(Debug, Error)]
pub enum LabelError {
    #[error(transparent)]
    Invoice(#[from] InvoiceError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl LabelError {
    /// Process exit status for a run that ended in this error. An unreadable
    /// invoice is reported and exits 0, or 2 under `strict`; anything else is 1.
    pub fn exit_status(&self, strict: bool) -> u8 {
        match self {
            LabelError::Invoice(_) if strict => 2,
            LabelError::Invoice(_) => 0,
            LabelError::Engine(_) => 1,
        }
    }
}

// ── Review port ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewChoice {
    /// Index into the candidate slice the reviewer was shown.
    Candidate(usize),
    NoneOfThese,
}

/// The human step of the labeling loop.
pub trait ReviewPrompt {
    fn choose(&mut self, query: &str, candidates: &[MatchCandidate]) -> io::Result<ReviewChoice>;

    /// Offered after a manual pick; `None` means no correction to learn.
    fn suggest_correction(&mut self, ocr_text: &str, chosen: &str) -> io::Result<Option<CorrectionPair>>;
}

impl<T: ReviewPrompt + ?Sized> ReviewPrompt for &mut T {
    fn choose(&mut self, query: &str, candidates: &[MatchCandidate]) -> io::Result<ReviewChoice> {
        (**self).choose(query, candidates)
    }

    fn suggest_correction(&mut self, ocr_text: &str, chosen: &str) -> io::Result<Option<CorrectionPair>> {
        (**self).suggest_correction(ocr_text, chosen)
    }
}

// ── Decision ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    AutoLabel(MatchCandidate),
    NeedsHumanChoice,
}

/// Auto-label only when a best match exists and reaches `threshold`.
pub fn decide(best: Option<MatchCandidate>, threshold: f32) -> Decision {
    match best {
        Some(candidate) if candidate.score >= threshold => Decision::AutoLabel(candidate),
        _ => Decision::NeedsHumanChoice,
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Run-wide labeling state: invoice candidates, learned corrections, and the
/// dataset being written.
pub struct LabelingSession<R: OcrBackend, P: ReviewPrompt> {
    recognizer: R,
    prompt: P,
    matcher: Matcher,
    corrections: CorrectionStore,
    dataset: Dataset,
    config: LabelerConfig,
    stats: RunStats,
}

impl<R: OcrBackend, P: ReviewPrompt> LabelingSession<R, P> {
    /// Loads corrections and opens (creating if needed) the dataset named in
    /// `config`.
    pub fn open(
        config: LabelerConfig,
        recognizer: R,
        prompt: P,
        descriptions: Vec<String>,
    ) -> Result<Self, DatasetError> {
        let corrections = CorrectionStore::load(&config.corrections_path);
        let dataset = Dataset::open(&config.dataset_dir)?;
        Ok(Self {
            recognizer,
            prompt,
            matcher: Matcher::new(descriptions),
            corrections,
            dataset,
            config,
            stats: RunStats::default(),
        })
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn corrections(&self) -> &CorrectionStore {
        &self.corrections
    }

    /// Label every image in `dir` in sorted filename order.
    pub fn run(&mut self, dir: &Path) -> Result<RunStats, EngineError> {
        let images = self.list_images(dir)?;
        info!(dir = %dir.display(), images = images.len(), candidates = self.matcher.candidates().len(), "labeling run started");
        for path in images {
            self.process_path(&path)?;
        }
        Ok(self.stats)
    }

    fn list_images(&self, dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let list_err = |source| EngineError::ListImages { path: dir.to_path_buf(), source };
        let mut images = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(list_err)? {
            let path = entry.map_err(list_err)?.path();
            if path.is_file() && self.config.is_image_path(&path) {
                images.push(path);
            }
        }
        images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(images)
    }

    /// Read one image from disk and label it. Read failures are recorded,
    /// not returned.
    pub fn process_path(&mut self, path: &Path) -> Result<LabelOutcome, EngineError> {
        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match std::fs::read(path) {
            Ok(bytes) => self.process_image(&filename, &bytes),
            Err(e) => self.finish(&filename, &[], Self::failed(&filename, ImageFailure::Io(e))),
        }
    }

    /// Drive one image to a terminal outcome and record it.
    pub fn process_image(&mut self, filename: &str, bytes: &[u8]) -> Result<LabelOutcome, EngineError> {
        let outcome = match self.recognize(bytes) {
            Ok(text) => self.label_text(&text),
            Err(failure) => Self::failed(filename, failure),
        };
        self.finish(filename, bytes, outcome)
    }

    fn recognize(&self, bytes: &[u8]) -> Result<String, ImageFailure> {
        let format = image::guess_format(bytes).map_err(|e| ImageFailure::NotAnImage(e.to_string()))?;
        debug!(?format, "image sniffed");
        Ok(self.recognizer.recognize(bytes)?.query_text())
    }

    fn failed(filename: &str, failure: ImageFailure) -> LabelOutcome {
        warn!(file = %filename, "image skipped: {failure}");
        LabelOutcome::Failed { reason: failure.to_string() }
    }

    /// Copy accepted images first, then append exactly one row. A failed copy
    /// downgrades the image to `Failed`; only a failed append ends the run.
    fn finish(&mut self, filename: &str, bytes: &[u8], outcome: LabelOutcome) -> Result<LabelOutcome, EngineError> {
        let outcome = if outcome.is_accepted() {
            match self.dataset.images().store(bytes, filename) {
                Ok(_) => outcome,
                Err(e) => Self::failed(filename, ImageFailure::Store(e)),
            }
        } else {
            outcome
        };
        let record = outcome.to_record(filename);
        self.dataset.table().append(&record)?;
        self.stats.observe(&outcome);
        info!(file = %filename, label = %record.label, confidence = record.confidence, "{outcome}");
        Ok(outcome)
    }

    /// Decide a label for raw OCR text, consulting the reviewer when the best
    /// match is below threshold.
    pub fn label_text(&mut self, raw: &str) -> LabelOutcome {
        let text = self.corrections.apply(raw);
        match decide(self.matcher.best_match(&text), self.config.threshold) {
            Decision::AutoLabel(best) => LabelOutcome::AutoLabeled { label: best.text, score: best.score },
            Decision::NeedsHumanChoice => self.review(&text),
        }
    }

    fn review(&mut self, text: &str) -> LabelOutcome {
        let candidates = self.matcher.top_k(text, self.config.review_candidates);
        let choice = self.prompt.choose(text, &candidates).unwrap_or_else(|e| {
            warn!("review prompt failed, skipping image: {e}");
            ReviewChoice::NoneOfThese
        });
        let chosen = match choice {
            ReviewChoice::Candidate(i) => match candidates.get(i) {
                Some(candidate) => candidate.text.clone(),
                None => {
                    warn!(index = i, shown = candidates.len(), "reviewer picked a missing candidate");
                    return LabelOutcome::Unmatched;
                }
            },
            ReviewChoice::NoneOfThese => return LabelOutcome::Unmatched,
        };

        let confidence = score(text, &chosen);
        match self.prompt.suggest_correction(text, &chosen) {
            Ok(Some(pair)) => self.learn(pair),
            Ok(None) => {}
            Err(e) => warn!("correction prompt failed: {e}"),
        }
        LabelOutcome::UserLabeled { label: chosen, score: confidence }
    }

    fn learn(&mut self, pair: CorrectionPair) {
        let (bad, good) = (pair.bad.clone(), pair.good.clone());
        match self.corrections.record(pair) {
            Ok(()) => info!(bad = %bad, good = %good, "correction learned"),
            Err(e) => warn!(bad = %bad, good = %good, "correction not persisted: {e}"),
        }
    }
}

/// Structure the invoice first, then label `images_dir` against its
/// descriptions. An unreadable invoice aborts before the dataset is touched.
pub fn label_images<I, R, P>(
    config: LabelerConfig,
    invoice: &Path,
    images_dir: &Path,
    invoice_ocr: I,
    image_ocr: R,
    prompt: P,
) -> Result<RunStats, LabelError>
where
    I: OcrBackend,
    R: OcrBackend,
    P: ReviewPrompt,
{
    let extraction = InvoiceReader::new(invoice_ocr).read_file(invoice)?;
    let descriptions = extraction.descriptions();
    if descriptions.is_empty() {
        warn!(invoice = %invoice.display(), "invoice has no line items; every image goes to review");
    }
    let mut session = LabelingSession::open(config, image_ocr, prompt, descriptions).map_err(EngineError::from)?;
    Ok(session.run(images_dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfscan_ocr::{MockRecognizer, OcrOutput};
    use shelfscan_storage::{LabelTable, IMAGES_DIR, LABELS_FILE};
    use std::collections::VecDeque;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    /// Fake image: PNG signature followed by the text the stub OCR reads back.
    fn fake_image(text: &str) -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(text.as_bytes());
        bytes
    }

    struct EchoRecognizer;

    impl OcrBackend for EchoRecognizer {
        fn name(&self) -> &str {
            "echo"
        }

        fn recognize(&self, image_bytes: &[u8]) -> Result<OcrOutput, OcrError> {
            let text = image_bytes
                .strip_prefix(PNG_MAGIC)
                .ok_or_else(|| OcrError::ImageDecode("no signature".into()))?;
            Ok(OcrOutput::from_text(String::from_utf8_lossy(text), 0.9))
        }
    }

    #[derive(Default)]
    struct ScriptedPrompt {
        choices: VecDeque<ReviewChoice>,
        corrections: VecDeque<Option<CorrectionPair>>,
        shown: Vec<(String, Vec<MatchCandidate>)>,
    }

    impl ReviewPrompt for ScriptedPrompt {
        fn choose(&mut self, query: &str, candidates: &[MatchCandidate]) -> io::Result<ReviewChoice> {
            self.shown.push((query.to_string(), candidates.to_vec()));
            Ok(self.choices.pop_front().unwrap_or(ReviewChoice::NoneOfThese))
        }

        fn suggest_correction(&mut self, _ocr_text: &str, _chosen: &str) -> io::Result<Option<CorrectionPair>> {
            Ok(self.corrections.pop_front().flatten())
        }
    }

    fn config(root: &Path) -> LabelerConfig {
        LabelerConfig {
            dataset_dir: root.join("dataset"),
            corrections_path: root.join("corrections.json"),
            ..LabelerConfig::default()
        }
    }

    fn descs(items: &[&str]) -> Vec<String> {
        items.iter().map(|d| d.to_string()).collect()
    }

    fn rows(root: &Path) -> Vec<shelfscan_core::LabelRecord> {
        LabelTable::open(root.join("dataset").join(LABELS_FILE)).unwrap().read_all().unwrap()
    }

    #[test]
    fn decide_respects_threshold_boundary() {
        let at = MatchCandidate::new("Whole Milk 2L", 0.70);
        assert_eq!(decide(Some(at.clone()), 0.70), Decision::AutoLabel(at));
        let below = MatchCandidate::new("Whole Milk 2L", 0.69999);
        assert_eq!(decide(Some(below), 0.70), Decision::NeedsHumanChoice);
        assert_eq!(decide(None, 0.70), Decision::NeedsHumanChoice);
        assert_eq!(decide(None, 0.0), Decision::NeedsHumanChoice);
    }

    #[test]
    fn close_match_is_auto_labeled() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ScriptedPrompt::default();
        let mut session = LabelingSession::open(
            config(dir.path()),
            EchoRecognizer,
            &mut prompt,
            descs(&["Organic Apples 5kg", "Whole Milk 2L"]),
        )
        .unwrap();

        let outcome = session.process_image("apples.jpg", &fake_image("organic apples 5 kg")).unwrap();
        let LabelOutcome::AutoLabeled { label, score } = &outcome else {
            panic!("expected auto label, got {outcome:?}");
        };
        assert_eq!(label, "Organic Apples 5kg");
        assert!(*score >= 0.85, "score was {score}");
        assert_eq!(session.stats().auto_labeled, 1);
        drop(session);

        assert!(prompt.shown.is_empty());
        let rows = rows(dir.path());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "Organic Apples 5kg");
        assert!(!rows[0].needs_review);
        assert!(dir.path().join("dataset").join(IMAGES_DIR).join("apples.jpg").exists());
    }

    #[test]
    fn empty_invoice_sends_everything_to_review() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ScriptedPrompt::default();
        let mut session =
            LabelingSession::open(config(dir.path()), EchoRecognizer, &mut prompt, Vec::new()).unwrap();

        let outcome = session.process_image("mystery.png", &fake_image("something")).unwrap();
        assert_eq!(outcome, LabelOutcome::Unmatched);
        drop(session);

        assert_eq!(prompt.shown.len(), 1);
        assert!(prompt.shown[0].1.is_empty());
        let rows = rows(dir.path());
        assert!(rows[0].is_unmatched());
        assert_eq!(rows[0].confidence, 0.0);
        assert!(rows[0].needs_review);
        assert!(!dir.path().join("dataset").join(IMAGES_DIR).join("mystery.png").exists());
    }

    #[test]
    fn manual_pick_learns_correction_for_next_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ScriptedPrompt {
            choices: VecDeque::from([ReviewChoice::Candidate(0)]),
            corrections: VecDeque::from([Some(CorrectionPair::new("rnilk", "milk").unwrap())]),
            ..ScriptedPrompt::default()
        };
        let mut session = LabelingSession::open(
            config(dir.path()),
            EchoRecognizer,
            &mut prompt,
            descs(&["Whole Milk 2L", "Rye Bread"]),
        )
        .unwrap();

        let first = session.process_image("m1.jpg", &fake_image("WH0LE rnilk")).unwrap();
        let LabelOutcome::UserLabeled { label, score } = &first else {
            panic!("expected user label, got {first:?}");
        };
        assert_eq!(label, "Whole Milk 2L");
        assert!(*score > 0.0 && *score < 0.70, "score was {score}");
        assert_eq!(session.corrections().get("rnilk"), Some("milk"));

        let second = session.process_image("m2.jpg", &fake_image("WH0LE rnilk")).unwrap();
        assert!(matches!(second, LabelOutcome::AutoLabeled { .. }), "got {second:?}");
        assert_eq!(session.stats().total, 2);
        assert_eq!(session.stats().needs_review, 1);
        drop(session);

        assert_eq!(prompt.shown.len(), 1);
        assert_eq!(prompt.shown[0].1[0].text, "Whole Milk 2L");
        assert_eq!(CorrectionStore::load(dir.path().join("corrections.json")).get("rnilk"), Some("milk"));
        let rows = rows(dir.path());
        assert!(rows[0].needs_review);
        assert!(!rows[1].needs_review);
    }

    #[test]
    fn correction_persist_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        // Parent is a regular file, so the directory cannot be created.
        std::fs::write(dir.path().join("blocker"), b"").unwrap();
        cfg.corrections_path = dir.path().join("blocker").join("corrections.json");
        let prompt = ScriptedPrompt {
            choices: VecDeque::from([ReviewChoice::Candidate(0)]),
            corrections: VecDeque::from([Some(CorrectionPair::new("rnilk", "milk").unwrap())]),
            ..ScriptedPrompt::default()
        };
        let mut session = LabelingSession::open(cfg, EchoRecognizer, prompt, descs(&["Whole Milk 2L"])).unwrap();

        let outcome = session.process_image("m.jpg", &fake_image("rnilk")).unwrap();
        assert!(matches!(outcome, LabelOutcome::UserLabeled { .. }));
        assert_eq!(session.corrections().get("rnilk"), Some("milk"));
    }

    #[test]
    fn out_of_range_pick_is_unmatched() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = ScriptedPrompt {
            choices: VecDeque::from([ReviewChoice::Candidate(7)]),
            ..ScriptedPrompt::default()
        };
        let mut session = LabelingSession::open(config(dir.path()), EchoRecognizer, prompt, descs(&["Eggs"])).unwrap();
        assert_eq!(session.process_image("x.jpg", &fake_image("zzz")).unwrap(), LabelOutcome::Unmatched);
    }

    #[test]
    fn unreadable_image_is_recorded_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("b.jpg"), fake_image("whole milk 2l")).unwrap();
        std::fs::write(images.join("a.png"), b"not an image at all").unwrap();
        std::fs::write(images.join("notes.txt"), b"ignored").unwrap();

        let mut session = LabelingSession::open(
            config(dir.path()),
            EchoRecognizer,
            ScriptedPrompt::default(),
            descs(&["Whole Milk 2L"]),
        )
        .unwrap();
        let stats = session.run(&images).unwrap();

        assert_eq!(stats, RunStats { total: 2, auto_labeled: 1, needs_review: 1, failed: 1 });
        let rows = rows(dir.path());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].filename, "a.png");
        assert!(rows[0].is_unmatched());
        assert_eq!(rows[1].filename, "b.jpg");
        assert_eq!(rows[1].label, "Whole Milk 2L");
    }

    #[test]
    fn failed_image_copy_is_recorded_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("photos");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("a.jpg"), fake_image("whole milk 2l")).unwrap();
        std::fs::write(images.join("b.jpg"), fake_image("rye bread")).unwrap();

        let mut session = LabelingSession::open(
            config(dir.path()),
            EchoRecognizer,
            ScriptedPrompt::default(),
            descs(&["Whole Milk 2L", "Rye Bread"]),
        )
        .unwrap();
        // Replace the image directory with a plain file so every copy fails.
        let store = dir.path().join("dataset").join(IMAGES_DIR);
        std::fs::remove_dir(&store).unwrap();
        std::fs::write(&store, b"").unwrap();

        let stats = session.run(&images).unwrap();
        assert_eq!(stats, RunStats { total: 2, auto_labeled: 0, needs_review: 2, failed: 2 });
        let rows = rows(dir.path());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.is_unmatched() && r.needs_review));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_filename_does_not_abort_run() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("photos");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join(OsStr::from_bytes(b"a\xff.jpg")), fake_image("whole milk 2l")).unwrap();
        std::fs::write(images.join("b.jpg"), fake_image("whole milk 2l")).unwrap();

        let mut session = LabelingSession::open(
            config(dir.path()),
            EchoRecognizer,
            ScriptedPrompt::default(),
            descs(&["Whole Milk 2L"]),
        )
        .unwrap();
        let stats = session.run(&images).unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.auto_labeled, 2);
        let rows = rows(dir.path());
        assert_eq!(rows[0].filename, "a\u{FFFD}.jpg");
        assert_eq!(rows[1].filename, "b.jpg");
        assert!(dir.path().join("dataset").join(IMAGES_DIR).join("b.jpg").exists());
    }

    #[test]
    fn unreadable_invoice_leaves_dataset_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let invoice = dir.path().join("invoice.jpg");
        std::fs::write(&invoice, fake_image("")).unwrap();

        let err = label_images(
            config(dir.path()),
            &invoice,
            dir.path(),
            MockRecognizer::new(""),
            EchoRecognizer,
            ScriptedPrompt::default(),
        )
        .unwrap_err();

        assert!(matches!(err, LabelError::Invoice(InvoiceError::Unreadable)));
        assert!(!dir.path().join("dataset").exists());
    }

    #[test]
    fn unreadable_invoice_exits_two_only_when_strict() {
        let dir = tempfile::tempdir().unwrap();
        let invoice = dir.path().join("invoice.png");
        std::fs::write(&invoice, b"scan").unwrap();

        let err = label_images(
            config(dir.path()),
            &invoice,
            dir.path(),
            MockRecognizer::new("  \n"),
            EchoRecognizer,
            ScriptedPrompt::default(),
        )
        .unwrap_err();

        assert_eq!(err.exit_status(true), 2);
        assert_eq!(err.exit_status(false), 0);
    }

    #[test]
    fn aborted_run_exits_one_regardless_of_strict() {
        let dir = tempfile::tempdir().unwrap();
        let invoice = dir.path().join("invoice.png");
        std::fs::write(&invoice, b"scan").unwrap();

        let err = label_images(
            config(dir.path()),
            &invoice,
            &dir.path().join("no-such-folder"),
            MockRecognizer::new("Whole Milk 2L"),
            EchoRecognizer,
            ScriptedPrompt::default(),
        )
        .unwrap_err();

        assert!(matches!(err, LabelError::Engine(EngineError::ListImages { .. })));
        assert_eq!(err.exit_status(true), 1);
        assert_eq!(err.exit_status(false), 1);
    }

    #[test]
    fn label_images_uses_invoice_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let invoice = dir.path().join("invoice.png");
        std::fs::write(&invoice, b"scan").unwrap();
        let images = dir.path().join("photos");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("apples.jpg"), fake_image("organic apples 5 kg")).unwrap();

        let stats = label_images(
            config(dir.path()),
            &invoice,
            &images,
            MockRecognizer::new("1234 Organic Apples 5kg 2 x 12.50\nWhole Milk 2L"),
            EchoRecognizer,
            ScriptedPrompt::default(),
        )
        .unwrap();

        assert_eq!(stats.auto_labeled, 1);
        assert_eq!(rows(dir.path())[0].label, "Organic Apples 5kg");
    }
}
