use shelfscan_core::MatchCandidate;
use shelfscan_matching::CorrectionPair;
use std::io::{self, BufRead, Write};

use crate::engine::{ReviewChoice, ReviewPrompt};

/// Interactive reviewer on a line-oriented terminal. Blocks until a valid
/// answer is typed; end of input counts as "none of these".
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// `None` on end of input.
    fn read_answer(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> ReviewPrompt for ConsolePrompt<R, W> {
    fn choose(&mut self, query: &str, candidates: &[MatchCandidate]) -> io::Result<ReviewChoice> {
        writeln!(self.output)?;
        writeln!(self.output, "OCR text: {query}")?;
        if candidates.is_empty() {
            writeln!(self.output, "No invoice descriptions to choose from.")?;
        }
        for (i, c) in candidates.iter().enumerate() {
            writeln!(self.output, "  {}) {} ({:.2})", i + 1, c.text, c.score)?;
        }
        writeln!(self.output, "  0) Unmatched / skip")?;

        loop {
            write!(self.output, "Select [0-{}]: ", candidates.len())?;
            self.output.flush()?;
            let Some(answer) = self.read_answer()? else {
                return Ok(ReviewChoice::NoneOfThese);
            };
            match answer.parse::<usize>() {
                Ok(0) => return Ok(ReviewChoice::NoneOfThese),
                Ok(n) if n <= candidates.len() => return Ok(ReviewChoice::Candidate(n - 1)),
                _ => writeln!(self.output, "Invalid choice '{answer}'.")?,
            }
        }
    }

    fn suggest_correction(&mut self, ocr_text: &str, chosen: &str) -> io::Result<Option<CorrectionPair>> {
        writeln!(self.output, "Labeled '{chosen}'. OCR read: {ocr_text}")?;
        loop {
            write!(self.output, "Correction as bad->good (blank to skip): ")?;
            self.output.flush()?;
            let Some(answer) = self.read_answer()? else {
                return Ok(None);
            };
            if answer.is_empty() {
                return Ok(None);
            }
            match answer.parse::<CorrectionPair>() {
                Ok(pair) => return Ok(Some(pair)),
                Err(e) => writeln!(self.output, "{e}")?,
            }
        }
    }
}
