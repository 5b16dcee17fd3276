use shelfscan_core::MatchCandidate;
use tracing::trace;

use crate::similarity::score;

/// Scores OCR text against a fixed set of invoice descriptions.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    candidates: Vec<String>,
}

impl Matcher {
    /// Candidate order matters: ties go to the earliest description.
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Highest-scoring candidate. Only a strictly better score replaces the
    /// current best, so the first of equal candidates wins and a candidate
    /// scoring 0.0 is never returned.
    pub fn best_match(&self, query: &str) -> Option<MatchCandidate> {
        let mut best: Option<MatchCandidate> = None;
        let mut best_score = 0.0f32;
        for desc in &self.candidates {
            let s = score(query, desc);
            trace!(candidate = %desc, score = s, "scored");
            if s > best_score {
                best_score = s;
                best = Some(MatchCandidate::new(desc.clone(), s));
            }
        }
        best
    }

    /// The `k` best candidates, highest first. Equal scores keep input order
    /// and duplicate descriptions are not merged.
    pub fn top_k(&self, query: &str, k: usize) -> Vec<MatchCandidate> {
        let mut ranked: Vec<MatchCandidate> = self
            .candidates
            .iter()
            .map(|desc| MatchCandidate::new(desc.clone(), score(query, desc)))
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);
        ranked
    }
}
