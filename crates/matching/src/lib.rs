pub mod corrections;
pub mod matcher;
pub mod normalize;
pub mod similarity;

pub use corrections::{CorrectionError, CorrectionPair, CorrectionStore};
pub use matcher::Matcher;
pub use normalize::normalize;
pub use similarity::{ratio, score};
