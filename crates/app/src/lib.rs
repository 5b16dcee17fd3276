pub mod console;
pub mod engine;

pub use console::ConsolePrompt;
pub use engine::{
    decide, label_images, Decision, EngineError, ImageFailure, LabelError, LabelingSession, ReviewChoice,
    ReviewPrompt,
};
