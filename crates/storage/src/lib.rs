pub mod classes;
pub mod dataset;

pub use classes::{class_map, class_slug, summarize, ClassSummary};
pub use dataset::{
    format_row, Dataset, DatasetError, ImageStore, LabelTable, IMAGES_DIR, LABELS_FILE, LABELS_HEADER,
};
