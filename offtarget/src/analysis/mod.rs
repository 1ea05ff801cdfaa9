pub mod annotation;
pub mod combiner;

pub use annotation::{annotate, AnnotationFeature, AnnotationReference};
pub use combiner::{combine, CandidateRow, CandidateTable};
