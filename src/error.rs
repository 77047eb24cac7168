use std::path::PathBuf;
use thiserror::Error;

/// What is wrong with a single field of a prediction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldProblem {
    #[error("is missing")]
    Missing,
    #[error("must be {0}")]
    WrongType(&'static str),
    #[error("must be within {0}")]
    OutOfRange(&'static str),
}

/// A malformed prediction record.
///
/// `index` is `None` when the problem is with the envelope rather than
/// with one of the records inside it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}field `{field}` {problem}", record_prefix(.index))]
pub struct ValidationError {
    pub index: Option<usize>,
    pub field: &'static str,
    pub problem: FieldProblem,
}

fn record_prefix(index: &Option<usize>) -> String {
    index
        .map(|index| format!("prediction #{index}: "))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("cannot open image {path}: {source}")]
    ResourceUnavailable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid prediction: {0}")]
    Validation(#[from] ValidationError),

    #[error("cannot write annotated image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type AnnotateResult<T> = Result<T, AnnotateError>;
