pub mod classes;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod models;
pub mod render;

pub use classes::{Color, ColorMap, FALLBACK_COLOR, PlasticClass};
pub use error::{AnnotateError, FieldProblem, ValidationError};
pub use inference::{Detector, DetectorConfig, InferenceError};
pub use models::{Detection, PixelRect, PredictionSet};
pub use render::{AnnotationStyle, Annotator, LabelFont};
