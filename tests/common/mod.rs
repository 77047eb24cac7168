#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from plastiscan for tests
pub use plastiscan::{
    AnnotateError, Annotator, Color, ColorMap, Detection, FieldProblem, LabelFont, PlasticClass,
    PredictionSet,
};
