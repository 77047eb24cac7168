use crate::error::{FieldProblem, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Axis-aligned box in corner form, in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl PixelRect {
    /// Corners snapped to the pixel grid: `(left, top, right, bottom)`, inclusive.
    /// Values beyond the `i32` range saturate.
    pub fn to_pixels(&self) -> (i32, i32, i32, i32) {
        (
            self.x1.round() as i32,
            self.y1.round() as i32,
            self.x2.round() as i32,
            self.y2.round() as i32,
        )
    }
}

/// One predicted object, box in center form.
///
/// Serialized with the hosted API's key names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(rename = "x")]
    pub center_x: f32,
    #[serde(rename = "y")]
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_id: Option<String>,
}

impl Detection {
    pub fn new(
        class_name: impl Into<String>,
        center_x: f32,
        center_y: f32,
        width: f32,
        height: f32,
        confidence: f32,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            center_x,
            center_y,
            width,
            height,
            confidence,
            class_id: None,
            detection_id: None,
        }
    }

    /// Center form to corner form. Non-positive sizes are not rejected.
    pub fn rect(&self) -> PixelRect {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        PixelRect {
            x1: self.center_x - half_w,
            y1: self.center_y - half_h,
            x2: self.center_x + half_w,
            y2: self.center_y + half_h,
        }
    }

    /// Confidence as a whole percentage, e.g. `0.87` -> `87`
    pub fn confidence_percent(&self) -> i64 {
        (self.confidence * 100.0).round() as i64
    }

    /// Label drawn next to the box, e.g. `"fiber 87%"`
    pub fn label(&self) -> String {
        format!("{} {}%", self.class_name, self.confidence_percent())
    }

    /// Build a detection from one raw record of the API response
    pub fn from_record(index: usize, record: &Value) -> Result<Self, ValidationError> {
        let fields = record.as_object().ok_or(ValidationError {
            index: Some(index),
            field: "prediction",
            problem: FieldProblem::WrongType("an object"),
        })?;

        let class_name = match fields.get("class") {
            None | Some(Value::Null) => return Err(missing(index, "class")),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(wrong_type(index, "class", "a string")),
        };

        let confidence = number_field(index, fields, "confidence")?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError {
                index: Some(index),
                field: "confidence",
                problem: FieldProblem::OutOfRange("[0, 1]"),
            });
        }

        Ok(Detection {
            class_name,
            center_x: number_field(index, fields, "x")?,
            center_y: number_field(index, fields, "y")?,
            width: number_field(index, fields, "width")?,
            height: number_field(index, fields, "height")?,
            confidence,
            class_id: fields
                .get("class_id")
                .and_then(Value::as_u64)
                .and_then(|id| u32::try_from(id).ok()),
            detection_id: fields
                .get("detection_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

fn missing(index: usize, field: &'static str) -> ValidationError {
    ValidationError {
        index: Some(index),
        field,
        problem: FieldProblem::Missing,
    }
}

fn wrong_type(index: usize, field: &'static str, expected: &'static str) -> ValidationError {
    ValidationError {
        index: Some(index),
        field,
        problem: FieldProblem::WrongType(expected),
    }
}

fn number_field(
    index: usize,
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<f32, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(missing(index, field)),
        Some(value) => value
            .as_f64()
            .map(|v| v as f32)
            .filter(|v| v.is_finite())
            .ok_or_else(|| wrong_type(index, field, "a finite number")),
    }
}

/// Size of the image the service ran inference on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

/// Parsed response of the hosted detection API
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictionSet {
    pub predictions: Vec<Detection>,
    pub image: Option<ImageInfo>,
    /// Server-side inference time in seconds
    pub time: Option<f64>,
}

impl PredictionSet {
    /// Validate a full response.
    ///
    /// A missing `predictions` key means nothing was detected. Every record
    /// is checked before any is returned.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let envelope = value.as_object().ok_or(ValidationError {
            index: None,
            field: "predictions",
            problem: FieldProblem::WrongType("inside a JSON object"),
        })?;

        let predictions = match envelope.get("predictions") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(records)) => records
                .iter()
                .enumerate()
                .map(|(i, record)| Detection::from_record(i, record))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ValidationError {
                    index: None,
                    field: "predictions",
                    problem: FieldProblem::WrongType("an array"),
                });
            }
        };

        let image = envelope
            .get("image")
            .and_then(|v| serde_json::from_value::<ImageInfo>(v.clone()).ok());
        let time = envelope.get("time").and_then(Value::as_f64);

        Ok(Self {
            predictions,
            image,
            time,
        })
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Human-readable report of what was found
    pub fn summary(&self) -> String {
        let rule = "=".repeat(50);
        let mut out = format!("\n{rule}\nDetection Summary\n{rule}\n");
        out.push_str(&format!("Total microplastics detected: {}\n", self.len()));

        if self.is_empty() {
            out.push_str("No microplastics detected in the image.\n");
        } else {
            out.push_str("\nDetailed Results:\n");
            for (i, det) in self.predictions.iter().enumerate() {
                out.push_str(&format!(
                    "  {}. Class: {} | Confidence: {:.1}%\n",
                    i + 1,
                    det.class_name,
                    det.confidence * 100.0
                ));
            }
        }
        out.push_str(&format!("{rule}\n"));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rect_from_center() {
        let det = Detection::new("fiber", 100.0, 100.0, 40.0, 20.0, 0.87);
        let rect = det.rect();
        assert_eq!(rect, PixelRect { x1: 80.0, y1: 90.0, x2: 120.0, y2: 110.0 });
        assert_eq!(rect.to_pixels(), (80, 90, 120, 110));
        assert_eq!(det.label(), "fiber 87%");
    }

    #[test]
    fn test_huge_rect_saturates() {
        let rect = Detection::new("fiber", 0.0, -3e9, 1e10, 10.0, 0.5).rect();
        let (left, top, right, bottom) = rect.to_pixels();
        assert_eq!((left, right), (i32::MIN, i32::MAX));
        assert_eq!((top, bottom), (i32::MIN, i32::MIN));
    }

    #[test]
    fn test_positive_size_gives_ordered_corners() {
        let sizes = [(0.5, 0.5), (1.0, 3.0), (40.0, 20.0), (1234.5, 0.01)];
        for (cx, cy) in [(0.0, 0.0), (-10.0, 55.5), (640.0, 480.0)] {
            for (w, h) in sizes {
                let rect = Detection::new("film", cx, cy, w, h, 0.5).rect();
                assert!(rect.x1 < rect.x2, "x1 < x2 for w={w}");
                assert!(rect.y1 < rect.y2, "y1 < y2 for h={h}");
            }
        }
    }

    #[test]
    fn test_label_rounding() {
        assert_eq!(Detection::new("foam", 0.0, 0.0, 1.0, 1.0, 0.0).label(), "foam 0%");
        assert_eq!(Detection::new("foam", 0.0, 0.0, 1.0, 1.0, 1.0).label(), "foam 100%");
        assert_eq!(Detection::new("pellet", 0.0, 0.0, 1.0, 1.0, 0.504).label(), "pellet 50%");
        assert_eq!(Detection::new("pellet", 0.0, 0.0, 1.0, 1.0, 0.996).label(), "pellet 100%");
    }

    #[test]
    fn test_parse_response() {
        let value = json!({
            "time": 0.042,
            "image": {"width": 640, "height": 480},
            "predictions": [
                {"x": 100, "y": 100.5, "width": 40, "height": 20, "confidence": 0.87,
                 "class": "fiber", "class_id": 4, "detection_id": "abc"},
                {"x": 10, "y": 10, "width": 4, "height": 2, "confidence": 0.5, "class": "foam"}
            ]
        });

        let set = PredictionSet::from_value(&value).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.image, Some(ImageInfo { width: 640, height: 480 }));
        assert_eq!(set.predictions[0].center_y, 100.5);
        assert_eq!(set.predictions[0].class_id, Some(4));
        assert_eq!(set.predictions[0].detection_id.as_deref(), Some("abc"));
        assert_eq!(set.predictions[1].class_id, None);
    }

    #[test]
    fn test_missing_predictions_key_is_empty() {
        let set = PredictionSet::from_value(&json!({"time": 1.0})).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_missing_confidence_names_field() {
        let value = json!({"predictions": [
            {"x": 1, "y": 1, "width": 2, "height": 2, "confidence": 0.9, "class": "film"},
            {"x": 1, "y": 1, "width": 2, "height": 2, "class": "film"}
        ]});

        let err = PredictionSet::from_value(&value).unwrap_err();
        assert_eq!(err.index, Some(1));
        assert_eq!(err.field, "confidence");
        assert_eq!(err.problem, FieldProblem::Missing);
        assert_eq!(err.to_string(), "prediction #1: field `confidence` is missing");
    }

    #[test]
    fn test_wrong_types_rejected() {
        let value = json!({"predictions": [
            {"x": "1", "y": 1, "width": 2, "height": 2, "confidence": 0.9, "class": "film"}
        ]});
        let err = PredictionSet::from_value(&value).unwrap_err();
        assert_eq!(err.field, "x");
        assert!(matches!(err.problem, FieldProblem::WrongType(_)));

        let err = PredictionSet::from_value(&json!({"predictions": {}})).unwrap_err();
        assert_eq!(err.index, None);

        let err = PredictionSet::from_value(&json!([1, 2])).unwrap_err();
        assert_eq!(err.field, "predictions");
    }

    #[test]
    fn test_confidence_out_of_range() {
        let value = json!({"predictions": [
            {"x": 1, "y": 1, "width": 2, "height": 2, "confidence": 1.5, "class": "film"}
        ]});
        let err = PredictionSet::from_value(&value).unwrap_err();
        assert!(matches!(err.problem, FieldProblem::OutOfRange(_)));
    }

    #[test]
    fn test_summary_lines() {
        let set = PredictionSet {
            predictions: vec![Detection::new("fiber", 1.0, 1.0, 1.0, 1.0, 0.873)],
            ..Default::default()
        };
        let summary = set.summary();
        assert!(summary.contains("Total microplastics detected: 1"));
        assert!(summary.contains("  1. Class: fiber | Confidence: 87.3%"));

        let empty = PredictionSet::default().summary();
        assert!(empty.contains("No microplastics detected in the image."));
    }

    #[test]
    fn test_serializes_with_api_keys() {
        let det = Detection::new("pellet", 3.0, 4.0, 5.0, 6.0, 0.25);
        let value = serde_json::to_value(&det).unwrap();
        assert_eq!(value["class"], "pellet");
        assert_eq!(value["x"], 3.0);
        assert!(value.get("class_id").is_none());
        let back = Detection::from_record(0, &value).unwrap();
        assert_eq!(back, det);
    }
}
