use super::{DatasetError, DatasetResult, io_error};
use crate::classes::PlasticClass;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Box in top-left form, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ObjectBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnnotatedObject {
    pub class: String,
    pub bbox: ObjectBox,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AnnotationFile {
    #[serde(default)]
    pub objects: Vec<AnnotatedObject>,
}

/// One line of a YOLO label file; coordinates normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloLabel {
    pub class: PlasticClass,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl YoloLabel {
    pub fn from_object(
        object: &AnnotatedObject,
        image_width: u32,
        image_height: u32,
    ) -> DatasetResult<Self> {
        if image_width == 0 || image_height == 0 {
            return Err(DatasetError::EmptyImage {
                width: image_width,
                height: image_height,
            });
        }
        let class = object
            .class
            .parse::<PlasticClass>()
            .map_err(|e| DatasetError::UnknownClass(e.0))?;

        let (w, h) = (image_width as f64, image_height as f64);
        let b = &object.bbox;
        Ok(Self {
            class,
            x_center: (b.x + b.width / 2.0) / w,
            y_center: (b.y + b.height / 2.0) / h,
            width: b.width / w,
            height: b.height / h,
        })
    }
}

impl fmt::Display for YoloLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class.id(),
            self.x_center,
            self.y_center,
            self.width,
            self.height
        )
    }
}

impl AnnotationFile {
    pub fn load(path: &Path) -> DatasetResult<Self> {
        let text = std::fs::read_to_string(path).map_err(io_error(path))?;
        serde_json::from_str(&text).map_err(|source| DatasetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_yolo(&self, image_width: u32, image_height: u32) -> DatasetResult<Vec<YoloLabel>> {
        self.objects
            .iter()
            .map(|object| YoloLabel::from_object(object, image_width, image_height))
            .collect()
    }
}

/// Read a JSON annotation file and return its YOLO label lines
pub fn convert_annotations(
    annotation_file: &Path,
    image_width: u32,
    image_height: u32,
) -> DatasetResult<Vec<String>> {
    let labels = AnnotationFile::load(annotation_file)?.to_yolo(image_width, image_height)?;
    Ok(labels.iter().map(ToString::to_string).collect())
}
