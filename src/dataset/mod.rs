//! Preparation of a YOLO-format training dataset for the plastic classes.
//!
//! Covers the directory layout, split arithmetic, label conversion, class
//! statistics and the dataset YAML consumed by the training tooling.

pub mod convert;
pub mod stats;

pub use convert::{AnnotatedObject, AnnotationFile, ObjectBox, YoloLabel, convert_annotations};
pub use stats::{ClassDistribution, class_distribution};

use crate::classes::PlasticClass;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DATA_YAML_NAME: &str = "microplastics.yaml";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid annotation file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize dataset YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown class `{0}`")]
    UnknownClass(String),

    #[error("{path}:{line}: unknown class id {id}")]
    UnknownClassId { path: PathBuf, line: usize, id: usize },

    #[error("{path}:{line}: malformed label line")]
    MalformedLabel { path: PathBuf, line: usize },

    #[error("invalid split ratios: {0}")]
    InvalidRatios(String),

    #[error("image size must be non-zero, got {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DatasetError + '_ {
    move |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn dir_name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// `<root>/{train,val,test}/{images,labels}`
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self, split: Split) -> PathBuf {
        self.root.join(split.dir_name()).join("images")
    }

    pub fn labels_dir(&self, split: Split) -> PathBuf {
        self.root.join(split.dir_name()).join("labels")
    }

    /// Create every split directory; existing ones are left alone
    pub fn setup(&self) -> DatasetResult<Vec<PathBuf>> {
        let mut created = Vec::new();
        for split in Split::ALL {
            for dir in [self.images_dir(split), self.labels_dir(split)] {
                std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;
                created.push(dir);
            }
        }
        log::info!("Dataset directories ready under {}", self.root.display());
        Ok(created)
    }

    pub fn data_yaml(&self) -> DataYaml {
        let path = std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone());
        DataYaml {
            path: path.to_string_lossy().into_owned(),
            train: "train/images".to_string(),
            val: "val/images".to_string(),
            test: "test/images".to_string(),
            nc: PlasticClass::ALL.len(),
            names: PlasticClass::names().into_iter().map(str::to_string).collect(),
        }
    }

    /// Write `microplastics.yaml` at the dataset root
    pub fn write_data_yaml(&self) -> DatasetResult<(DataYaml, PathBuf)> {
        std::fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        let yaml = self.data_yaml();
        let path = self.root.join(DATA_YAML_NAME);
        std::fs::write(&path, serde_yaml::to_string(&yaml)?).map_err(io_error(&path))?;
        Ok((yaml, path))
    }
}

/// Dataset description read by YOLO trainers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataYaml {
    pub path: String,
    pub train: String,
    pub val: String,
    pub test: String,
    pub nc: usize,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.2,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    pub fn validate(&self) -> DatasetResult<()> {
        let parts = [self.train, self.val, self.test];
        if parts.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(DatasetError::InvalidRatios(format!(
                "ratios must be non-negative, got {self}"
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(DatasetError::InvalidRatios(format!(
                "ratios must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SplitRatios {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.train, self.val, self.test)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCounts {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitCounts {
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

/// Train and val are floored; test takes the remainder so nothing is lost
pub fn split_counts(total: usize, ratios: SplitRatios) -> DatasetResult<SplitCounts> {
    ratios.validate()?;
    let train = ((total as f64 * ratios.train).floor() as usize).min(total);
    let val = ((total as f64 * ratios.val).floor() as usize).min(total - train);
    Ok(SplitCounts {
        train,
        val,
        test: total - train - val,
    })
}
