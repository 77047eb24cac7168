use super::{DatasetError, DatasetResult, io_error};
use crate::classes::PlasticClass;
use std::path::Path;

/// Annotation counts per class, in class id order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassDistribution {
    counts: [usize; PlasticClass::ALL.len()],
    pub label_files: usize,
}

impl ClassDistribution {
    pub fn add(&mut self, class: PlasticClass, count: usize) {
        self.counts[class.id()] += count;
    }

    pub fn count(&self, class: PlasticClass) -> usize {
        self.counts[class.id()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn percentage(&self, class: PlasticClass) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(class) as f64 / total as f64 * 100.0,
        }
    }

    /// Text report with one bar block per two percent
    pub fn report(&self) -> String {
        let mut out = format!("Total annotations: {}\n\nClass distribution:\n", self.total());
        for class in PlasticClass::ALL {
            let pct = self.percentage(class);
            let bar = "█".repeat((pct / 2.0) as usize);
            out.push_str(&format!(
                "  {:<10}: {:>3} ({:>5.1}%) {}\n",
                class.name(),
                self.count(class),
                pct,
                bar
            ));
        }
        out
    }
}

/// Count annotations in every `.txt` YOLO label file under `labels_dir`
pub fn class_distribution(labels_dir: &Path) -> DatasetResult<ClassDistribution> {
    let mut distribution = ClassDistribution::default();
    visit(labels_dir, &mut distribution)?;
    log::debug!(
        "Read {} label files under {}",
        distribution.label_files,
        labels_dir.display()
    );
    Ok(distribution)
}

fn visit(dir: &Path, distribution: &mut ClassDistribution) -> DatasetResult<()> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(io_error(dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error(dir))?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            visit(&path, distribution)?;
        } else if path.extension().is_some_and(|ext| ext == "txt") {
            count_label_file(&path, distribution)?;
        }
    }
    Ok(())
}

fn count_label_file(path: &Path, distribution: &mut ClassDistribution) -> DatasetResult<()> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        let id: usize = first.parse().map_err(|_| DatasetError::MalformedLabel {
            path: path.to_path_buf(),
            line: line_no,
        })?;
        let class = PlasticClass::from_id(id).ok_or_else(|| DatasetError::UnknownClassId {
            path: path.to_path_buf(),
            line: line_no,
            id,
        })?;
        distribution.add(class, 1);
    }
    distribution.label_files += 1;
    Ok(())
}
