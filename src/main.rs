use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use plastiscan::dataset::{self, DatasetLayout, SplitRatios};
use plastiscan::inference::{self, Detector, DetectorConfig};
use plastiscan::{Annotator, ColorMap, LabelFont, PredictionSet};

#[derive(Parser)]
#[command(name = "plastiscan")]
#[command(about = "Detect microplastics in images and draw the results")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send an image to the hosted model and report what it found
    Detect {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Where to save the results JSON (default: <stem>_results.json)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// API key (default: $ROBOFLOW_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Model to query
        #[arg(long, default_value = inference::DEFAULT_MODEL_ID)]
        model: String,

        /// Request timeout in seconds
        #[arg(long, value_name = "SECS", default_value_t = 60)]
        timeout: u64,

        /// Also draw the boxes; optional path as --annotate=OUT (default: <stem>_detected.<ext>)
        #[arg(long, value_name = "OUT", num_args = 0..=1, require_equals = true)]
        annotate: Option<Option<PathBuf>>,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Draw boxes from a saved results JSON
    Annotate {
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        #[arg(value_name = "PREDICTIONS")]
        predictions: PathBuf,

        #[arg(value_name = "OUT")]
        output: PathBuf,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Dataset preparation helpers
    #[command(subcommand)]
    Dataset(DatasetCommand),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// JSON file with class colors, e.g. {"colors": {"film": "#FF6B9D"}, "fallback": "#FFFFFF"}
    #[arg(long, value_name = "FILE")]
    colors: Option<PathBuf>,

    /// TrueType font for labels (falls back to system fonts, then a built-in font)
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,

    /// Use the font compiled into the binary, for identical output across machines
    #[arg(long, conflicts_with = "font")]
    builtin_font: bool,

    /// Outline thickness in pixels
    #[arg(long, default_value_t = 4)]
    stroke_width: u32,

    /// Label distance above the box; negative values move it inside
    #[arg(long, default_value_t = 25, allow_negative_numbers = true)]
    label_offset: i32,

    /// Label text height in pixels
    #[arg(long, value_name = "PX", default_value_t = 16.0)]
    label_size: f32,
}

impl RenderArgs {
    fn annotator(&self) -> anyhow::Result<Annotator> {
        let colors = match &self.colors {
            Some(path) => ColorMap::from_json_file(path)?,
            None => ColorMap::shared_default().clone(),
        };
        let font = if self.builtin_font {
            LabelFont::builtin()
        } else {
            LabelFont::load(self.font.as_deref())
        };
        if let (Some(path), true) = (&self.font, font.is_builtin()) {
            log::warn!("Could not load font {}, using built-in font", path.display());
        }
        Ok(Annotator::new(colors, font)
            .with_stroke_width(self.stroke_width)
            .with_label_offset(self.label_offset)
            .with_label_px(self.label_size))
    }
}

#[derive(Subcommand)]
enum DatasetCommand {
    /// Create the train/val/test directory layout
    Setup {
        #[arg(default_value = "dataset")]
        root: PathBuf,
    },

    /// Show how many images go to each split
    Split {
        total: usize,
        #[arg(long, default_value_t = 0.7)]
        train: f64,
        #[arg(long, default_value_t = 0.2)]
        val: f64,
        #[arg(long, default_value_t = 0.1)]
        test: f64,
    },

    /// Class distribution of YOLO label files
    Stats {
        #[arg(value_name = "LABELS_DIR")]
        labels_dir: PathBuf,
    },

    /// Convert a JSON annotation file to YOLO label lines
    Convert {
        #[arg(value_name = "ANNOTATIONS")]
        annotations: PathBuf,
        /// Source image, used for its dimensions
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,
        /// Write lines here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write microplastics.yaml for the trainer
    Yaml {
        #[arg(default_value = "dataset")]
        root: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Detect {
            image_path,
            output,
            api_key,
            model,
            timeout,
            annotate,
            render,
        } => {
            let mut config = DetectorConfig::from_env()
                .with_model_id(model)
                .with_timeout(Duration::from_secs(timeout));
            if let Some(key) = api_key {
                config = config.with_api_key(key);
            }
            run_detect(&image_path, output.as_deref(), config, annotate, &render)
        }
        Command::Annotate {
            image_path,
            predictions,
            output,
            render,
        } => run_annotate(&image_path, &predictions, &output, &render),
        Command::Dataset(command) => run_dataset(command),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn run_detect(
    image_path: &Path,
    output: Option<&Path>,
    config: DetectorConfig,
    annotate: Option<Option<PathBuf>>,
    render: &RenderArgs,
) -> anyhow::Result<()> {
    if !inference::is_allowed_image(image_path) {
        log::warn!(
            "{} does not have a usual image extension ({})",
            image_path.display(),
            inference::ALLOWED_EXTENSIONS.join(", ")
        );
    }

    let annotator = annotate.as_ref().map(|_| render.annotator()).transpose()?;

    let detector = Detector::new(config)?;
    let (outcome, results_path) = detector
        .detect_and_save(image_path, output)
        .with_context(|| format!("Detection failed for {}", image_path.display()))?;

    print!("{}", outcome.predictions.summary());
    println!("Results saved to: {}", results_path.display());

    if let (Some(annotator), Some(target)) = (annotator, annotate) {
        let target = target.unwrap_or_else(|| inference::default_annotated_path(image_path));
        annotator.render_file(image_path, &outcome.predictions.predictions, &target)?;
        println!("Annotated image saved to {}", target.display());
    }

    Ok(())
}

fn run_annotate(
    image_path: &Path,
    predictions: &Path,
    output: &Path,
    render: &RenderArgs,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(predictions)
        .with_context(|| format!("Failed to read {}", predictions.display()))?;
    let response: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", predictions.display()))?;

    let annotator = render.annotator()?;
    let set: PredictionSet = annotator.render_response(image_path, &response, output)?;

    println!(
        "Drew {} detections, saved to {}",
        set.len(),
        output.display()
    );
    Ok(())
}

fn run_dataset(command: DatasetCommand) -> anyhow::Result<()> {
    match command {
        DatasetCommand::Setup { root } => {
            let layout = DatasetLayout::new(root);
            for dir in layout.setup()? {
                println!("  {}", dir.display());
            }
        }
        DatasetCommand::Split {
            total,
            train,
            val,
            test,
        } => {
            let ratios = SplitRatios { train, val, test };
            let counts = dataset::split_counts(total, ratios)?;
            println!("Splitting {total} images ({ratios}):");
            println!("  - Training images: {}", counts.train);
            println!("  - Validation images: {}", counts.val);
            println!("  - Test images: {}", counts.test);
        }
        DatasetCommand::Stats { labels_dir } => {
            let distribution = dataset::class_distribution(&labels_dir)?;
            println!("Label files: {}", distribution.label_files);
            print!("{}", distribution.report());
        }
        DatasetCommand::Convert {
            annotations,
            image_path,
            output,
        } => {
            let (width, height) = image::image_dimensions(&image_path)
                .with_context(|| format!("Failed to read {}", image_path.display()))?;
            let lines = dataset::convert_annotations(&annotations, width, height)?;
            match output {
                Some(path) => {
                    let mut text = lines.join("\n");
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    std::fs::write(&path, text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} labels to {}", lines.len(), path.display());
                }
                None => {
                    for line in lines {
                        println!("{line}");
                    }
                }
            }
        }
        DatasetCommand::Yaml { root } => {
            let (yaml, path) = DatasetLayout::new(root).write_data_yaml()?;
            println!("Dataset configuration written to {}", path.display());
            println!("  - Classes: {}", yaml.names.join(", "));
            println!("  - Number of classes: {}", yaml.nc);
        }
    }
    Ok(())
}
