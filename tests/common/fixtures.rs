use image::{ImageBuffer, Rgb};
use plastiscan::{Annotator, ColorMap, Detection, LabelFont};
use serde_json::{Value, json};
use tempfile::NamedTempFile;

/// Background of every generated test image
pub const TEST_BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);

/// Creates a solid test image of the given size and returns the temp file.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image(width: u32, height: u32) -> NamedTempFile {
    let img = ImageBuffer::from_fn(width, height, |_, _| TEST_BACKGROUND);
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Creates a horizontal gradient, so pixel identity checks are meaningful
pub fn create_gradient_image(width: u32, height: u32) -> NamedTempFile {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128u8])
    });
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Annotator with the built-in font, so pixels are the same on every machine
pub fn test_annotator() -> Annotator {
    Annotator::new(ColorMap::default(), LabelFont::builtin())
}

/// The worked example: a fiber box with corners (80, 90) and (120, 110)
pub fn fiber_example() -> Detection {
    Detection::new("fiber", 100.0, 100.0, 40.0, 20.0, 0.87)
}

/// One raw prediction record as the hosted API returns it
pub fn prediction_record(class: &str, x: f64, y: f64, width: f64, height: f64, confidence: f64) -> Value {
    json!({
        "x": x,
        "y": y,
        "width": width,
        "height": height,
        "confidence": confidence,
        "class": class,
    })
}

pub fn color_rgb(color: plastiscan::Color) -> Rgb<u8> {
    Rgb([color.r, color.g, color.b])
}
