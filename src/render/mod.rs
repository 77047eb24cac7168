pub mod font;

pub use font::{FontError, LabelFont};

use crate::classes::{Color, ColorMap};
use crate::error::{AnnotateError, AnnotateResult};
use crate::models::{Detection, PredictionSet};
use image::{ColorType, DynamicImage, ImageBuffer, ImageFormat, ImageReader, Pixel, Rgba};
use imageproc::definitions::Clamp;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;

/// Presentation constants for boxes and labels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationStyle {
    /// Outline thickness in pixels, grown inward from the box edges
    pub stroke_width: u32,
    /// Distance of the label above the top edge of the box
    pub label_offset: i32,
    /// Label background margin around the text, horizontal and vertical
    pub label_padding: (u32, u32),
    /// Label text height in pixels
    pub label_px: f32,
    pub text_color: Color,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            stroke_width: 4,
            label_offset: 25,
            label_padding: (4, 2),
            label_px: 16.0,
            text_color: Color::WHITE,
        }
    }
}

/// Pixel types the annotator draws on: 8-bit, 16-bit and float RGBA
pub trait CanvasPixel: Pixel<Subpixel: Into<f32> + Clamp<f32>> {
    fn from_color(color: Color) -> Self;
}

impl CanvasPixel for Rgba<u8> {
    fn from_color(color: Color) -> Self {
        color.to_rgba()
    }
}

impl CanvasPixel for Rgba<u16> {
    fn from_color(color: Color) -> Self {
        Rgba(color.to_rgba().0.map(|c| u16::from(c) * 257))
    }
}

impl CanvasPixel for Rgba<f32> {
    fn from_color(color: Color) -> Self {
        Rgba(color.to_rgba().0.map(|c| f32::from(c) / 255.0))
    }
}

pub type Canvas<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Draws labeled detection boxes onto images.
///
/// Holds only read-only state, so one annotator can serve concurrent calls
/// as long as each call writes to its own output path.
#[derive(Debug)]
pub struct Annotator {
    colors: ColorMap,
    font: LabelFont,
    style: AnnotationStyle,
}

impl Annotator {
    pub fn new(colors: ColorMap, font: LabelFont) -> Self {
        Self {
            colors,
            font,
            style: AnnotationStyle::default(),
        }
    }

    pub fn with_stroke_width(mut self, stroke_width: u32) -> Self {
        self.style.stroke_width = stroke_width;
        self
    }

    pub fn with_label_offset(mut self, label_offset: i32) -> Self {
        self.style.label_offset = label_offset;
        self
    }

    pub fn with_label_px(mut self, label_px: f32) -> Self {
        self.style.label_px = label_px;
        self
    }

    /// Annotate an in-memory image. The result has the source's dimensions
    /// and color type; without detections it is the source unchanged.
    pub fn annotate(&self, image: &DynamicImage, detections: &[Detection]) -> DynamicImage {
        if detections.is_empty() {
            return image.clone();
        }

        let drawn = match image.color() {
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                DynamicImage::ImageRgba16(self.draw_all(image.to_rgba16(), detections))
            }
            ColorType::Rgb32F | ColorType::Rgba32F => {
                DynamicImage::ImageRgba32F(self.draw_all(image.to_rgba32f(), detections))
            }
            _ => DynamicImage::ImageRgba8(self.draw_all(image.to_rgba8(), detections)),
        };
        restore_color_type(drawn, image.color())
    }

    fn draw_all<P: CanvasPixel>(&self, mut canvas: Canvas<P>, detections: &[Detection]) -> Canvas<P> {
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        canvas
    }

    /// Draw one detection: outline first, then its label on top.
    ///
    /// Coordinates far outside the canvas are fine; everything is clipped.
    pub fn draw_detection<P: CanvasPixel>(&self, canvas: &mut Canvas<P>, detection: &Detection) {
        let color = P::from_color(self.colors.get(&detection.class_name));
        let (left, top, right, bottom) = detection.rect().to_pixels();
        let (left, top, right, bottom) = (left as i64, top as i64, right as i64, bottom as i64);

        if left <= right && top <= bottom {
            let inner = self.style.stroke_width as i64 - 1;
            let bands = [
                (left, top, right, (top + inner).min(bottom)),
                (left, (bottom - inner).max(top), right, bottom),
                (left, top, (left + inner).min(right), bottom),
                ((right - inner).max(left), top, right, bottom),
            ];
            for band in bands {
                fill_clipped(canvas, band, color);
            }
        }

        let label = detection.label();
        let px = self.style.label_px;
        let text_x = left.max(0);
        let text_y = (top - self.style.label_offset as i64).max(0);
        let (pad_x, pad_y) = (
            self.style.label_padding.0 as i64,
            self.style.label_padding.1 as i64,
        );

        let ink = self
            .font
            .text_bounds(&label, px)
            .unwrap_or_else(|| Rect::at(0, 0).of_size(1, 1));
        let background = (
            text_x + ink.left() as i64 - pad_x,
            text_y + ink.top() as i64 - pad_y,
            text_x + ink.right() as i64 + pad_x,
            text_y + ink.bottom() as i64 + pad_y,
        );
        fill_clipped(canvas, background, color);

        let (width, height) = canvas.dimensions();
        if text_x < width as i64 && text_y < height as i64 {
            let text_color = P::from_color(self.style.text_color);
            self.font
                .draw(canvas, text_color, text_x as i32, text_y as i32, px, &label);
        }
    }

    /// Open `input`, draw `detections`, and write the result to `output`.
    ///
    /// Drawing and encoding happen in memory; `output` is only touched once
    /// everything before it succeeded. The source file is never modified.
    pub fn render_file(
        &self,
        input: impl AsRef<Path>,
        detections: &[Detection],
        output: impl AsRef<Path>,
    ) -> AnnotateResult<()> {
        let input = input.as_ref();
        let output = output.as_ref();

        let image = open_image(input)?;
        log::debug!(
            "Annotating {} ({}x{}) with {} detections",
            input.display(),
            image.width(),
            image.height(),
            detections.len()
        );

        let annotated = self.annotate(&image, detections);
        save_image(&annotated, output)?;

        log::info!("Annotated image saved to {}", output.display());
        Ok(())
    }

    /// Validate a raw API response, then render it.
    ///
    /// Any malformed record fails the whole call before `output` is touched.
    pub fn render_response(
        &self,
        input: impl AsRef<Path>,
        response: &serde_json::Value,
        output: impl AsRef<Path>,
    ) -> AnnotateResult<PredictionSet> {
        let predictions = PredictionSet::from_value(response)?;
        self.render_file(input, &predictions.predictions, output)?;
        Ok(predictions)
    }
}

pub fn open_image(path: &Path) -> AnnotateResult<DynamicImage> {
    let unavailable = |source: image::ImageError| AnnotateError::ResourceUnavailable {
        path: path.to_path_buf(),
        source,
    };

    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| unavailable(image::ImageError::IoError(e)))?
        .decode()
        .map_err(unavailable)
}

/// Encode `image` in the format implied by `path`'s extension, then write it
pub fn save_image(image: &DynamicImage, path: &Path) -> AnnotateResult<()> {
    let io_failure = |source: std::io::Error| AnnotateError::Io {
        path: path.to_path_buf(),
        source,
    };

    let format = ImageFormat::from_path(path).map_err(|e| io_failure(std::io::Error::other(e)))?;
    let encodable = fit_for_format(image, format);

    let mut buffer = Cursor::new(Vec::new());
    encodable
        .write_to(&mut buffer, format)
        .map_err(|e| io_failure(std::io::Error::other(e)))?;
    std::fs::write(path, buffer.into_inner()).map_err(io_failure)
}

/// Formats without an alpha channel get the image flattened to RGB
fn fit_for_format(image: &DynamicImage, format: ImageFormat) -> std::borrow::Cow<'_, DynamicImage> {
    let has_alpha = image.color().has_alpha();
    match format {
        ImageFormat::Jpeg | ImageFormat::Pnm if has_alpha => {
            std::borrow::Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8()))
        }
        _ => std::borrow::Cow::Borrowed(image),
    }
}

/// Fill the inclusive span `(x0, y0, x1, y1)`, clipped to the canvas
fn fill_clipped<P: Pixel>(canvas: &mut Canvas<P>, span: (i64, i64, i64, i64), color: P) {
    let (width, height) = canvas.dimensions();
    let (x0, y0) = (span.0.max(0), span.1.max(0));
    let (x1, y1) = (span.2.min(width as i64 - 1), span.3.min(height as i64 - 1));
    if x1 < x0 || y1 < y0 {
        return;
    }
    let rect = Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    draw_filled_rect_mut(canvas, rect, color);
}

fn restore_color_type(drawn: DynamicImage, color: ColorType) -> DynamicImage {
    if drawn.color() == color {
        return drawn;
    }
    match color {
        ColorType::L8 => DynamicImage::ImageLuma8(drawn.to_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(drawn.to_luma_alpha8()),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(drawn.to_rgb8()),
        ColorType::Rgba8 => DynamicImage::ImageRgba8(drawn.to_rgba8()),
        ColorType::L16 => DynamicImage::ImageLuma16(drawn.to_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(drawn.to_luma_alpha16()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(drawn.to_rgb16()),
        ColorType::Rgba16 => DynamicImage::ImageRgba16(drawn.to_rgba16()),
        ColorType::Rgb32F => DynamicImage::ImageRgb32F(drawn.to_rgb32f()),
        ColorType::Rgba32F => DynamicImage::ImageRgba32F(drawn.to_rgba32f()),
        _ => drawn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::{FALLBACK_COLOR, PlasticClass};
    use image::{Rgb, RgbImage, RgbaImage};

    const BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);

    fn annotator() -> Annotator {
        Annotator::new(ColorMap::default(), LabelFont::builtin())
    }

    fn gray_canvas() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, BACKGROUND))
    }

    fn rgb(color: Color) -> Rgb<u8> {
        Rgb([color.r, color.g, color.b])
    }

    fn label_ink(annotator: &Annotator, detection: &Detection) -> Rect {
        annotator
            .font
            .text_bounds(&detection.label(), annotator.style.label_px)
            .unwrap()
    }

    #[test]
    fn test_empty_detections_is_identity() {
        let img = gray_canvas();
        let out = annotator().annotate(&img, &[]);
        assert_eq!(out, img);
    }

    #[test]
    fn test_outline_drawn_on_corners() {
        let det = Detection::new("fiber", 100.0, 100.0, 40.0, 20.0, 0.87);
        let out = annotator().annotate(&gray_canvas(), &[det]).to_rgb8();
        let fiber = rgb(PlasticClass::Fiber.color());

        assert_eq!(*out.get_pixel(80, 100), fiber);
        assert_eq!(*out.get_pixel(120, 100), fiber);
        assert_eq!(*out.get_pixel(100, 110), fiber);
        // Stroke is 4px wide, growing inward
        assert_eq!(*out.get_pixel(83, 100), fiber);
        assert_eq!(*out.get_pixel(84, 100), BACKGROUND);
        assert_eq!(*out.get_pixel(79, 100), BACKGROUND);
        assert_eq!(*out.get_pixel(100, 100), BACKGROUND);
    }

    #[test]
    fn test_label_background_and_text() {
        let annotator = annotator();
        let det = Detection::new("fiber", 100.0, 100.0, 40.0, 20.0, 0.87);
        let out = annotator.annotate(&gray_canvas(), &[det.clone()]).to_rgb8();
        let fiber = rgb(PlasticClass::Fiber.color());

        // Text origin is (80, 65); the background pads the ink by 4px and 2px
        let ink = label_ink(&annotator, &det);
        let bg_left = (80 + ink.left() - 4) as u32;
        let bg_top = (65 + ink.top() - 2) as u32;
        let bg_bottom = (65 + ink.bottom() + 2) as u32;
        assert_eq!(*out.get_pixel(bg_left, bg_top), fiber);
        assert_eq!(*out.get_pixel(bg_left - 1, bg_top), BACKGROUND);
        assert_eq!(*out.get_pixel(bg_left, bg_top - 1), BACKGROUND);
        assert_eq!(*out.get_pixel(bg_left, bg_bottom), fiber);
        assert!(bg_bottom < 90, "label must sit above the box");

        let text = (80..200).any(|x| {
            (65..90).any(|y| {
                let p = out.get_pixel(x, y);
                p[0] > 230 && p[1] > 230
            })
        });
        assert!(text, "label text should be drawn in white");
    }

    #[test]
    fn test_unknown_class_uses_fallback() {
        let det = Detection::new("bottle cap", 100.0, 100.0, 40.0, 20.0, 0.5);
        let out = annotator().annotate(&gray_canvas(), &[det.clone()]).to_rgb8();
        assert_eq!(*out.get_pixel(80, 100), rgb(FALLBACK_COLOR));

        let custom = Annotator::new(
            ColorMap::default().with_fallback(Color::rgb(0, 255, 0)),
            LabelFont::builtin(),
        );
        let out = custom.annotate(&gray_canvas(), &[det]).to_rgb8();
        assert_eq!(*out.get_pixel(80, 100), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_later_detection_wins_overlap() {
        let first = Detection::new("fiber", 100.0, 100.0, 40.0, 20.0, 0.9);
        let second = Detection::new("fragment", 120.0, 100.0, 40.0, 20.0, 0.8);
        let out = annotator().annotate(&gray_canvas(), &[first, second]).to_rgb8();

        // Both top edges cover (110, 91); the second one is drawn last
        assert_eq!(*out.get_pixel(110, 91), rgb(PlasticClass::Fragment.color()));
        assert_eq!(*out.get_pixel(90, 91), rgb(PlasticClass::Fiber.color()));
    }

    #[test]
    fn test_label_clamped_at_top_edge() {
        let annotator = annotator();
        let det = Detection::new("foam", 20.0, 5.0, 30.0, 6.0, 0.4);
        let out = annotator.annotate(&gray_canvas(), &[det.clone()]).to_rgb8();

        // Box top is y=2; the label would start at y=-23 without clamping
        let bg_top = (label_ink(&annotator, &det).top() - 2).max(0) as u32;
        assert!(bg_top < 2);
        assert_eq!(*out.get_pixel(20, bg_top), rgb(PlasticClass::Foam.color()));
    }

    #[test]
    fn test_label_offset_and_size() {
        let det = Detection::new("film", 100.0, 150.0, 40.0, 20.0, 0.5);
        let film = rgb(PlasticClass::Film.color());

        let lowered = annotator().with_label_offset(-30);
        let ink = label_ink(&lowered, &det);
        let out = lowered.annotate(&gray_canvas(), &[det.clone()]).to_rgb8();
        // Label now starts below the top edge at y=170
        let bg_top = (170 + ink.top() - 2) as u32;
        assert_eq!(*out.get_pixel(78, bg_top), film);
        assert_eq!(*out.get_pixel(100, 120), BACKGROUND);

        let small = label_ink(&annotator(), &det);
        let large = label_ink(&annotator().with_label_px(32.0), &det);
        assert!(large.width() > small.width());
        assert!(large.height() > small.height());
    }

    #[test]
    fn test_degenerate_boxes_do_not_panic() {
        let dets = [
            Detection::new("film", 50.0, 50.0, 0.0, 0.0, 0.1),
            Detection::new("film", 50.0, 50.0, -10.0, 5.0, 0.1),
            Detection::new("film", -500.0, 900.0, 10.0, 10.0, 0.1),
            Detection::new("film", 199.0, 199.0, 400.0, 400.0, 0.1),
        ];
        let out = annotator().annotate(&gray_canvas(), &dets);
        assert_eq!((out.width(), out.height()), (200, 200));
    }

    #[test]
    fn test_huge_coordinates_are_clipped() {
        let wide = Detection::new("fiber", 0.0, 0.0, 1e10, 20.0, 0.5);
        let far_up = Detection::new("film", 10.0, -3e9, 10.0, 10.0, 0.5);
        let far_down = Detection::new("foam", 3e9, 3e9, 1e9, 1e9, 0.5);

        let out = annotator()
            .annotate(&gray_canvas(), &[far_up, far_down, wide])
            .to_rgb8();
        // The wide box's bottom edge (y=10) spans the canvas right of its label
        let fiber = rgb(PlasticClass::Fiber.color());
        assert_eq!(*out.get_pixel(150, 10), fiber);
        assert_eq!(*out.get_pixel(199, 10), fiber);
        assert_eq!(*out.get_pixel(100, 100), BACKGROUND);

        let huge_stroke = annotator().with_stroke_width(u32::MAX);
        let det = Detection::new("pellet", 100.0, 100.0, 40.0, 20.0, 0.5);
        let out = huge_stroke.annotate(&gray_canvas(), &[det]).to_rgb8();
        assert_eq!(*out.get_pixel(100, 100), rgb(PlasticClass::Pellet.color()));
    }

    #[test]
    fn test_color_type_preserved() {
        let luma = DynamicImage::ImageLuma8(image::GrayImage::new(64, 64));
        let det = Detection::new("pellet", 32.0, 32.0, 20.0, 20.0, 0.7);
        let out = annotator().annotate(&luma, &[det.clone()]);
        assert_eq!(out.color(), ColorType::L8);

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 0])));
        let out = annotator().annotate(&rgba, &[det]);
        assert_eq!(out.color(), ColorType::Rgba8);
        assert_eq!(out.to_rgba8().get_pixel(22, 32)[3], 255);
    }

    #[test]
    fn test_high_depth_pixels_keep_precision() {
        let det = Detection::new("pellet", 100.0, 100.0, 40.0, 20.0, 0.7);
        let pellet = PlasticClass::Pellet.color();

        let rgb16 = image::ImageBuffer::from_pixel(200, 200, Rgb([1000u16, 20_001, 65_000]));
        let out = annotator().annotate(&DynamicImage::ImageRgb16(rgb16), &[det.clone()]);
        assert_eq!(out.color(), ColorType::Rgb16);
        let out = out.to_rgb16();
        assert_eq!(*out.get_pixel(10, 190), Rgb([1000, 20_001, 65_000]));
        assert_eq!(
            *out.get_pixel(80, 100),
            Rgb([pellet.r as u16 * 257, pellet.g as u16 * 257, pellet.b as u16 * 257])
        );

        let luma16 = image::ImageBuffer::from_pixel(200, 200, image::Luma([12_345u16]));
        let out = annotator().annotate(&DynamicImage::ImageLuma16(luma16), &[det.clone()]);
        assert_eq!(out.color(), ColorType::L16);
        assert_eq!(out.to_luma16().get_pixel(10, 190)[0], 12_345);

        let float = image::ImageBuffer::from_pixel(200, 200, Rgb([0.123_456f32, 0.5, 0.9]));
        let out = annotator().annotate(&DynamicImage::ImageRgb32F(float), &[det]);
        assert_eq!(out.color(), ColorType::Rgb32F);
        assert_eq!(*out.to_rgb32f().get_pixel(10, 190), Rgb([0.123_456, 0.5, 0.9]));
    }

    #[test]
    fn test_thin_stroke_style() {
        let det = Detection::new("fiber", 100.0, 100.0, 40.0, 20.0, 0.87);
        let out = annotator()
            .with_stroke_width(1)
            .annotate(&gray_canvas(), &[det])
            .to_rgb8();
        assert_eq!(*out.get_pixel(80, 100), rgb(PlasticClass::Fiber.color()));
        assert_eq!(*out.get_pixel(81, 100), BACKGROUND);
    }
}
