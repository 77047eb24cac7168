use ab_glyph::{Font, FontRef, FontVec, PxScale, ScaleFont, point};
use image::Pixel;
use imageproc::definitions::Clamp;
use imageproc::drawing::{Canvas, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

static BUILTIN_FONT: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");

/// Fonts tried after the caller's preferred font, in order
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/Helvetica.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Error)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a usable font")]
    Invalid { path: PathBuf },
}

/// Font used for box labels.
///
/// Either a face loaded from disk, or DejaVu Sans compiled into the binary,
/// which is always available and renders identically everywhere.
pub enum LabelFont {
    TrueType(FontVec),
    Builtin(FontRef<'static>),
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelFont::TrueType(_) => f.write_str("LabelFont::TrueType"),
            LabelFont::Builtin(_) => f.write_str("LabelFont::Builtin"),
        }
    }
}

impl LabelFont {
    pub fn builtin() -> Self {
        let font = FontRef::try_from_slice(BUILTIN_FONT).expect("Built-in label font failed to parse");
        LabelFont::Builtin(font)
    }

    /// Load a font file. Collections (`.ttc`) use their first face.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FontError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| FontError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        FontVec::try_from_vec_and_index(data, 0)
            .map(LabelFont::TrueType)
            .map_err(|_| FontError::Invalid {
                path: path.to_path_buf(),
            })
    }

    /// Try `preferred`, then the well-known system fonts, then fall back to
    /// the built-in font. Never fails.
    pub fn load(preferred: Option<&Path>) -> Self {
        let candidates = preferred
            .into_iter()
            .map(Path::to_path_buf)
            .chain(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from));

        for path in candidates {
            match Self::from_file(&path) {
                Ok(font) => {
                    log::debug!("Using label font {}", path.display());
                    return font;
                }
                Err(e) => log::debug!("Skipping label font: {}", e),
            }
        }

        log::debug!("Using built-in label font");
        Self::builtin()
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, LabelFont::Builtin(_))
    }

    /// Pixels `text` covers when drawn at the origin with a height of `px`.
    ///
    /// `None` when nothing would be inked, e.g. for blank text.
    pub fn text_bounds(&self, text: &str, px: f32) -> Option<Rect> {
        match self {
            LabelFont::TrueType(font) => ink_bounds(font, px, text),
            LabelFont::Builtin(font) => ink_bounds(font, px, text),
        }
    }

    /// Draw `text` at (`x`, `y`), clipped to the canvas
    pub fn draw<C>(&self, canvas: &mut C, color: C::Pixel, x: i32, y: i32, px: f32, text: &str)
    where
        C: Canvas,
        <C::Pixel as Pixel>::Subpixel: Into<f32> + Clamp<f32>,
    {
        let scale = PxScale::from(px);
        match self {
            LabelFont::TrueType(font) => draw_text_mut(canvas, color, x, y, scale, font, text),
            LabelFont::Builtin(font) => draw_text_mut(canvas, color, x, y, scale, font, text),
        }
    }
}

/// Same glyph layout as `draw_text_mut`, collecting the union of glyph boxes
fn ink_bounds(font: &impl Font, px: f32, text: &str) -> Option<Rect> {
    let scale = PxScale::from(px);
    let scaled = font.as_scaled(scale);
    let mut caret = 0.0f32;
    let mut last = None;
    let mut bounds: Option<(i32, i32, i32, i32)> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        let glyph = id.with_scale_and_position(scale, point(caret, scaled.ascent()));
        caret += scaled.h_advance(id);
        let Some(outlined) = scaled.outline_glyph(glyph) else {
            continue;
        };
        if let Some(prev) = last {
            caret += scaled.kern(id, prev);
        }
        last = Some(id);

        let bb = outlined.px_bounds();
        let (left, top) = (bb.min.x.round() as i32, bb.min.y.round() as i32);
        let (right, bottom) = (left + bb.width() as i32 - 1, top + bb.height() as i32 - 1);
        bounds = Some(match bounds {
            None => (left, top, right, bottom),
            Some((l, t, r, b)) => (l.min(left), t.min(top), r.max(right), b.max(bottom)),
        });
    }

    bounds
        .filter(|&(l, t, r, b)| r >= l && b >= t)
        .map(|(l, t, r, b)| Rect::at(l, t).of_size((r - l + 1) as u32, (b - t + 1) as u32))
}
