use image::Rgba;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Microplastic categories the hosted model was trained on.
///
/// The declaration order is the numeric class id used in YOLO label files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlasticClass {
    Film,
    Fragment,
    Pallet,
    Pellet,
    Fiber,
    Foam,
}

impl PlasticClass {
    pub const ALL: [PlasticClass; 6] = [
        PlasticClass::Film,
        PlasticClass::Fragment,
        PlasticClass::Pallet,
        PlasticClass::Pellet,
        PlasticClass::Fiber,
        PlasticClass::Foam,
    ];

    pub fn id(self) -> usize {
        self as usize
    }

    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            PlasticClass::Film => "film",
            PlasticClass::Fragment => "fragment",
            PlasticClass::Pallet => "pallet",
            PlasticClass::Pellet => "pellet",
            PlasticClass::Fiber => "fiber",
            PlasticClass::Foam => "foam",
        }
    }

    /// Display color used for box outlines and label backgrounds
    pub fn color(self) -> Color {
        match self {
            PlasticClass::Film => Color::rgb(0xFF, 0x6B, 0x9D),
            PlasticClass::Fragment => Color::rgb(0x4E, 0xCD, 0xC4),
            PlasticClass::Pallet => Color::rgb(0x95, 0xE1, 0xD3),
            PlasticClass::Pellet => Color::rgb(0xF3, 0x81, 0x81),
            PlasticClass::Fiber => Color::rgb(0xAA, 0x96, 0xDA),
            PlasticClass::Foam => Color::rgb(0xFC, 0xBA, 0xD3),
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.name()).collect()
    }
}

impl fmt::Display for PlasticClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown class `{0}`")]
pub struct UnknownClass(pub String);

impl FromStr for PlasticClass {
    type Err = UnknownClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| UnknownClass(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Error)]
#[error("invalid color `{0}`, expected #RRGGBB")]
pub struct ColorParseError(pub String);

impl Color {
    pub const WHITE: Color = Color::rgb(0xFF, 0xFF, 0xFF);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional)
    pub fn from_hex(value: &str) -> Result<Self, ColorParseError> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError(value.to_string()));
        }
        let packed =
            u32::from_str_radix(digits, 16).map_err(|_| ColorParseError(value.to_string()))?;
        Ok(Color::from(packed))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, 255])
    }
}

impl From<u32> for Color {
    fn from(value: u32) -> Self {
        let r = ((value >> 16) & 0xFF) as u8;
        let g = ((value >> 8) & 0xFF) as u8;
        let b = (value & 0xFF) as u8;
        Color { r, g, b }
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Color used for any class name without an entry in the map
pub const FALLBACK_COLOR: Color = Color::rgb(0xFF, 0x6B, 0x9D);

#[derive(Debug, Error)]
pub enum ColorMapError {
    #[error("failed to read color map {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid color map {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Class name to display color lookup with a fallback entry.
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    colors: HashMap<String, Color>,
    fallback: Color,
}

#[derive(Deserialize)]
struct ColorMapFile {
    #[serde(default)]
    colors: HashMap<String, Color>,
    fallback: Option<Color>,
}

impl ColorMap {
    /// An empty map: every class resolves to `fallback`
    pub fn empty(fallback: Color) -> Self {
        Self {
            colors: HashMap::new(),
            fallback,
        }
    }

    pub fn with_color(mut self, class_name: impl Into<String>, color: Color) -> Self {
        self.colors.insert(class_name.into(), color);
        self
    }

    pub fn with_fallback(mut self, fallback: Color) -> Self {
        self.fallback = fallback;
        self
    }

    /// Resolve a class name, falling back for unknown names
    pub fn get(&self, class_name: &str) -> Color {
        self.colors.get(class_name).copied().unwrap_or(self.fallback)
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.colors.contains_key(class_name)
    }

    pub fn fallback(&self) -> Color {
        self.fallback
    }

    /// Load overrides from a JSON file on top of the default catalogue colors.
    ///
    /// File shape: `{"colors": {"film": "#RRGGBB"}, "fallback": "#RRGGBB"}`,
    /// both keys optional.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ColorMapError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ColorMapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ColorMapFile =
            serde_json::from_str(&text).map_err(|source| ColorMapError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut map = ColorMap::default();
        map.colors.extend(file.colors);
        if let Some(fallback) = file.fallback {
            map.fallback = fallback;
        }
        Ok(map)
    }

    /// Process-wide default map, built on first use
    pub fn shared_default() -> &'static ColorMap {
        static DEFAULT: OnceLock<ColorMap> = OnceLock::new();
        DEFAULT.get_or_init(ColorMap::default)
    }
}

impl Default for ColorMap {
    fn default() -> Self {
        PlasticClass::ALL
            .iter()
            .fold(ColorMap::empty(FALLBACK_COLOR), |map, class| {
                map.with_color(class.name(), class.color())
            })
    }
}
