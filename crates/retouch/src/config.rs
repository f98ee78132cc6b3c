use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{Result, RetouchError};

/// Darkest perimeter sum that can still be whitened
pub const MAX_PIXEL_SUM: u32 = 765;

/// Upper bound for padding and collage spacing percentages
pub const MAX_PERCENT: f64 = 100.0;

/// Every option of a processing run. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Downscale limit applied right after decoding
    pub pre_resize: SizeLimit,
    /// Darkest-perimeter whitening, disabled when absent
    pub whitening: Option<WhiteningConfig>,
    /// Near-white background removal tolerance (0-255), disabled when absent
    pub background_tolerance: Option<u8>,
    /// Crop to content, disabled when absent
    pub crop: Option<CropMode>,
    /// Width of the ring that must be white before padding is allowed
    pub perimeter_margin: Option<u32>,
    /// Transparent border as a percentage of the larger side
    pub padding_percent: Option<f64>,
    /// Let padding grow an image past its size before cropping
    pub allow_expansion: bool,
    pub aspect_ratio: Option<AspectRatio>,
    pub max_size: SizeLimit,
    pub exact_canvas: Option<CanvasSize>,
    pub collage: CollageConfig,
    pub output: OutputConfig,
    /// Catalog article used to rename outputs, no renaming when absent
    pub article: Option<String>,
    pub delete_originals: bool,
    pub backup_dir: Option<PathBuf>,
    pub decoder: DecoderOptions,
    /// Process files concurrently. Renaming always runs afterwards, in order.
    pub parallel: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            pre_resize: SizeLimit::default(),
            whitening: Some(WhiteningConfig::default()),
            background_tolerance: Some(10),
            crop: Some(CropMode::Standard),
            perimeter_margin: None,
            padding_percent: Some(2.0),
            allow_expansion: false,
            aspect_ratio: None,
            max_size: SizeLimit::default(),
            exact_canvas: None,
            collage: CollageConfig::default(),
            output: OutputConfig::default(),
            article: None,
            delete_originals: false,
            backup_dir: None,
            decoder: DecoderOptions::default(),
            parallel: false,
        }
    }
}

impl ProcessingConfig {
    /// Check value ranges that the type system does not cover
    pub fn validate(&self) -> Result<()> {
        if let Some(whitening) = &self.whitening {
            if whitening.cancel_threshold_sum > MAX_PIXEL_SUM {
                return Err(RetouchError::InvalidConfig(format!(
                    "whitening.cancel_threshold_sum must be within 0-{MAX_PIXEL_SUM}, got {}",
                    whitening.cancel_threshold_sum
                )));
            }
        }
        if let Some(percent) = self.padding_percent {
            if !(0.0..=MAX_PERCENT).contains(&percent) {
                return Err(RetouchError::InvalidConfig(format!(
                    "padding_percent must be within 0-{MAX_PERCENT}, got {percent}"
                )));
            }
        }
        if !(0.0..=MAX_PERCENT).contains(&self.collage.spacing_percent) {
            return Err(RetouchError::InvalidConfig(format!(
                "collage.spacing_percent must be within 0-{MAX_PERCENT}, got {}",
                self.collage.spacing_percent
            )));
        }
        if self.collage.columns == Some(0) {
            return Err(RetouchError::InvalidConfig(
                "collage.columns must be positive; omit it for automatic columns".into(),
            ));
        }
        if let Some(ratio) = &self.aspect_ratio {
            if !(ratio.width > 0.0 && ratio.height > 0.0) {
                return Err(RetouchError::InvalidConfig(format!(
                    "aspect_ratio sides must be positive, got {}:{}",
                    ratio.width, ratio.height
                )));
            }
        }
        if let Some(canvas) = &self.exact_canvas {
            if canvas.width == 0 || canvas.height == 0 {
                return Err(RetouchError::InvalidConfig(format!(
                    "exact_canvas must be at least 1x1, got {}x{}",
                    canvas.width, canvas.height
                )));
            }
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(RetouchError::InvalidConfig(format!(
                "output.quality must be within 1-100, got {}",
                self.output.quality
            )));
        }
        if let Some(article) = &self.article {
            if article.trim().is_empty() {
                return Err(RetouchError::InvalidConfig("article must not be empty".into()));
            }
            if article.contains(['/', '\\']) {
                return Err(RetouchError::InvalidConfig(format!(
                    "article must be a plain file name, got '{article}'"
                )));
            }
        }
        Ok(())
    }

    /// Tolerance used by the perimeter check: the background tolerance, or
    /// pure white when background removal is off
    pub fn perimeter_tolerance(&self) -> u8 {
        self.background_tolerance.unwrap_or(0)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ProcessingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let config: ProcessingConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(RetouchError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// JSON schema of the configuration file
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ProcessingConfig)
    }
}

/// Optional maximum width and height. An absent side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SizeLimit {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl SizeLimit {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self { width, height }
    }

    pub fn is_active(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }

    /// Uniform factor (< 1.0) that brings `width` x `height` within the
    /// limit, or `None` when it already fits
    pub fn downscale_factor(&self, width: u32, height: u32) -> Option<f64> {
        if width == 0 || height == 0 {
            return None;
        }
        let mut scale = 1.0_f64;
        if let Some(max_w) = self.width.filter(|&w| w > 0 && width > w) {
            scale = scale.min(max_w as f64 / width as f64);
        }
        if let Some(max_h) = self.height.filter(|&h| h > 0 && height > h) {
            scale = scale.min(max_h as f64 / height as f64);
        }
        (scale < 1.0).then_some(scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WhiteningConfig {
    /// Perimeter pixels darker than this R+G+B sum cancel whitening (0-765)
    #[schemars(range(min = 0, max = 765))]
    pub cancel_threshold_sum: u32,
}

impl Default for WhiteningConfig {
    fn default() -> Self {
        Self { cancel_threshold_sum: 500 }
    }
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CropMode {
    /// Crop exactly to the content
    #[default]
    Standard,
    /// Keep the content centred along each axis
    SymmetricAxes,
    /// Equal borders on all four sides, measured from the image edges
    SymmetricAbsolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AspectRatio {
    pub width: f64,
    pub height: f64,
}

impl AspectRatio {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn value(&self) -> f64 {
        self.width / self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CollageConfig {
    /// Grid columns; `ceil(sqrt(n))` when absent
    pub columns: Option<u32>,
    /// Gap between cells as a percentage of the cell size
    pub spacing_percent: f64,
    /// Per-image size factors relative to the first image
    pub placement_ratios: Option<Vec<f64>>,
}

impl Default for CollageConfig {
    fn default() -> Self {
        Self {
            columns: None,
            spacing_percent: 2.0,
            placement_ratios: None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "jpeg")]
    #[strum(to_string = "jpg", serialize = "jpeg")]
    Jpg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        self.into()
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::Png)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Colour behind transparent areas in formats without alpha
    pub background: [u8; 3],
    /// JPEG quality (1-100)
    #[schemars(range(min = 1, max = 100))]
    pub quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpg,
            background: [255, 255, 255],
            quality: 95,
        }
    }
}

/// Options handed to every decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DecoderOptions {
    /// Retry truncated JPEGs with a synthetic end-of-image marker
    pub allow_truncated: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self { allow_truncated: true }
    }
}
