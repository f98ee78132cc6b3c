use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use retouch::config::{AspectRatio, CanvasSize, CropMode, OutputFormat, SizeLimit, WhiteningConfig};
use retouch::{ProcessingConfig, RetouchError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Retouch(#[from] RetouchError),
    #[error("Mode '{0}' needs an 'output' path")]
    MissingOutput(JobMode),
    #[error("Mode 'rename' needs 'processing.article'")]
    MissingArticle,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Which flow a job runs
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobMode {
    /// One output image per input image
    #[default]
    Process,
    /// All inputs composed into a single collage
    Merge,
    /// Rename existing images to the article without processing
    Rename,
}

impl JobMode {
    pub fn mode_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }
}

/// A complete job file: flow, paths and processing options
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Job {
    #[serde(default)]
    pub mode: JobMode,
    pub input_dir: PathBuf,
    /// Output directory (`process`) or collage file (`merge`)
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl Job {
    /// Check that the paths the mode needs are present
    pub fn validate(&self) -> Result<(), CliError> {
        match self.mode {
            JobMode::Process | JobMode::Merge if self.output.is_none() => {
                return Err(CliError::MissingOutput(self.mode));
            }
            JobMode::Rename if self.processing.article.is_none() => {
                return Err(CliError::MissingArticle);
            }
            _ => {}
        }
        self.processing.validate()?;
        Ok(())
    }

    /// Whether the job renames or deletes files the user already has
    pub fn is_destructive(&self) -> bool {
        self.processing.article.is_some() || self.processing.delete_originals
    }

    /// Get the JSON schema of the job file
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Job)
    }

    /// Load a job from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a job from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let job: Job = toml::from_str(content)?;
        job.validate()?;
        Ok(job)
    }

    /// Load a job from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load a job from a JSON string
    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let job: Job = serde_json::from_str(content)?;
        job.validate()?;
        Ok(job)
    }

    /// Auto-detect file format and load the job
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(CliError::UnsupportedFileFormat),
        }
    }

    /// Save the job, picking TOML or JSON from the extension
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        let path_ref = path.as_ref();
        let content = match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => self.to_toml()?,
            Some("json") => self.to_json()?,
            _ => return Err(CliError::UnsupportedFileFormat),
        };
        fs::write(path_ref, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }
}

/// Parse `W:H` (or `WxH`) into an aspect ratio
pub fn parse_aspect(value: &str) -> Result<AspectRatio, String> {
    let (w, h) = value
        .split_once([':', 'x', 'X'])
        .ok_or_else(|| format!("expected W:H, got '{value}'"))?;
    let width: f64 = w.trim().parse().map_err(|_| format!("invalid width '{w}'"))?;
    let height: f64 = h.trim().parse().map_err(|_| format!("invalid height '{h}'"))?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("aspect sides must be positive, got '{value}'"));
    }
    Ok(AspectRatio::new(width, height))
}

fn non_zero(value: u32) -> Option<u32> {
    (value > 0).then_some(value)
}

/// Command-line overrides on top of a job or config file.
/// Size, margin and column options accept `0` to switch the feature off.
#[derive(Args, Debug, Clone, Default)]
pub struct ProcessingOverrides {
    /// Processing options file (.toml or .json) used as the base
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Pre-resize maximum width (0 = off)
    #[arg(long)]
    pub pre_width: Option<u32>,
    /// Pre-resize maximum height (0 = off)
    #[arg(long)]
    pub pre_height: Option<u32>,
    /// Whitening cancel threshold as an R+G+B sum (0-765, 0 = always whiten)
    #[arg(long)]
    pub whiten: Option<u32>,
    /// Turn whitening off
    #[arg(long, conflicts_with = "whiten")]
    pub no_whiten: bool,
    /// Background removal tolerance
    #[arg(long)]
    pub tolerance: Option<u8>,
    /// Turn background removal off
    #[arg(long, conflicts_with = "tolerance")]
    pub keep_background: bool,
    /// Crop mode
    #[arg(long)]
    pub crop: Option<CropMode>,
    /// Turn cropping off
    #[arg(long, conflicts_with = "crop")]
    pub no_crop: bool,
    /// Perimeter check margin in pixels (0 = off)
    #[arg(long)]
    pub perimeter: Option<u32>,
    /// Padding in percent of the larger side (0 = off)
    #[arg(long)]
    pub padding: Option<f64>,
    /// Let padding grow images past their pre-crop size
    #[arg(long)]
    pub allow_expansion: bool,
    /// Force an aspect ratio, e.g. 1:1
    #[arg(long, value_parser = parse_aspect)]
    pub aspect: Option<AspectRatio>,
    /// Maximum output width (0 = off)
    #[arg(long)]
    pub max_width: Option<u32>,
    /// Maximum output height (0 = off)
    #[arg(long)]
    pub max_height: Option<u32>,
    /// Exact canvas width; needs --canvas-height
    #[arg(long, requires = "canvas_height")]
    pub canvas_width: Option<u32>,
    /// Exact canvas height; needs --canvas-width
    #[arg(long, requires = "canvas_width")]
    pub canvas_height: Option<u32>,
    /// Output format
    #[arg(long)]
    pub format: Option<OutputFormat>,
    /// JPEG quality (1-100)
    #[arg(long)]
    pub quality: Option<u8>,
    /// Collage columns (0 = automatic)
    #[arg(long)]
    pub columns: Option<u32>,
    /// Collage spacing in percent of the cell size
    #[arg(long)]
    pub spacing: Option<f64>,
    /// Article used to rename outputs
    #[arg(long)]
    pub article: Option<String>,
    /// Delete originals after a successful save
    #[arg(long)]
    pub delete_originals: bool,
    /// Copy originals here before processing
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,
    /// Process files in parallel
    #[arg(long)]
    pub parallel: bool,
}

impl ProcessingOverrides {
    /// Base config from `--config`, or the defaults
    pub fn base_config(&self) -> Result<ProcessingConfig, CliError> {
        match &self.config {
            Some(path) => Ok(ProcessingConfig::from_file(path)?),
            None => Ok(ProcessingConfig::default()),
        }
    }

    /// Apply every flag that was given on the command line
    pub fn apply(&self, config: &mut ProcessingConfig) {
        if let Some(w) = self.pre_width {
            config.pre_resize.width = non_zero(w);
        }
        if let Some(h) = self.pre_height {
            config.pre_resize.height = non_zero(h);
        }
        if let Some(cancel_threshold_sum) = self.whiten {
            config.whitening = Some(WhiteningConfig { cancel_threshold_sum });
        }
        if self.no_whiten {
            config.whitening = None;
        }
        if let Some(tolerance) = self.tolerance {
            config.background_tolerance = Some(tolerance);
        }
        if self.keep_background {
            config.background_tolerance = None;
        }
        if let Some(crop) = self.crop {
            config.crop = Some(crop);
        }
        if self.no_crop {
            config.crop = None;
        }
        if let Some(margin) = self.perimeter {
            config.perimeter_margin = non_zero(margin);
        }
        if let Some(percent) = self.padding {
            config.padding_percent = (percent > 0.0).then_some(percent);
        }
        config.allow_expansion |= self.allow_expansion;
        if let Some(aspect) = self.aspect {
            config.aspect_ratio = Some(aspect);
        }
        if self.max_width.is_some() || self.max_height.is_some() {
            config.max_size = SizeLimit::new(
                self.max_width.map_or(config.max_size.width, non_zero),
                self.max_height.map_or(config.max_size.height, non_zero),
            );
        }
        if let (Some(width), Some(height)) = (self.canvas_width, self.canvas_height) {
            config.exact_canvas = (width > 0 && height > 0).then_some(CanvasSize { width, height });
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(quality) = self.quality {
            config.output.quality = quality;
        }
        if let Some(columns) = self.columns {
            config.collage.columns = non_zero(columns);
        }
        if let Some(spacing) = self.spacing {
            config.collage.spacing_percent = spacing;
        }
        if let Some(article) = &self.article {
            config.article = Some(article.clone());
        }
        config.delete_originals |= self.delete_originals;
        if let Some(dir) = &self.backup_dir {
            config.backup_dir = Some(dir.clone());
        }
        config.parallel |= self.parallel;
    }
}

/// Ask a yes/no question on the terminal; anything but `y`/`yes` is a no
pub fn confirm(question: &str) -> io::Result<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{question} [y/N] ")?;
    stdout.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
