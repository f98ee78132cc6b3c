//! # Retouch
//!
//! Batch post-processing for product photos: whitening against the darkest
//! edge pixel, near-white background removal, cropping to content, padding,
//! canvas fitting, grid collages and collision-free renaming to a catalog
//! article.
//!
//! ## Core Features
//!
//! - **Stage Pipeline**: every step implements [`ImageStage`] and is chained by a [`Pipeline`]
//! - **Failure Isolation**: a failing stage falls back to its input, a failing file never stops the batch
//! - **Collages**: grid layout with automatic or forced columns and proportional scaling
//! - **Two-Phase Renaming**: outputs become `{article}.jpg`, `{article}_1.jpg`, ...
//! - **Cancellation & Parallelism**: cooperative cancellation and optional `rayon` fan-out
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use retouch::{BatchRunner, ProcessingConfig};
//! use std::path::Path;
//!
//! let config = ProcessingConfig {
//!     article: Some("SKU1".into()),
//!     ..Default::default()
//! };
//! let summary = BatchRunner::new(config)?.run_single(Path::new("in"), Path::new("out"))?;
//! println!("{} images processed", summary.succeeded);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Pipeline
//!
//! ```rust,no_run
//! use retouch::{Pipeline, CancellationToken, algorithms::*, config::CropMode};
//!
//! let pipeline = Pipeline::builder()
//!     .add_stage(BackgroundRemover { tolerance: 12 })
//!     .add_stage(Cropper::new(CropMode::SymmetricAxes))
//!     .add_stage(Padder::new(3.0, true))
//!     .build();
//!
//! let image = image::open("photo.png")?.to_rgba8();
//! let output = pipeline.process(image, &CancellationToken::new())?;
//! output.image.save("photo_clean.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod config;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod collage;
pub mod io;
pub mod rename;
pub mod cancel;
pub mod batch;

// Re-exports for convenience
pub use error::{RetouchError, Result};
pub use types::{BoundingBox, CollageCell, FileState, PerimeterSample, ProcessedFileRecord};
pub use config::ProcessingConfig;
pub use traits::*;
pub use pipeline::{Pipeline, PipelineOutput, builder::PipelineBuilder};
pub use collage::{CollageLayout, GridGeometry};
pub use rename::{RenameReport, Renamer};
pub use cancel::CancellationToken;
pub use batch::{BatchRunner, BatchSummary};
