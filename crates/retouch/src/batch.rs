use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use image::RgbaImage;
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::{
    algorithms::scale_proportionally,
    cancel::CancellationToken,
    collage::CollageLayout,
    config::ProcessingConfig,
    error::{Result, RetouchError},
    io::{backup_files, base_name, decode_image, same_path, save_image, scan_images, unique_output_path},
    pipeline::{Pipeline, builder::PipelineBuilder},
    rename::{RenameReport, Renamer},
    traits::CollageComposer,
    types::{FileState, ProcessedFileRecord},
};

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    /// Files that could not be decoded
    pub skipped: usize,
    pub errored: usize,
    pub cancelled: bool,
    pub backed_up: usize,
    pub deleted: usize,
    /// Saved files, after renaming
    pub outputs: Vec<PathBuf>,
    pub rename_failures: usize,
    pub leftover_temp: Vec<PathBuf>,
}

impl BatchSummary {
    fn tally<T>(&mut self, outcome: &FileOutcome<T>) {
        match outcome {
            FileOutcome::Done(_) => self.succeeded += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Errored => self.errored += 1,
            FileOutcome::Cancelled => self.cancelled = true,
        }
    }

    fn apply_rename(&mut self, report: RenameReport) {
        self.rename_failures = report.failed;
        self.leftover_temp = report.leftover_temp;
        if !report.renamed.is_empty() {
            let renamed: HashSet<&PathBuf> = report.renamed.iter().collect();
            self.outputs.retain(|path| path.exists() && !renamed.contains(path));
            self.outputs.extend(report.renamed);
        }
    }

    pub fn log(&self) {
        info!(
            succeeded = self.succeeded,
            skipped = self.skipped,
            errored = self.errored,
            cancelled = self.cancelled,
            "📊 Batch finished"
        );
        if self.rename_failures > 0 || !self.leftover_temp.is_empty() {
            warn!(
                failures = self.rename_failures,
                leftover = self.leftover_temp.len(),
                "⚠️ Renaming needs manual attention"
            );
        }
    }
}

/// Per-file result of the transform phase
#[derive(Debug)]
enum FileOutcome<T = ProcessedFileRecord> {
    Done(T),
    Skipped,
    Errored,
    Cancelled,
}

/// One planned input -> output mapping
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileJob {
    source: PathBuf,
    output: PathBuf,
}

/// Runs the processing flows over a directory of images
pub struct BatchRunner {
    config: ProcessingConfig,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(config: ProcessingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Process every image of `input_dir` into its own file in `output_dir`,
    /// then rename the outputs when an article is configured
    pub fn run_single(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchSummary> {
        let (input_dir, output_dir) = self.prepare_dirs(input_dir, output_dir)?;
        let inputs = scan_images(&input_dir)?;
        let mut summary = BatchSummary::default();
        if inputs.is_empty() {
            warn!(dir = %input_dir.display(), "No images found");
            return Ok(summary);
        }
        info!(count = inputs.len(), input = %input_dir.display(), output = %output_dir.display(), "🚀 Processing images");

        summary.backed_up = self.backup(&inputs);
        let jobs = plan_outputs(&inputs, &output_dir, self.config.output.format.extension());
        let pipeline = PipelineBuilder::build_single(&self.config);
        info!("{}", pipeline.info());

        let outcomes = self.run_jobs(&jobs, |job| self.process_file(job, &pipeline));

        let delete = self.deletion_allowed(&input_dir, &output_dir);
        let mut records = Vec::new();
        for (job, outcome) in jobs.iter().zip(outcomes) {
            summary.tally(&outcome);
            if let FileOutcome::Done(record) = outcome {
                if delete && self.delete_original(&job.source, &job.output) {
                    summary.deleted += 1;
                }
                summary.outputs.push(record.output.clone());
                records.push(record);
            }
        }

        if let Some(article) = &self.config.article {
            let report = Renamer::new(article.clone()).rename(records);
            summary.apply_rename(report);
        }
        summary.log();
        Ok(summary)
    }

    /// Process every image of `input_dir` and compose them into one collage
    /// at `output_file`. The extension follows the configured output format.
    pub fn run_merge(&self, input_dir: &Path, output_file: &Path) -> Result<BatchSummary> {
        let output_dir = output_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let (input_dir, output_dir) = self.prepare_dirs(input_dir, output_dir)?;
        let stem = output_file
            .file_stem()
            .ok_or_else(|| RetouchError::InvalidConfig(format!("{output_file:?} has no file name")))?;
        let output = output_dir.join(format!(
            "{}.{}",
            stem.to_string_lossy(),
            self.config.output.format.extension()
        ));

        let inputs: Vec<PathBuf> = scan_images(&input_dir)?
            .into_iter()
            .filter(|path| {
                let is_output = same_path(path, &output);
                if is_output {
                    info!(file = %path.display(), "Skipping the collage output itself");
                }
                !is_output
            })
            .collect();

        let mut summary = BatchSummary::default();
        if inputs.is_empty() {
            warn!(dir = %input_dir.display(), "No images found");
            return Ok(summary);
        }
        info!(count = inputs.len(), output = %output.display(), "🚀 Building collage");
        summary.backed_up = self.backup(&inputs);

        let pipeline = PipelineBuilder::build_merge_item(&self.config);
        info!("{}", pipeline.info());
        let jobs: Vec<FileJob> = inputs
            .iter()
            .map(|source| FileJob {
                source: source.clone(),
                output: output.clone(),
            })
            .collect();
        let outcomes = self.run_jobs(&jobs, |job| self.retouch_file(job, &pipeline));

        let mut images = Vec::new();
        let mut used_sources = Vec::new();
        for (job, outcome) in jobs.iter().zip(outcomes) {
            summary.tally(&outcome);
            if let FileOutcome::Done(image) = outcome {
                images.push(image);
                used_sources.push(job.source.clone());
            }
        }
        if summary.cancelled {
            warn!("Cancelled before the collage was composed");
            summary.log();
            return Ok(summary);
        }
        if images.is_empty() {
            warn!("No images left to compose after processing");
            summary.log();
            return Ok(summary);
        }

        if let Some(ratios) = &self.config.collage.placement_ratios {
            images = scale_proportionally(images, ratios);
        }
        let collage = CollageLayout::from_config(&self.config.collage).compose(images)?;
        let finished = PipelineBuilder::build_finishing(&self.config).process(collage, &self.cancel)?;
        for (stage, message) in &finished.recovered {
            warn!(stage = %stage, error = %message, "Collage stage skipped");
        }

        save_image(&finished.image, &output, &self.config.output)?;
        info!(file = %output.display(), size = ?finished.image.dimensions(), "💾 Collage saved");
        summary.outputs.push(output.clone());

        if self.deletion_allowed(&input_dir, &output_dir) {
            summary.deleted = used_sources
                .iter()
                .filter(|source| self.delete_original(source, &output))
                .count();
        }

        if let Some(article) = &self.config.article {
            let record = ProcessedFileRecord {
                original_base: base_name(&output),
                output,
            };
            let report = Renamer::new(article.clone()).rename(vec![record]);
            summary.apply_rename(report);
        }
        summary.log();
        Ok(summary)
    }

    /// Rename the images already present in `dir` without processing them
    pub fn run_rename(&self, dir: &Path) -> Result<RenameReport> {
        let article = self
            .config
            .article
            .clone()
            .ok_or_else(|| RetouchError::InvalidConfig("renaming needs an article".into()))?;
        let records: Vec<ProcessedFileRecord> = scan_images(dir)?
            .into_iter()
            .map(|path| ProcessedFileRecord {
                original_base: base_name(&path),
                output: path,
            })
            .collect();
        let report = Renamer::new(article).rename(records);
        info!(renamed = report.renamed.len(), failed = report.failed, "🏷️ Rename finished");
        Ok(report)
    }

    fn prepare_dirs(&self, input_dir: &Path, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        if !input_dir.is_dir() {
            return Err(RetouchError::InvalidConfig(format!(
                "input directory {input_dir:?} does not exist"
            )));
        }
        fs::create_dir_all(output_dir)?;
        Ok((fs::canonicalize(input_dir)?, fs::canonicalize(output_dir)?))
    }

    fn backup(&self, inputs: &[PathBuf]) -> usize {
        match &self.config.backup_dir {
            Some(dir) => {
                let copied = backup_files(inputs, dir);
                info!(copied, dir = %dir.display(), "🗄️ Originals backed up");
                copied
            }
            None => 0,
        }
    }

    fn run_jobs<T, F>(&self, jobs: &[FileJob], work: F) -> Vec<FileOutcome<T>>
    where
        T: Send,
        F: Fn(&FileJob) -> FileOutcome<T> + Sync,
    {
        if self.config.parallel {
            jobs.par_iter().map(&work).collect()
        } else {
            jobs.iter().map(&work).collect()
        }
    }

    /// Decode and run the pipeline. Decode failures are skips; anything
    /// else fatal to the file is an error.
    fn retouch_file(&self, job: &FileJob, pipeline: &Pipeline) -> FileOutcome<RgbaImage> {
        if self.cancel.is_cancelled() {
            return FileOutcome::Cancelled;
        }
        let name = job.source.file_name().unwrap_or_default().to_string_lossy();
        info!(file = %name, "📷 Processing");

        let image = match decode_image(&job.source, &self.config.decoder) {
            Ok(image) => image,
            Err(err) => {
                warn!(file = %name, error = %err, "Skipping unreadable image");
                return FileOutcome::Skipped;
            }
        };

        match pipeline.process(image, &self.cancel) {
            Ok(output) => {
                if !output.recovered.is_empty() {
                    warn!(file = %name, skipped_stages = output.recovered.len(), "Processed with skipped stages");
                }
                FileOutcome::Done(output.image)
            }
            Err(RetouchError::Cancelled) => FileOutcome::Cancelled,
            Err(err) => {
                error!(file = %name, error = %err, "Abandoning file");
                FileOutcome::Errored
            }
        }
    }

    fn process_file(&self, job: &FileJob, pipeline: &Pipeline) -> FileOutcome {
        let image = match self.retouch_file(job, pipeline) {
            FileOutcome::Done(image) => image,
            FileOutcome::Skipped => return FileOutcome::Skipped,
            FileOutcome::Errored => return FileOutcome::Errored,
            FileOutcome::Cancelled => return FileOutcome::Cancelled,
        };

        if let Err(err) = save_image(&image, &job.output, &self.config.output) {
            error!(error = %err, "Abandoning file");
            return FileOutcome::Errored;
        }
        info!(file = %job.output.display(), state = %FileState::Saved, "💾 Saved");
        FileOutcome::Done(ProcessedFileRecord {
            output: job.output.clone(),
            original_base: base_name(&job.source),
        })
    }

    fn deletion_allowed(&self, input_dir: &Path, output_dir: &Path) -> bool {
        if !self.config.delete_originals {
            return false;
        }
        if same_path(input_dir, output_dir) {
            warn!("Input and output directories are the same, originals are kept");
            return false;
        }
        true
    }

    fn delete_original(&self, source: &Path, output: &Path) -> bool {
        if same_path(source, output) {
            return false;
        }
        match fs::remove_file(source) {
            Ok(()) => true,
            Err(err) => {
                warn!(file = %source.display(), error = %err, "Could not delete original");
                false
            }
        }
    }
}

/// Map each input to an output path. Outputs never land on another input's
/// path, and two inputs sharing a base name get `name (n)` suffixes.
fn plan_outputs(inputs: &[PathBuf], output_dir: &Path, ext: &str) -> Vec<FileJob> {
    let mut taken: HashSet<PathBuf> = inputs.iter().cloned().collect();
    inputs
        .iter()
        .map(|source| {
            taken.remove(source);
            let output = unique_output_path(output_dir, &base_name(source), ext, &taken);
            taken.insert(source.clone());
            taken.insert(output.clone());
            FileJob {
                source: source.clone(),
                output,
            }
        })
        .collect()
}
