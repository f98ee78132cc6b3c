pub mod builder;

use image::RgbaImage;
use tracing::{debug, warn};

use crate::{
    cancel::CancellationToken,
    error::{Result, RetouchError},
    traits::{ImageStage, StageContext},
    types::FileState,
};

/// Result of running one image through a [`Pipeline`]
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub image: RgbaImage,
    /// Last state reached
    pub state: FileState,
    /// Stages that failed and were skipped, with their error messages
    pub recovered: Vec<(FileState, String)>,
}

/// An ordered chain of image stages
pub struct Pipeline {
    stages: Vec<Box<dyn ImageStage>>,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(stages: Vec<Box<dyn ImageStage>>) -> Self {
        Self { stages }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// States this pipeline can move a file through, in order
    pub fn states(&self) -> Vec<FileState> {
        self.stages.iter().map(|stage| stage.state()).collect()
    }

    /// Run every stage in order.
    ///
    /// A stage failing with a recoverable error is skipped and the image it
    /// received flows on to the next stage. Fatal errors, zero-sized results
    /// and cancellation abandon the image.
    pub fn process(&self, image: RgbaImage, cancel: &CancellationToken) -> Result<PipelineOutput> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RetouchError::EmptyResult { stage: FileState::Opened });
        }

        let mut ctx = StageContext::new();
        let mut current = image;
        let mut state = FileState::Opened;
        let mut recovered = Vec::new();

        for stage in &self.stages {
            cancel.check()?;
            let stage_state = stage.state();

            if ctx.pre_crop_size.is_none()
                && matches!(
                    stage_state,
                    FileState::BackgroundRemoved | FileState::Cropped | FileState::Padded
                )
            {
                ctx.pre_crop_size = Some(current.dimensions());
            }

            match stage.apply(&current, &mut ctx) {
                Ok(Some(next)) => {
                    if next.width() == 0 || next.height() == 0 {
                        return Err(RetouchError::EmptyResult { stage: stage_state });
                    }
                    debug!(
                        stage = %stage_state,
                        from = ?current.dimensions(),
                        to = ?next.dimensions(),
                        "Stage applied"
                    );
                    current = next;
                }
                Ok(None) => debug!(stage = %stage_state, "Stage left image unchanged"),
                Err(err) if err.is_fatal_for_file() => return Err(err),
                Err(err) => {
                    warn!(stage = %stage_state, error = %err, "Stage failed, keeping previous image");
                    recovered.push((stage_state, err.to_string()));
                }
            }
            state = stage_state;
        }

        Ok(PipelineOutput {
            image: current,
            state,
            recovered,
        })
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        let names: Vec<&'static str> = self.stages.iter().map(|stage| stage.state().into()).collect();
        format!("Pipeline: {} stages [{}]", self.stages.len(), names.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{BackgroundRemover, Cropper, Padder};
    use image::Rgba;

    /// White 100x100 image with a centred black 40x40 square
    fn create_test_image() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        for y in 30..70 {
            for x in 30..70 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        img
    }

    struct FailingStage;

    impl ImageStage for FailingStage {
        fn state(&self) -> FileState {
            FileState::Whitened
        }

        fn apply(&self, _image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
            Err(RetouchError::transform(FileState::Whitened, "boom"))
        }
    }

    struct CollapsingStage;

    impl ImageStage for CollapsingStage {
        fn state(&self) -> FileState {
            FileState::Cropped
        }

        fn apply(&self, _image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
            Ok(Some(RgbaImage::new(0, 0)))
        }
    }

    #[test]
    fn test_remove_crop_pad() {
        let pipeline = Pipeline::builder()
            .add_stage(BackgroundRemover { tolerance: 10 })
            .add_stage(Cropper::default())
            .add_stage(Padder::new(5.0, false))
            .build();

        let out = pipeline
            .process(create_test_image(), &CancellationToken::new())
            .expect("Should process successfully");
        // 42x42 crop, then 2px padding fits inside the 100x100 original
        assert_eq!(out.image.dimensions(), (46, 46));
        assert_eq!(out.state, FileState::Padded);
        assert!(out.recovered.is_empty());
    }

    #[test]
    fn test_recoverable_failure_keeps_previous_image() {
        let pipeline = Pipeline::builder()
            .add_stage(FailingStage)
            .add_stage(BackgroundRemover { tolerance: 10 })
            .build();

        let out = pipeline
            .process(create_test_image(), &CancellationToken::new())
            .expect("Should recover");
        assert_eq!(out.recovered.len(), 1);
        assert_eq!(out.recovered[0].0, FileState::Whitened);
        assert_eq!(out.image.get_pixel(0, 0)[3], 0, "Later stages still ran");
    }

    #[test]
    fn test_empty_result_abandons_file() {
        let pipeline = Pipeline::builder().add_stage(CollapsingStage).build();
        let result = pipeline.process(create_test_image(), &CancellationToken::new());
        assert!(matches!(result, Err(RetouchError::EmptyResult { stage: FileState::Cropped })));
    }

    #[test]
    fn test_cancelled_before_first_stage() {
        let pipeline = Pipeline::builder().add_stage(Cropper::default()).build();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            pipeline.process(create_test_image(), &token),
            Err(RetouchError::Cancelled)
        ));
    }

    #[test]
    fn test_info_lists_stages() {
        let pipeline = Pipeline::builder()
            .add_stage(BackgroundRemover::default())
            .add_stage(Cropper::default())
            .build();
        assert_eq!(pipeline.info(), "Pipeline: 2 stages [background_removed -> cropped]");
    }
}
