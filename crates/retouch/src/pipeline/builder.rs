use crate::{
    pipeline::Pipeline,
    traits::ImageStage,
    config::{ProcessingConfig, SizeLimit},
    algorithms::{
        AspectRatioEnforcer,
        BackgroundRemover,
        Cropper,
        ExactCanvas,
        MaxSizeClamp,
        Padder,
        PerimeterCheck,
        PreResizer,
        Whitener,
    },
};

/// Builder for creating processing pipelines with a fluent API
pub struct PipelineBuilder {
    stages: Vec<Box<dyn ImageStage>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Add a stage to the end of the pipeline
    pub fn add_stage<S>(mut self, stage: S) -> Self
    where
        S: ImageStage + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    fn add_stage_if<S>(self, stage: Option<S>) -> Self
    where
        S: ImageStage + 'static,
    {
        match stage {
            Some(stage) => self.add_stage(stage),
            None => self,
        }
    }

    /// Downscale after decoding, when any limit is set
    pub fn with_pre_resize(self, limit: SizeLimit) -> Self {
        self.add_stage_if(limit.is_active().then_some(PreResizer { limit }))
    }

    /// Per-image steps: pre-resize, whitening, perimeter check, background
    /// removal, cropping and padding
    pub fn with_retouching(self, config: &ProcessingConfig) -> Self {
        let perimeter = config
            .perimeter_margin
            .filter(|&margin| margin > 0)
            .map(|margin| PerimeterCheck {
                tolerance: config.perimeter_tolerance(),
                margin,
            });
        let padding = config
            .padding_percent
            .filter(|&percent| percent > 0.0)
            .map(|percent| Padder::new(percent, config.allow_expansion));

        self.with_pre_resize(config.pre_resize)
            .add_stage_if(config.whitening.map(|whitening| Whitener { config: whitening }))
            .add_stage_if(perimeter)
            .add_stage_if(config.background_tolerance.map(|tolerance| BackgroundRemover { tolerance }))
            .add_stage_if(config.crop.map(Cropper::new))
            .add_stage_if(padding)
    }

    /// Canvas steps: aspect ratio, maximum size and exact canvas
    pub fn with_composer(self, config: &ProcessingConfig) -> Self {
        let max_size = config.max_size;
        let background = (!config.output.format.has_alpha()).then_some(config.output.background);

        self.add_stage_if(config.aspect_ratio.map(|ratio| AspectRatioEnforcer { ratio }))
            .add_stage_if(max_size.is_active().then_some(MaxSizeClamp { limit: max_size }))
            .add_stage_if(config.exact_canvas.map(|size| ExactCanvas { size, background }))
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.stages)
    }

    /// Full per-file pipeline for the single-image flow
    pub fn build_single(config: &ProcessingConfig) -> Pipeline {
        Self::new().with_retouching(config).with_composer(config).build()
    }

    /// Per-image pipeline for the merge flow; canvas steps run on the collage
    pub fn build_merge_item(config: &ProcessingConfig) -> Pipeline {
        Self::new().with_retouching(config).build()
    }

    /// Canvas steps applied once to a finished collage
    pub fn build_finishing(config: &ProcessingConfig) -> Pipeline {
        Self::new().with_composer(config).build()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
