mod background;
mod overlay;
mod preprocess;
mod processor;
mod segmenter;

pub use background::{BackgroundModel, FloatImage, DEFAULT_ACCUM_WEIGHT};
pub use overlay::{draw_motion_box, FrameAnnotator, ANNOTATION_COLOR, TIMESTAMP_FORMAT};
pub use preprocess::{
    kernel_sigma, prepare_gray, resize_to_width, to_gray, working_height, BLUR_KERNEL_SIZE,
};
pub use processor::{FrameProcessor, ProcessReport, ProcessorMetrics};
pub use segmenter::{MotionSegmenter, DEFAULT_MORPH_ITERATIONS, DEFAULT_THRESHOLD};
