pub mod annotation;
pub mod pipeline_logger;
pub mod plate_pipeline;
pub mod stream_runner;
