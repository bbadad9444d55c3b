pub mod logger;
pub mod mlv_pipeline;
