pub mod config;
pub mod context;
pub mod stream;
pub mod transform;

pub use config::{PatternRule, PipelineConfig, StructuredFormats};
pub use context::{DropReason, LabelMap, LineOutcome, ProcessingStats};
pub use stream::LineDispatcher;
pub use transform::TransformPipeline;
