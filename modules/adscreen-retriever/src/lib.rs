pub mod pipeline;
pub mod traits;

#[cfg(feature = "test-support")]
pub mod testing;

pub use pipeline::{PipelineError, Retriever, RetrieverConfig, RunReport, RunStats};
