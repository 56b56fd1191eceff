pub mod processor;
pub mod queue;

pub use processor::{IngestPipeline, IngestWorkerPool};
pub use queue::{IngestQueue, IngestTask};
