//! Background delivery: the job queue and the fetch-and-deliver pipeline.

pub mod backoff;
pub mod pipeline;
pub mod queue;

pub use pipeline::{DeliveryPipeline, JobProcessor, RecordingSource, ZoomRecordingSource};
pub use queue::{JobQueue, JobQueueConfig};
