//! Meter reading pipeline.
//!
//! Sequences capture, transform, text extraction and parsing into one
//! timestamped [`MeasurementRecord`], then hands it to a [`ResultSink`].
//! Runs once or on a fixed interval; everything is synchronous.

pub mod error;
pub mod orchestrator;
pub mod sink;
pub mod timing;
pub mod types;

pub use error::{ErrorReporter, LogReporter};
pub use orchestrator::{LoopSummary, MeterPipeline, OnceOptions, PeriodicOptions, PipelineConfig};
pub use sink::{CollectorSink, NullSink, ResultSink};
pub use timing::{Backoff, Clock, FixedClock, RecordingSleeper, Sleeper, SystemClock, ThreadSleeper};
pub use types::{MeasurementRecord, snapshot_file_name};
