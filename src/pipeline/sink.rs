use crate::error::{MeterError, Result};
use crate::pipeline::types::MeasurementRecord;
use std::sync::{Arc, Mutex};

/// Destination for finished measurement records.
///
/// A failed publish never alters the record; callers decide whether the
/// failure is fatal.
pub trait ResultSink: Send + Sync {
    /// Deliver one record.
    fn publish(&self, record: &MeasurementRecord) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

impl<T: ResultSink + ?Sized> ResultSink for Arc<T> {
    fn publish(&self, record: &MeasurementRecord) -> Result<()> {
        (**self).publish(record)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: ResultSink + ?Sized> ResultSink for Box<T> {
    fn publish(&self, record: &MeasurementRecord) -> Result<()> {
        (**self).publish(record)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Sink that discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn publish(&self, record: &MeasurementRecord) -> Result<()> {
        log::debug!("null sink dropped record for {}", record.meter_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Sink that keeps published records in memory.
///
/// Clones share the same storage, so a test can keep one handle and hand
/// the other to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    records: Arc<Mutex<Vec<MeasurementRecord>>>,
    should_fail: bool,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the sink to reject every record.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn records(&self) -> Vec<MeasurementRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for CollectorSink {
    fn publish(&self, record: &MeasurementRecord) -> Result<()> {
        if self.should_fail {
            return Err(MeterError::Transport {
                message: "collector rejected record".to_string(),
            });
        }
        self.records
            .lock()
            .map_err(|_| MeterError::Transport {
                message: "collector storage poisoned".to_string(),
            })?
            .push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
