//! Capture → transform → recognize → parse, once or on a timer.

use crate::capture::{CaptureConfig, ImagingDevice, capture_frame};
use crate::defaults;
use crate::error::Result;
use crate::ocr::{ExtractionConfig, TextRecognizer, extract_text};
use crate::parse::parse_reading;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::sink::ResultSink;
use crate::pipeline::timing::{Backoff, Clock, Sleeper, SystemClock, ThreadSleeper};
use crate::pipeline::types::{MeasurementRecord, snapshot_file_name};
use crate::transform::{self, TransformConfig};
use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the pipeline.
///
/// Every instance owns its sub-configurations; cloning is a deep copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub meter_id: String,
    /// Unit reported when the recognized text carries none
    pub unit: Option<String>,
    pub capture: CaptureConfig,
    pub transform: TransformConfig,
    pub extraction: ExtractionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            meter_id: defaults::METER_ID.to_string(),
            unit: None,
            capture: CaptureConfig::default(),
            transform: TransformConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

/// Options for the single-shot mode.
#[derive(Debug, Clone, Default)]
pub struct OnceOptions {
    /// Write the record here as JSON
    pub output: Option<PathBuf>,
    /// Dump raw and processed images here
    pub debug_dir: Option<PathBuf>,
}

/// Options for the periodic mode.
#[derive(Debug, Clone)]
pub struct PeriodicOptions {
    pub interval: Duration,
    /// Write one snapshot per successful reading into this directory
    pub output_dir: Option<PathBuf>,
    pub debug_dir: Option<PathBuf>,
    /// Stop after this many iterations (`None` runs until the process stops)
    pub max_iterations: Option<u64>,
}

impl Default for PeriodicOptions {
    fn default() -> Self {
        Self {
            interval: defaults::INTERVAL,
            output_dir: None,
            debug_dir: None,
            max_iterations: None,
        }
    }
}

/// Outcome counts of a finished periodic run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u64,
    pub failures: u64,
}

/// Meter reading pipeline bound to one device and one recognizer.
pub struct MeterPipeline {
    config: PipelineConfig,
    device: Box<dyn ImagingDevice>,
    recognizer: Arc<dyn TextRecognizer>,
    clock: Box<dyn Clock>,
    sleeper: Box<dyn Sleeper>,
    reporter: Box<dyn ErrorReporter>,
}

impl MeterPipeline {
    pub fn new(
        config: PipelineConfig,
        device: Box<dyn ImagingDevice>,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Self {
        Self {
            config,
            device,
            recognizer,
            clock: Box::new(SystemClock),
            sleeper: Box::new(ThreadSleeper),
            reporter: Box::new(LogReporter),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce one measurement record.
    ///
    /// The device is held only while the frame is captured. A text without a
    /// usable number still yields a record, with `reading` absent.
    pub fn run(&mut self, debug_dir: Option<&Path>) -> Result<MeasurementRecord> {
        let frame = capture_frame(self.device.as_mut(), &self.config.capture)?;
        log::debug!("captured {}x{} frame", frame.width(), frame.height());

        let processed = transform::apply(&frame, &self.config.transform)?;
        log::debug!(
            "transformed to {}x{}",
            processed.width(),
            processed.height()
        );

        if let Some(dir) = debug_dir {
            save_debug_images(dir, &frame, &processed)?;
        }

        let text = extract_text(
            self.recognizer.as_ref(),
            &processed,
            &self.config.extraction,
        )?;
        let unit = self.config.unit.as_deref();
        let parsed = parse_reading(&text, unit);
        if parsed.is_none() {
            log::info!("no reading found in {:?}", text);
        }

        Ok(MeasurementRecord::new(
            &self.config.meter_id,
            parsed,
            unit,
            text,
            self.clock.now(),
        ))
    }

    /// Run once, publish, and optionally write the record to a file.
    ///
    /// Any failure, including a failed publish, is returned to the caller.
    pub fn run_once(
        &mut self,
        sink: &dyn ResultSink,
        options: &OnceOptions,
    ) -> Result<MeasurementRecord> {
        let record = self.run(options.debug_dir.as_deref())?;
        log::info!("{}: {:?} {:?}", record.meter_id, record.reading, record.unit);
        sink.publish(&record)?;
        if let Some(path) = &options.output {
            record.save_json(path)?;
            log::debug!("wrote {}", path.display());
        }
        Ok(record)
    }

    /// Run on a fixed interval.
    ///
    /// Fatal (configuration) errors stop the loop and are returned. Any other
    /// failure is reported, and a growing backoff is added to the next pause
    /// until an iteration succeeds again. `on_record` sees every computed
    /// record, including ones whose publish failed.
    pub fn run_periodic(
        &mut self,
        sink: &dyn ResultSink,
        options: &PeriodicOptions,
        on_record: &mut dyn FnMut(&MeasurementRecord),
    ) -> Result<LoopSummary> {
        let mut summary = LoopSummary::default();
        let mut backoff = Backoff::default();

        loop {
            if options
                .max_iterations
                .is_some_and(|max| summary.iterations >= max)
            {
                break;
            }
            summary.iterations += 1;

            let outcome = self.run(options.debug_dir.as_deref()).and_then(|record| {
                on_record(&record);
                self.deliver(sink, &record, options.output_dir.as_deref())
            });

            let pause = match outcome {
                Ok(()) => {
                    backoff.reset();
                    options.interval
                }
                Err(e) if e.is_fatal() => {
                    log::error!("stopping after iteration {}: {}", summary.iterations, e);
                    return Err(e);
                }
                Err(e) => {
                    summary.failures += 1;
                    self.reporter.report(summary.iterations, &e);
                    let extra = backoff.next_delay();
                    log::debug!("backing off {:?}", extra);
                    options.interval + extra
                }
            };

            if options
                .max_iterations
                .is_some_and(|max| summary.iterations >= max)
            {
                break;
            }
            self.sleeper.sleep(pause);
        }

        Ok(summary)
    }

    /// Publish a record and write its snapshot.
    ///
    /// The snapshot is written even when publishing fails; the publish
    /// failure is returned afterwards.
    fn deliver(
        &self,
        sink: &dyn ResultSink,
        record: &MeasurementRecord,
        output_dir: Option<&Path>,
    ) -> Result<()> {
        let published = sink.publish(record);
        if let Some(dir) = output_dir {
            let path = dir.join(snapshot_file_name(&record.meter_id, self.clock.now()));
            record.save_json(&path)?;
            log::debug!("wrote {}", path.display());
        }
        published
    }
}

/// Write `raw.png` and `processed.png` into `dir`, replacing earlier files.
pub fn save_debug_images(dir: &Path, raw: &DynamicImage, processed: &GrayImage) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    raw.save(dir.join(defaults::DEBUG_RAW_FILE))?;
    processed.save(dir.join(defaults::DEBUG_PROCESSED_FILE))?;
    log::debug!("debug images saved to {}", dir.display());
    Ok(())
}
