//! Meter reading application entry point.
//!
//! Builds the device, recognizer and sink from configuration and runs
//! capture → transform → recognize → parse once or periodically.

use crate::broker::BrokerSink;
use crate::capture::device_for;
use crate::config::Config;
use crate::error::Result;
use crate::ocr::{TesseractRecognizer, TextRecognizer};
use crate::pipeline::orchestrator::{
    MeterPipeline, OnceOptions, PeriodicOptions, PipelineConfig,
};
use crate::pipeline::sink::{NullSink, ResultSink};
use crate::pipeline::types::MeasurementRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Build a pipeline with the production device and recognizer.
pub fn build_pipeline(config: PipelineConfig) -> Result<MeterPipeline> {
    let device = device_for(&config.capture)?;
    let recognizer: Arc<dyn TextRecognizer> =
        Arc::new(TesseractRecognizer::from_config(&config.extraction));
    log::debug!(
        "pipeline for {}: {} device, {} engine",
        config.meter_id,
        device.name(),
        recognizer.engine_name()
    );
    Ok(MeterPipeline::new(config, device, recognizer))
}

/// Select the result sink: MQTT when configured or forced, otherwise none.
pub fn build_sink(config: &Config, force_mqtt: bool) -> Box<dyn ResultSink> {
    match config.broker_config(force_mqtt) {
        Some(broker) => {
            log::info!(
                "publishing to {}:{} topic {}",
                broker.host,
                broker.port,
                broker.topic
            );
            Box::new(BrokerSink::mosquitto(broker))
        }
        None => Box::new(NullSink),
    }
}

fn print_record(record: &MeasurementRecord) {
    match record.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("failed to encode record: {e}"),
    }
}

/// Run the `run-once` command: capture, publish, print.
pub fn run_once_command(
    config: &Config,
    output: Option<PathBuf>,
    save_debug: Option<PathBuf>,
    force_mqtt: bool,
) -> Result<()> {
    let mut pipeline = build_pipeline(config.to_pipeline_config()?)?;
    let sink = build_sink(config, force_mqtt);
    let record = pipeline.run_once(
        sink.as_ref(),
        &OnceOptions {
            output,
            debug_dir: save_debug,
        },
    )?;
    print_record(&record);
    Ok(())
}

/// Run the `run-loop` command until the process is stopped.
pub fn run_loop_command(
    config: &Config,
    interval: Duration,
    output_dir: Option<PathBuf>,
    save_debug: Option<PathBuf>,
    force_mqtt: bool,
) -> Result<()> {
    let mut pipeline = build_pipeline(config.to_pipeline_config()?)?;
    let sink = build_sink(config, force_mqtt);
    log::info!(
        "reading {} every {}",
        pipeline.config().meter_id,
        humantime::format_duration(interval)
    );
    let summary = pipeline.run_periodic(
        sink.as_ref(),
        &PeriodicOptions {
            interval,
            output_dir,
            debug_dir: save_debug,
            max_iterations: None,
        },
        &mut print_record,
    )?;
    log::info!(
        "stopped after {} iterations ({} failed)",
        summary.iterations,
        summary.failures
    );
    Ok(())
}
