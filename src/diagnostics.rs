//! System diagnostics and dependency checking.
//!
//! Verifies that the external tools the configured pipeline drives are
//! installed.

use crate::capture::{CaptureBackend, DeviceKind};
use crate::defaults;
use crate::error::MeterError;
use crate::exec::{CommandExecutor, SystemCommandExecutor};
use crate::pipeline::PipelineConfig;
use std::path::Path;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues
    Warning(String),
}

/// One external tool the pipeline depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub label: &'static str,
    pub command: String,
    pub probe_args: Vec<&'static str>,
    /// Some tools print usage and exit non-zero; that still proves they exist.
    pub nonzero_ok: bool,
}

/// Check if a command exists and is executable.
pub fn check_command(executor: &dyn CommandExecutor, check: &ToolCheck) -> CheckResult {
    match executor.execute(&check.command, &check.probe_args) {
        Ok(_) => CheckResult::Ok,
        Err(MeterError::ToolNotFound { .. }) => CheckResult::NotFound,
        Err(MeterError::CommandFailed { .. }) if check.nonzero_ok => CheckResult::Ok,
        Err(e) => CheckResult::Warning(format!("'{}' found but probe failed: {}", check.command, e)),
    }
}

/// Tools required by a pipeline configuration.
pub fn required_tools(config: &PipelineConfig, publish: bool) -> Vec<ToolCheck> {
    let tesseract = config
        .extraction
        .tesseract_cmd
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| defaults::TESSERACT_CMD.to_string());

    let mut tools = vec![ToolCheck {
        label: "OCR engine",
        command: tesseract,
        probe_args: vec!["--version"],
        nonzero_ok: false,
    }];

    match config.capture.device {
        DeviceKind::Auto | DeviceKind::Usb => tools.push(ToolCheck {
            label: "USB capture",
            command: CaptureBackend::V4l2.command().to_string(),
            probe_args: vec!["-version"],
            nonzero_ok: false,
        }),
        DeviceKind::Picam => tools.push(ToolCheck {
            label: "Pi camera capture",
            command: CaptureBackend::Libcamera.command().to_string(),
            probe_args: vec!["--version"],
            nonzero_ok: false,
        }),
        DeviceKind::File => {}
    }

    if publish {
        tools.push(ToolCheck {
            label: "MQTT publisher",
            command: defaults::MQTT_PUBLISH_CMD.to_string(),
            probe_args: vec!["--help"],
            nonzero_ok: true,
        });
    }

    tools
}

/// Check whether the configured image source exists.
pub fn check_source(config: &PipelineConfig, device_root: &Path) -> CheckResult {
    match config.capture.device {
        DeviceKind::Auto | DeviceKind::Usb => {
            let node = device_root.join(format!("video{}", config.capture.index));
            if node.exists() {
                CheckResult::Ok
            } else {
                CheckResult::Warning(format!("{} does not exist", node.display()))
            }
        }
        DeviceKind::Picam => CheckResult::Ok,
        DeviceKind::File => match &config.capture.path {
            Some(path) if path.is_file() => CheckResult::Ok,
            Some(path) => CheckResult::Warning(format!("{} is not a file", path.display())),
            None => CheckResult::NotFound,
        },
    }
}

fn print_result(label: &str, result: &CheckResult) {
    match result {
        CheckResult::Ok => println!("{label}: ✓ OK"),
        CheckResult::NotFound => println!("{label}: ✗ NOT FOUND"),
        CheckResult::Warning(msg) => println!("{label}: ⚠ WARNING: {msg}"),
    }
}

/// Run all dependency checks and print results.
///
/// Returns `true` when nothing required is missing.
pub fn check_dependencies(config: &PipelineConfig, publish: bool) -> bool {
    check_dependencies_with(&SystemCommandExecutor::new(), config, publish)
}

pub fn check_dependencies_with(
    executor: &dyn CommandExecutor,
    config: &PipelineConfig,
    publish: bool,
) -> bool {
    println!("Checking system dependencies...\n");

    let mut all_found = true;
    for tool in required_tools(config, publish) {
        let result = check_command(executor, &tool);
        if result == CheckResult::NotFound {
            all_found = false;
        }
        print_result(&format!("{} ({})", tool.label, tool.command), &result);
    }

    let source = check_source(config, Path::new("/dev"));
    print_result(&format!("Image source ({})", config.capture.device), &source);

    println!();
    if all_found {
        println!("All required tools found.");
    } else {
        println!("Some required tools are missing.");
    }
    all_found
}
