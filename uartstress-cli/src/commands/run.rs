//! `run` command: drive the stress test against a real device.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uartstress::stress::{
    DEFAULT_ITERATIONS, DEFAULT_PAYLOAD_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_RESPONSE_TIMEOUT,
};
use uartstress::{
    IterationReport, NativeTransport, RunSummary, StressConfig, StressTest, Transport, WriteMode,
};

use crate::config::Config;
use crate::report::Reporter;
use crate::{CliError, RunArgs};

/// Fully resolved parameters of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSettings {
    pub(crate) port: String,
    pub(crate) baud: u32,
    pub(crate) stress: StressConfig,
    pub(crate) seed: Option<u64>,
}

/// Merge command-line/environment values with the config file and validate.
///
/// Command-line arguments and environment variables arrive through `args`
/// (clap resolves the environment), so they take precedence over `config`.
pub(crate) fn resolve(args: &RunArgs, config: &Config) -> Result<RunSettings, CliError> {
    let port = args
        .port
        .clone()
        .or_else(|| {
            config
                .connection
                .port
                .clone()
        })
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| usage("no serial port given (pass PORT, set UARTSTRESS_PORT, or add [connection] port to the config)"))?;

    let baud = args
        .baud
        .or(config.connection.baud)
        .ok_or_else(|| usage("no baud rate given (pass BAUD, set UARTSTRESS_BAUD, or add [connection] baud to the config)"))?;
    if baud == 0 {
        return Err(usage("baud rate must be a positive integer"));
    }

    let count = args
        .count
        .or(config.test.count)
        .unwrap_or(DEFAULT_ITERATIONS);
    if count == 0 {
        return Err(usage("iteration count must be a positive integer"));
    }

    let size = args
        .size
        .or(config.test.size)
        .unwrap_or(DEFAULT_PAYLOAD_SIZE);
    if size == 0 {
        return Err(usage("payload size must be a positive integer"));
    }

    let timeout = args
        .timeout_ms
        .or(config.test.timeout_ms)
        .map_or(DEFAULT_RESPONSE_TIMEOUT, Duration::from_millis);
    let poll = args
        .poll_ms
        .or(config.test.poll_ms)
        .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);
    let byte_order = args
        .byte_order
        .map(Into::into)
        .or(config.test.byte_order)
        .unwrap_or_default();
    let write_mode = if args.write_all || config.test.write_all {
        WriteMode::Complete
    } else {
        WriteMode::Single
    };

    Ok(RunSettings {
        port,
        baud,
        stress: StressConfig::new(size, count)
            .with_response_timeout(timeout)
            .with_poll_interval(poll)
            .with_byte_order(byte_order)
            .with_write_mode(write_mode),
        seed: args.seed,
    })
}

fn usage(message: &str) -> CliError {
    CliError::Usage(message.to_string())
}

/// Run command implementation.
pub(crate) fn cmd_run(args: &RunArgs, config: &Config, reporter: &Reporter) -> Result<()> {
    let settings = resolve(args, config)?;
    debug!("Resolved run settings: {settings:?}");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            warn!("Could not install Ctrl-C handler: {e}");
        }
    }

    reporter.banner(&settings.port, settings.baud, &settings.stress);

    let transport = NativeTransport::with_port(&settings.port, settings.baud);
    let tick_reporter = *reporter;
    let mut test = StressTest::new(transport, settings.stress.clone())?
        .with_stop_flag(stop)
        .with_poll_observer(move |_| tick_reporter.poll_tick());
    if let Some(seed) = settings.seed {
        test = test.with_seed(seed);
    }

    test.open()
        .with_context(|| {
            format!(
                "Failed to open serial port {} (make sure no other application is using it)",
                settings.port
            )
        })?;
    reporter.opened();

    let pb = reporter.progress_bar(settings.stress.iterations);
    let mut records = Vec::new();
    let summary = test.run(&mut |report| {
        reporter.iteration(report, &pb);
        if args.json {
            records.push(iteration_json(report));
        }
    })?;
    pb.finish_and_clear();

    // Release the device before reporting.
    test.into_transport()
        .close();

    reporter.summary(&summary);
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run_json(&settings, &summary, records))?
        );
    }

    if summary.interrupted {
        return Err(CliError::Cancelled(summary).into());
    }
    if args.strict && summary.failed > 0 {
        return Err(CliError::TestsFailed(summary).into());
    }
    Ok(())
}

fn iteration_json(report: &IterationReport) -> serde_json::Value {
    let mut value = serde_json::json!({
        "index": report.index,
        "bytes_written": report.bytes_written,
        "expected_checksum": report.expected_checksum,
        "response": report.response,
        "elapsed_ms": report.elapsed.as_millis() as u64,
    });
    if let (Some(obj), Ok(serde_json::Value::Object(outcome))) =
        (value.as_object_mut(), serde_json::to_value(report.outcome))
    {
        obj.extend(outcome);
    }
    value
}

fn run_json(
    settings: &RunSettings,
    summary: &RunSummary,
    iterations: Vec<serde_json::Value>,
) -> serde_json::Value {
    serde_json::json!({
        "port": settings.port,
        "baud": settings.baud,
        "payload_size": settings.stress.payload_size,
        "byte_order": settings.stress.byte_order,
        "write_mode": settings.stress.write_mode,
        "seed": settings.seed,
        "summary": summary,
        "iterations": iterations,
    })
}
