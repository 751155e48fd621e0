//! Console output for the CLI.
//!
//! Human-readable output goes to stderr so stdout stays clean for `--json`.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::env;
use std::io::{self, Write as _};
use uartstress::{IterationReport, Outcome, RunSummary, StressConfig};

/// Console reporter configured once at startup.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reporter {
    verbose: u8,
    quiet: bool,
    fancy: bool,
}

impl Reporter {
    /// Create a reporter, disabling colors when `NO_COLOR` is set or stderr is
    /// not a terminal.
    pub(crate) fn detect(verbose: u8, quiet: bool) -> Self {
        let stderr_is_tty = console::Term::stderr().is_term();
        if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        Self {
            verbose,
            quiet,
            fancy: stderr_is_tty && console::colors_enabled_stderr(),
        }
    }

    /// Plain reporter that never draws animations.
    #[cfg(test)]
    pub(crate) fn plain(verbose: u8, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            fancy: false,
        }
    }

    pub(crate) fn is_verbose(&self) -> bool {
        self.verbose > 0 && !self.quiet
    }

    /// Start-of-run banner.
    pub(crate) fn banner(&self, port: &str, baud: u32, config: &StressConfig) {
        if self.quiet {
            return;
        }
        eprintln!(
            "{}",
            style("============ UART stress test ============")
                .yellow()
                .bold()
        );
        eprintln!(
            "Opening serial port {} at {} baud",
            style(port).cyan(),
            style(baud).cyan()
        );
        eprintln!(
            "{} iterations of {} bytes, response window {} ms, {} checksum",
            config.iterations,
            config.payload_size,
            config
                .response_window(baud)
                .as_millis(),
            config.byte_order
        );
    }

    /// The device was acquired.
    pub(crate) fn opened(&self) {
        if !self.quiet {
            eprintln!("{} Connection opened", style("✓").green());
        }
    }

    /// Progress bar over all iterations, hidden unless drawing makes sense.
    pub(crate) fn progress_bar(&self, total: usize) -> ProgressBar {
        if self.quiet || self.is_verbose() || !self.fancy {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb
    }

    /// One dot per read attempt (verbose only).
    pub(crate) fn poll_tick(&self) {
        if self.is_verbose() {
            eprint!(".");
            let _ = io::stderr().flush();
        }
    }

    /// Per-iteration verdict.
    pub(crate) fn iteration(&self, report: &IterationReport, pb: &ProgressBar) {
        if self.is_verbose() {
            // Terminate the line of poll dots.
            eprintln!();
            eprintln!("  to_send: {}", report.payload.to_hex());
            eprintln!(
                "  checksum: {} ({:#010x}), {} of {} bytes written",
                report.expected_checksum,
                report.expected_checksum,
                report.bytes_written,
                report.payload.len()
            );
            eprintln!("  received: {}", hex(&report.response));
        }

        let line = format_iteration(report);
        if !pb.is_hidden() {
            pb.inc(1);
            if !report.outcome.is_pass() {
                pb.println(line);
            }
        } else if !self.quiet || !report.outcome.is_pass() {
            eprintln!("{line}");
        }
    }

    /// End-of-run summary.
    pub(crate) fn summary(&self, summary: &RunSummary) {
        if self.quiet {
            return;
        }
        let text = summary.to_string();
        let styled = if summary.all_passed() {
            style(text).green().bold()
        } else {
            style(text).red().bold()
        };
        eprintln!("\n{} {styled}", style("Result:").bold());
        eprintln!(
            "{}",
            style("============ UART stress test end ============")
                .yellow()
                .bold()
        );
    }

    /// Port listing header and entries.
    pub(crate) fn port_list(&self, ports: &[uartstress::PortInfo]) {
        eprintln!("{}", style("Available serial ports").bold().underlined());
        if ports.is_empty() {
            eprintln!("  {}", style("No serial ports found").dim());
            return;
        }
        for port in ports {
            let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" ({vid:04X}:{pid:04X})")
            } else {
                String::new()
            };
            let product = port
                .product
                .as_deref()
                .map(|p| format!(" - {}", style(p).dim()))
                .unwrap_or_default();
            eprintln!(
                "  {} {}{vid_pid}{product}",
                style("•").green(),
                style(&port.name).cyan()
            );
        }
    }

    /// Fatal error, printed once.
    pub(crate) fn error(&self, err: &anyhow::Error) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// One-line verdict for an iteration.
pub(crate) fn format_iteration(report: &IterationReport) -> String {
    match report.outcome {
        Outcome::Pass => format!(
            "{} test #{}: {} ({} ms)",
            style("✓").green(),
            report.index,
            style("PASS").green(),
            report
                .elapsed
                .as_millis()
        ),
        Outcome::Fail(reason) => format!(
            "{} test #{}: {} ({reason})",
            style("✗").red(),
            report.index,
            style("FAIL").red()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uartstress::{FailReason, Payload};

    fn report(outcome: Outcome) -> IterationReport {
        IterationReport {
            index: 2,
            payload: Payload::from(vec![1, 2, 3]),
            expected_checksum: 6,
            bytes_written: 3,
            response: vec![6, 0, 0, 0],
            elapsed: Duration::from_millis(12),
            outcome,
        }
    }

    #[test]
    fn test_format_pass() {
        console::set_colors_enabled(false);
        let line = format_iteration(&report(Outcome::Pass));
        assert!(line.contains("test #2"));
        assert!(line.contains("PASS"));
        assert!(line.contains("12 ms"));
    }

    #[test]
    fn test_format_fail_includes_reason() {
        console::set_colors_enabled(false);
        let line = format_iteration(&report(Outcome::Fail(
            FailReason::ResponseLengthMismatch {
                expected: 4,
                actual: 2,
            },
        )));
        assert!(line.contains("FAIL"));
        assert!(line.contains("expected 4 bytes, got 2"));
    }

    #[test]
    fn test_plain_reporter_has_hidden_progress() {
        assert!(
            Reporter::plain(0, false)
                .progress_bar(5)
                .is_hidden()
        );
        assert!(!Reporter::plain(0, true).is_verbose());
        assert!(Reporter::plain(1, false).is_verbose());
    }
}
