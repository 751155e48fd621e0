//! uartstress CLI - Command-line UART stress tester.
//!
//! ## Features
//!
//! - Send random payloads and verify the device's checksum answer
//! - Adaptive response deadlines based on payload size and baud rate
//! - Serial port listing
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use env_logger::Env;
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;
use uartstress::{ResponseByteOrder, RunSummary};

mod commands;
mod config;
mod report;

use config::Config;
use report::Reporter;

/// Exit status when every step ran to completion.
const EXIT_OK: u8 = 0;
/// Exit status for any error without a more specific class.
const EXIT_FAILURE: u8 = 1;
/// Exit status for bad or missing arguments.
const EXIT_USAGE: u8 = 2;
/// Exit status when the serial device could not be acquired.
const EXIT_OPEN_FAILED: u8 = 3;
/// Exit status for `--strict` runs with failing iterations.
const EXIT_TESTS_FAILED: u8 = 4;
/// Exit status after Ctrl-C (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

/// Errors that carry a specific exit status through `anyhow`.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid or missing argument.
    #[error("{0}")]
    Usage(String),
    /// The run was stopped by the user.
    #[error("interrupted: {0}")]
    Cancelled(RunSummary),
    /// `--strict` was given and at least one iteration failed.
    #[error("{0}")]
    TestsFailed(RunSummary),
}

/// uartstress - stress test a UART link against a checksum-echo device.
///
/// The device must answer every payload with the 32-bit wrapping sum of the
/// received bytes, as 4 bytes.
///
/// Environment variables:
///   UARTSTRESS_PORT   - Default serial port
///   UARTSTRESS_BAUD   - Default baud rate
///   UARTSTRESS_COUNT  - Default number of iterations
///   UARTSTRESS_SIZE   - Default payload size in bytes
#[derive(Parser)]
#[command(name = "uartstress")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the stress test against a device.
    Run(RunArgs),

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments of the `run` command.
#[derive(Args, Debug)]
struct RunArgs {
    /// Serial port (e.g. /dev/ttyUSB0, ttyUSB0, COM3).
    #[arg(env = "UARTSTRESS_PORT")]
    port: Option<String>,

    /// Baud rate.
    #[arg(env = "UARTSTRESS_BAUD")]
    baud: Option<u32>,

    /// Number of iterations [default: 3].
    #[arg(short = 'n', long, env = "UARTSTRESS_COUNT")]
    count: Option<usize>,

    /// Payload size in bytes [default: 100].
    #[arg(short, long, env = "UARTSTRESS_SIZE")]
    size: Option<usize>,

    /// Base response timeout in milliseconds, added to the transmission time [default: 2000].
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Pause between read attempts in milliseconds [default: 100].
    #[arg(long, value_name = "MS")]
    poll_ms: Option<u64>,

    /// Byte order of the device's checksum [default: little].
    #[arg(long, value_enum)]
    byte_order: Option<ByteOrder>,

    /// Keep writing until the whole payload is accepted.
    #[arg(long)]
    write_all: bool,

    /// Seed the payload generator for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,

    /// Exit with a non-zero status if any iteration fails.
    #[arg(long)]
    strict: bool,

    /// Output the run summary as JSON to stdout.
    #[arg(long)]
    json: bool,
}

/// Checksum byte order accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl From<ByteOrder> for ResponseByteOrder {
    fn from(order: ByteOrder) -> Self {
        match order {
            ByteOrder::Little => ResponseByteOrder::Little,
            ByteOrder::Big => ResponseByteOrder::Big,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "uartstress v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let reporter = Reporter::detect(cli.verbose, cli.quiet);

    match run(&cli, &reporter) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(err) => {
            let code = exit_code(&err);
            if code != EXIT_INTERRUPTED {
                reporter.error(&err);
            }
            ExitCode::from(code)
        },
    }
}

fn run(cli: &Cli, reporter: &Reporter) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => {
            let config = if let Some(ref path) = cli.config_path {
                Config::load_from_path(path)
            } else {
                Config::load()
            };
            commands::run::cmd_run(args, &config, reporter)
        },
        Commands::ListPorts { json } => commands::list_ports::cmd_list_ports(*json, reporter),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Map an error to the process exit status.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => EXIT_USAGE,
            CliError::Cancelled(_) => EXIT_INTERRUPTED,
            CliError::TestsFailed(_) => EXIT_TESTS_FAILED,
        };
    }
    if let Some(lib_err) = err.downcast_ref::<uartstress::Error>() {
        if lib_err.is_open_failure() {
            return EXIT_OPEN_FAILED;
        }
        if matches!(lib_err, uartstress::Error::Config(_)) {
            return EXIT_USAGE;
        }
    }
    EXIT_FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command {
            Commands::Run(args) => args,
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_positional() {
        let args = run_args(parse(&["uartstress", "run", "/dev/ttyUSB0", "115200"]));
        assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(args.baud, Some(115200));
        assert!(!args.strict);
        assert!(!args.json);
    }

    #[test]
    fn test_parse_run_options() {
        let args = run_args(parse(&[
            "uartstress",
            "run",
            "COM3",
            "9600",
            "-n",
            "20",
            "--size",
            "512",
            "--timeout-ms",
            "250",
            "--poll-ms",
            "5",
            "--byte-order",
            "big",
            "--write-all",
            "--seed",
            "42",
            "--strict",
            "--json",
        ]));
        assert_eq!(args.count, Some(20));
        assert_eq!(args.size, Some(512));
        assert_eq!(args.timeout_ms, Some(250));
        assert_eq!(args.poll_ms, Some(5));
        assert_eq!(args.byte_order, Some(ByteOrder::Big));
        assert!(args.write_all);
        assert_eq!(args.seed, Some(42));
        assert!(args.strict);
        assert!(args.json);
    }

    #[test]
    fn test_parse_rejects_non_numeric_baud() {
        let err = Cli::try_parse_from(["uartstress", "run", "ttyS0", "fast"])
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_rejects_unknown_byte_order() {
        assert!(
            Cli::try_parse_from(["uartstress", "run", "ttyS0", "9600", "--byte-order", "middle"])
                .is_err()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["uartstress", "list-ports", "-vv", "--json"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_byte_order_conversion() {
        assert_eq!(
            ResponseByteOrder::from(ByteOrder::Little),
            ResponseByteOrder::Little
        );
        assert_eq!(
            ResponseByteOrder::from(ByteOrder::Big),
            ResponseByteOrder::Big
        );
    }

    #[test]
    fn test_exit_code_mapping() {
        let usage = anyhow::Error::new(CliError::Usage("missing port".into()));
        assert_eq!(exit_code(&usage), EXIT_USAGE);

        let summary = RunSummary::default();
        assert_eq!(
            exit_code(&CliError::Cancelled(summary).into()),
            EXIT_INTERRUPTED
        );
        assert_eq!(
            exit_code(&CliError::TestsFailed(summary).into()),
            EXIT_TESTS_FAILED
        );

        let busy = anyhow::Error::new(uartstress::Error::DeviceBusy("/dev/ttyUSB0".into()));
        assert_eq!(exit_code(&busy), EXIT_OPEN_FAILED);

        let missing = anyhow::Error::new(uartstress::Error::DeviceNotFound("COM9".into()))
            .context("Failed to open COM9");
        assert_eq!(exit_code(&missing), EXIT_OPEN_FAILED);

        let config = anyhow::Error::new(uartstress::Error::Config("baud".into()));
        assert_eq!(exit_code(&config), EXIT_USAGE);

        assert_eq!(exit_code(&anyhow::anyhow!("boom")), EXIT_FAILURE);
    }
}
