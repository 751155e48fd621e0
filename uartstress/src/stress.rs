//! Stress-test engine.
//!
//! Each iteration sends a random payload and waits for the device to answer
//! with the payload's checksum:
//!
//! ```text
//! host                                   device
//!  |  clear()                               |
//!  |  N random bytes in 1..=255  -------->  |
//!  |                                        |  sum the bytes (mod 2^32)
//!  |  <--------  4-byte checksum trailer    |
//!  |  poll one byte at a time until 4 bytes |
//!  |  arrived or the deadline passed        |
//! ```
//!
//! The deadline is a fixed base timeout plus the time the payload needs on the
//! wire at the configured baud rate, so large payloads on slow links are not
//! cut short. Protocol failures are recorded per iteration and never abort a
//! run; only failing to acquire the device does.
//!
//! ## Example
//!
//! ```rust,no_run
//! use uartstress::{NativeTransport, StressConfig, StressTest};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = NativeTransport::with_port("/dev/ttyUSB0", 115200);
//!     let mut test = StressTest::new(transport, StressConfig::new(100, 10))?;
//!
//!     let summary = test.run(&mut |report| {
//!         println!("#{}: {}", report.index, report.outcome);
//!     })?;
//!     println!("{}/{} passed", summary.passed, summary.requested);
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::payload::{Payload, RESPONSE_LEN, ResponseByteOrder};
use crate::transport::Transport;
use log::{debug, info, trace, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Base time allowed for the device to answer, on top of transmission time.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between read attempts while waiting for the checksum.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default payload size in bytes.
pub const DEFAULT_PAYLOAD_SIZE: usize = 100;

/// Default number of iterations.
pub const DEFAULT_ITERATIONS: usize = 3;

/// Bits on the wire per byte with 8-N-1 framing (start + 8 data + stop).
pub const BITS_PER_FRAME: u64 = 10;

/// Time needed to clock `payload_size` bytes out at `baud_rate`, rounded up
/// to the microsecond. A zero baud rate is treated as 1.
pub fn transmission_time(payload_size: usize, baud_rate: u32) -> Duration {
    let bits = payload_size as u128 * u128::from(BITS_PER_FRAME);
    let micros = (bits * 1_000_000).div_ceil(u128::from(baud_rate.max(1)));
    Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
}

/// How the payload is handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum WriteMode {
    /// One write call per iteration. A short write leaves the device with a
    /// truncated payload, which then fails the checksum comparison.
    #[default]
    Single,
    /// Keep writing the remainder until the transport has accepted the whole
    /// payload or stops accepting bytes.
    Complete,
}

/// Stress run parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressConfig {
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Number of iterations to run.
    pub iterations: usize,
    /// Base response timeout.
    pub response_timeout: Duration,
    /// Sleep between read attempts.
    pub poll_interval: Duration,
    /// Byte order of the checksum trailer.
    pub byte_order: ResponseByteOrder,
    /// Write strategy.
    pub write_mode: WriteMode,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            iterations: DEFAULT_ITERATIONS,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            byte_order: ResponseByteOrder::Little,
            write_mode: WriteMode::Single,
        }
    }
}

impl StressConfig {
    /// Create a configuration with default timing.
    pub fn new(payload_size: usize, iterations: usize) -> Self {
        Self {
            payload_size,
            iterations,
            ..Default::default()
        }
    }

    /// Set the base response timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the checksum byte order.
    #[must_use]
    pub fn with_byte_order(mut self, order: ResponseByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Set the write strategy.
    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Time to wait for a response once the payload has been written.
    pub fn response_window(&self, baud_rate: u32) -> Duration {
        self.response_timeout + transmission_time(self.payload_size, baud_rate)
    }
}

/// Why an iteration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "reason", rename_all = "snake_case"))]
pub enum FailReason {
    /// The device did not send exactly [`RESPONSE_LEN`] bytes before the deadline.
    ResponseLengthMismatch {
        /// Expected response length.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },
    /// The device sent a checksum that differs from the payload's.
    ChecksumMismatch {
        /// Checksum computed by the host.
        expected: u32,
        /// Checksum decoded from the response.
        actual: u32,
    },
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResponseLengthMismatch { expected, actual } => write!(
                f,
                "response length mismatch: expected {expected} bytes, got {actual}"
            ),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: expected {expected:#010x}, got {actual:#010x}"
            ),
        }
    }
}

/// Result of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "outcome", rename_all = "snake_case"))]
pub enum Outcome {
    /// The device echoed the correct checksum in time.
    Pass,
    /// The device answered late, short, or wrong.
    Fail(FailReason),
}

impl Outcome {
    /// Whether the iteration passed.
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Failure reason, if any.
    pub fn fail_reason(&self) -> Option<FailReason> {
        match self {
            Self::Pass => None,
            Self::Fail(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail(reason) => write!(f, "FAIL ({reason})"),
        }
    }
}

/// Judge a response against the expected checksum.
pub fn evaluate(response: &[u8], expected: u32, order: ResponseByteOrder) -> Outcome {
    let Ok(trailer) = <[u8; RESPONSE_LEN]>::try_from(response) else {
        return Outcome::Fail(FailReason::ResponseLengthMismatch {
            expected: RESPONSE_LEN,
            actual: response.len(),
        });
    };

    let actual = order.decode(trailer);
    if actual == expected {
        Outcome::Pass
    } else {
        Outcome::Fail(FailReason::ChecksumMismatch { expected, actual })
    }
}

/// Everything known about one finished iteration.
#[derive(Debug, Clone)]
pub struct IterationReport {
    /// 1-based iteration number.
    pub index: usize,
    /// Payload that was sent.
    pub payload: Payload,
    /// Checksum the host expects.
    pub expected_checksum: u32,
    /// Bytes the transport accepted.
    pub bytes_written: usize,
    /// Raw bytes received before the loop ended.
    pub response: Vec<u8>,
    /// Time from clearing the buffers to the end of polling.
    pub elapsed: Duration,
    /// Verdict.
    pub outcome: Outcome,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RunSummary {
    /// Iterations the run was configured for.
    pub requested: usize,
    /// Iterations actually executed.
    pub completed: usize,
    /// Iterations that passed.
    pub passed: usize,
    /// Iterations that failed.
    pub failed: usize,
    /// Whether the stop flag ended the run early.
    pub interrupted: bool,
}

impl RunSummary {
    fn new(requested: usize) -> Self {
        Self {
            requested,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &Outcome) {
        self.completed += 1;
        if outcome.is_pass() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Whether every requested iteration ran and passed.
    pub fn all_passed(&self) -> bool {
        !self.interrupted && self.completed == self.requested && self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} passed", self.passed, self.requested)?;
        if self.interrupted {
            write!(f, " (stopped after {} iterations)", self.completed)?;
        }
        Ok(())
    }
}

/// Called after every read attempt with the number of response bytes so far.
pub type PollObserver = Box<dyn FnMut(usize)>;

/// Drives stress iterations over an exclusively owned transport.
pub struct StressTest<T: Transport> {
    transport: T,
    config: StressConfig,
    rng: StdRng,
    stop: Option<Arc<AtomicBool>>,
    poll_observer: Option<PollObserver>,
}

impl<T: Transport> StressTest<T> {
    /// Create an engine. The transport may be open or closed; [`run`](Self::run)
    /// opens it if needed.
    pub fn new(transport: T, config: StressConfig) -> Result<Self> {
        if transport.baud_rate() == 0 {
            return Err(Error::Config("baud rate must be positive".into()));
        }
        Ok(Self {
            transport,
            config,
            rng: StdRng::from_entropy(),
            stop: None,
            poll_observer: None,
        })
    }

    /// Seed the payload generator for a reproducible run.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Stop the run before the next iteration once `flag` is set.
    ///
    /// The flag is only checked between iterations.
    #[must_use]
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Observe every read attempt of the polling loop.
    #[must_use]
    pub fn with_poll_observer(mut self, observer: impl FnMut(usize) + 'static) -> Self {
        self.poll_observer = Some(Box::new(observer));
        self
    }

    /// Run parameters.
    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume the engine and return the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Acquire the device if it is not held yet.
    pub fn open(&mut self) -> Result<()> {
        if !self.transport.is_open() {
            self.transport.open()?;
        }
        Ok(())
    }

    /// Run all configured iterations, reporting each one to `on_iteration`.
    ///
    /// Fails only if the device cannot be acquired, in which case no iteration
    /// has been attempted.
    pub fn run(&mut self, on_iteration: &mut dyn FnMut(&IterationReport)) -> Result<RunSummary> {
        self.open()?;

        let requested = self.config.iterations;
        info!(
            "Running {requested} iterations of {} bytes on {} at {} baud",
            self.config.payload_size,
            self.transport.port_name(),
            self.transport.baud_rate()
        );

        let mut summary = RunSummary::new(requested);
        for index in 1..=requested {
            if self.stop_requested() {
                warn!("Stopped after {} of {requested} iterations", summary.completed);
                summary.interrupted = true;
                break;
            }
            let report = self.run_iteration(index);
            summary.record(&report.outcome);
            on_iteration(&report);
        }

        info!("Run finished: {summary}");
        Ok(summary)
    }

    /// Run one iteration with a freshly generated payload.
    pub fn run_iteration(&mut self, index: usize) -> IterationReport {
        let payload = Payload::with_rng(self.config.payload_size, &mut self.rng);
        self.run_iteration_with(index, payload)
    }

    /// Run one iteration with the given payload.
    pub fn run_iteration_with(&mut self, index: usize, payload: Payload) -> IterationReport {
        let expected = payload.checksum();
        debug!(
            "Iteration {index}: sending {} bytes, checksum {expected:#010x}",
            payload.len()
        );
        trace!("Payload: {}", payload.to_hex());

        let started = Instant::now();
        self.transport.clear();
        let bytes_written = self.send(payload.as_bytes());

        let window = self
            .config
            .response_window(self.transport.baud_rate());
        let response = self.collect_response(Instant::now() + window);
        let outcome = evaluate(&response, expected, self.config.byte_order);
        debug!("Iteration {index}: {outcome}");

        IterationReport {
            index,
            payload,
            expected_checksum: expected,
            bytes_written,
            response,
            elapsed: started.elapsed(),
            outcome,
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn send(&mut self, data: &[u8]) -> usize {
        let mut written = self.transport.write(data);
        if written >= data.len() {
            return written;
        }

        match self.config.write_mode {
            WriteMode::Single => {
                warn!(
                    "Short write on {}: {written} of {} bytes accepted",
                    self.transport.port_name(),
                    data.len()
                );
            },
            WriteMode::Complete => {
                while written < data.len() {
                    let n = self.transport.write(&data[written..]);
                    if n == 0 {
                        warn!(
                            "Write stalled on {} after {written} of {} bytes",
                            self.transport.port_name(),
                            data.len()
                        );
                        break;
                    }
                    written += n;
                }
            },
        }
        written
    }

    fn collect_response(&mut self, deadline: Instant) -> Vec<u8> {
        let mut response = Vec::with_capacity(RESPONSE_LEN);
        let mut byte = [0u8; 1];

        while response.len() < RESPONSE_LEN && Instant::now() < deadline {
            if self.transport.read(&mut byte) == 1 {
                trace!("Received {:#04x}", byte[0]);
                response.push(byte[0]);
            }
            if let Some(observer) = self.poll_observer.as_mut() {
                observer(response.len());
            }
            thread::sleep(self.config.poll_interval);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crate::transport::mock::{MockHandle, Reply};
    use std::cell::Cell;
    use std::rc::Rc;

    const LE: ResponseByteOrder = ResponseByteOrder::Little;

    fn fast_config(payload_size: usize, iterations: usize) -> StressConfig {
        StressConfig::new(payload_size, iterations)
            .with_response_timeout(Duration::from_millis(40))
            .with_poll_interval(Duration::from_millis(1))
    }

    fn engine(config: StressConfig) -> (StressTest<MockTransport>, MockHandle) {
        let transport = MockTransport::new("MOCK0", 115200);
        let handle = transport.handle();
        let test = StressTest::new(transport, config)
            .unwrap()
            .with_seed(1);
        (test, handle)
    }

    #[test]
    fn test_transmission_time() {
        assert_eq!(transmission_time(0, 9600), Duration::ZERO);
        assert_eq!(transmission_time(100, 9600), Duration::from_micros(104_167));
        assert_eq!(transmission_time(1152, 115200), Duration::from_millis(100));
    }

    #[test]
    fn test_transmission_time_scaling() {
        for baud in [300, 9600, 115200, 3_000_000] {
            let mut previous = Duration::ZERO;
            for size in [1usize, 10, 100, 1000, 10_000] {
                let t = transmission_time(size, baud);
                let doubled = transmission_time(size * 2, baud);
                assert!(doubled >= t);
                assert!(t >= previous);
                // Linear up to the microsecond rounding.
                assert!(doubled.as_micros().abs_diff(2 * t.as_micros()) <= 1);
                previous = t;
            }
        }
        assert!(transmission_time(1000, 9600) > transmission_time(1000, 19200));
    }

    #[test]
    fn test_transmission_time_zero_baud_does_not_panic() {
        assert_eq!(transmission_time(1, 0), Duration::from_secs(10));
    }

    #[test]
    fn test_response_window_grows_with_payload() {
        let small = fast_config(100, 1).response_window(9600);
        let large = fast_config(200, 1).response_window(9600);
        assert!(large >= small);
        assert_eq!(
            small,
            Duration::from_millis(40) + transmission_time(100, 9600)
        );
    }

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate(&[6, 0, 0, 0], 6, LE), Outcome::Pass);
        assert_eq!(
            evaluate(&[6, 0], 6, LE),
            Outcome::Fail(FailReason::ResponseLengthMismatch {
                expected: 4,
                actual: 2
            })
        );
        assert_eq!(
            evaluate(&[6, 0, 0, 0, 0], 6, LE),
            Outcome::Fail(FailReason::ResponseLengthMismatch {
                expected: 4,
                actual: 5
            })
        );
        assert_eq!(
            evaluate(&[0, 0, 0, 6], 6, ResponseByteOrder::Big),
            Outcome::Pass
        );
        assert_eq!(
            evaluate(&[7, 0, 0, 0], 6, LE),
            Outcome::Fail(FailReason::ChecksumMismatch {
                expected: 6,
                actual: 7
            })
        );
    }

    #[test]
    fn test_zero_baud_rejected() {
        let transport = MockTransport::new("MOCK0", 0);
        assert!(matches!(
            StressTest::new(transport, StressConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_exact_checksum_passes() {
        let (mut test, handle) = engine(fast_config(10, 1));
        handle.push_reply(Reply::Checksum(LE));
        test.open().unwrap();

        let report = test.run_iteration(1);
        assert_eq!(report.outcome, Outcome::Pass);
        assert_eq!(report.bytes_written, 10);
        assert_eq!(report.response, LE.encode(report.expected_checksum).to_vec());
        assert_eq!(handle.writes(), vec![report.payload.as_bytes().to_vec()]);
    }

    #[test]
    fn test_partial_response_is_length_mismatch() {
        let (mut test, handle) = engine(fast_config(10, 1));
        handle.push_reply(Reply::Bytes(vec![0x12, 0x34]));
        test.open().unwrap();

        let started = Instant::now();
        let report = test.run_iteration(1);
        assert_eq!(
            report.outcome,
            Outcome::Fail(FailReason::ResponseLengthMismatch {
                expected: 4,
                actual: 2
            })
        );
        assert_eq!(report.response, vec![0x12, 0x34]);
        // The loop only gives up at the deadline.
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_off_by_one_checksum_is_mismatch() {
        let (mut test, handle) = engine(fast_config(10, 1));
        handle.push_reply(Reply::CorruptChecksum(LE, 1));
        test.open().unwrap();

        let report = test.run_iteration(1);
        assert_eq!(
            report.outcome,
            Outcome::Fail(FailReason::ChecksumMismatch {
                expected: report.expected_checksum,
                actual: report
                    .expected_checksum
                    .wrapping_add(1),
            })
        );
    }

    #[test]
    fn test_empty_payload_with_zero_checksum_passes() {
        let (mut test, handle) = engine(fast_config(0, 1));
        handle.push_reply(Reply::Bytes(vec![0, 0, 0, 0]));
        test.open().unwrap();

        let report = test.run_iteration(1);
        assert!(report.payload.is_empty());
        assert_eq!(report.expected_checksum, 0);
        assert_eq!(report.outcome, Outcome::Pass);
    }

    #[test]
    fn test_locked_device_aborts_before_any_iteration() {
        let (mut test, handle) = engine(fast_config(10, 5));
        handle.set_locked(true);

        let mut seen = 0;
        let err = test
            .run(&mut |_| seen += 1)
            .unwrap_err();
        assert!(matches!(err, Error::DeviceBusy(_)));
        assert_eq!(seen, 0);
        assert!(handle.writes().is_empty());
        assert!(!handle.is_open());
        assert!(!test.transport().is_open());
    }

    #[test]
    fn test_failures_do_not_abort_run() {
        let (mut test, handle) = engine(fast_config(16, 5));
        handle.push_reply(Reply::Checksum(LE));
        handle.push_reply(Reply::Silence);
        handle.push_reply(Reply::Checksum(LE));
        handle.push_reply(Reply::CorruptChecksum(LE, 1));
        handle.push_reply(Reply::Checksum(LE));

        let mut outcomes = Vec::new();
        let summary = test
            .run(&mut |report| outcomes.push((report.index, report.outcome)))
            .unwrap();

        assert_eq!(summary.requested, 5);
        assert_eq!(summary.completed, 5);
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 2);
        assert!(!summary.interrupted);
        assert!(!summary.all_passed());
        assert_eq!(summary.to_string(), "3/5 passed");

        let indices: Vec<usize> = outcomes
            .iter()
            .map(|(i, _)| *i)
            .collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
        assert!(outcomes[0].1.is_pass());
        assert!(matches!(
            outcomes[1].1.fail_reason(),
            Some(FailReason::ResponseLengthMismatch { actual: 0, .. })
        ));
        assert!(matches!(
            outcomes[3].1.fail_reason(),
            Some(FailReason::ChecksumMismatch { .. })
        ));
        assert_eq!(handle.writes().len(), 5);
    }

    #[test]
    fn test_echoing_device_passes_every_iteration() {
        let order = ResponseByteOrder::Big;
        let transport = MockTransport::echoing("MOCK0", 9600, order);
        let handle = transport.handle();
        let mut test = StressTest::new(transport, fast_config(48, 4).with_byte_order(order))
            .unwrap()
            .with_seed(3);

        let summary = test
            .run(&mut |report| assert!(report.outcome.is_pass(), "{}", report.outcome))
            .unwrap();
        assert!(summary.all_passed());
        assert_eq!(summary.passed, 4);
        assert_eq!(handle.writes().len(), 4);
    }

    #[test]
    fn test_buffers_cleared_before_every_write() {
        let (mut test, handle) = engine(fast_config(8, 3));
        handle.set_default_reply(Reply::Checksum(LE));
        // Stale bytes from an earlier exchange would otherwise be read first.
        handle.inject_rx(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let summary = test
            .run(&mut |_| {})
            .unwrap();
        assert_eq!(summary.passed, 3);
        assert_eq!(handle.clears(), 3);
    }

    #[test]
    fn test_slow_device_within_deadline_passes() {
        let (mut test, handle) = engine(
            fast_config(10, 1).with_response_timeout(Duration::from_millis(500)),
        );
        handle.set_latency(5);
        handle.push_reply(Reply::Checksum(LE));
        test.open().unwrap();

        assert!(
            test.run_iteration(1)
                .outcome
                .is_pass()
        );
        assert!(handle.reads() >= 6);
    }

    #[test]
    fn test_big_endian_device() {
        let order = ResponseByteOrder::Big;
        let (mut test, handle) = engine(fast_config(32, 1).with_byte_order(order));
        handle.push_reply(Reply::Checksum(order));
        test.open().unwrap();

        assert!(
            test.run_iteration(1)
                .outcome
                .is_pass()
        );
    }

    #[test]
    fn test_single_write_tolerates_short_write() {
        let (mut test, handle) = engine(fast_config(10, 1));
        handle.set_max_write(Some(4));
        handle.push_reply(Reply::Checksum(LE));
        test.open().unwrap();

        let report = test.run_iteration(1);
        assert_eq!(report.bytes_written, 4);
        assert_eq!(handle.writes().len(), 1);
        // The device summed a truncated payload.
        assert!(matches!(
            report.outcome,
            Outcome::Fail(FailReason::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_complete_write_delivers_whole_payload() {
        let (mut test, handle) = engine(fast_config(10, 1).with_write_mode(WriteMode::Complete));
        handle.set_max_write(Some(4));
        handle.push_reply(Reply::Checksum(LE));
        test.open().unwrap();

        let report = test.run_iteration(1);
        assert_eq!(report.bytes_written, 10);
        assert_eq!(handle.writes().len(), 3);
        assert!(report.outcome.is_pass());
    }

    #[test]
    fn test_stop_flag_checked_between_iterations() {
        let stop = Arc::new(AtomicBool::new(false));
        let (test, handle) = engine(fast_config(4, 5));
        let mut test = test.with_stop_flag(Arc::clone(&stop));
        handle.set_default_reply(Reply::Checksum(LE));

        let summary = test
            .run(&mut |report| {
                if report.index == 2 {
                    stop.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.passed, 2);
        assert!(summary.interrupted);
        assert!(!summary.all_passed());
        assert_eq!(handle.writes().len(), 2);
    }

    #[test]
    fn test_poll_observer_sees_progress() {
        let polls = Rc::new(Cell::new(0usize));
        let last = Rc::new(Cell::new(0usize));
        let (test, handle) = engine(fast_config(4, 1));
        let mut test = test.with_poll_observer({
            let polls = Rc::clone(&polls);
            let last = Rc::clone(&last);
            move |received| {
                polls.set(polls.get() + 1);
                last.set(received);
            }
        });
        handle.push_reply(Reply::Checksum(LE));
        test.open().unwrap();

        assert!(
            test.run_iteration(1)
                .outcome
                .is_pass()
        );
        assert_eq!(polls.get(), 4);
        assert_eq!(last.get(), 4);
    }

    #[test]
    fn test_seeded_runs_repeat_payloads() {
        let (mut a, _) = engine(fast_config(64, 1));
        let (mut b, _) = engine(fast_config(64, 1));
        a.open().unwrap();
        b.open().unwrap();
        assert_eq!(a.run_iteration(1).payload, b.run_iteration(1).payload);
    }

    #[test]
    fn test_engine_keeps_transport_open_after_run() {
        let (mut test, handle) = engine(fast_config(4, 1));
        handle.set_default_reply(Reply::Checksum(LE));
        test.run(&mut |_| {})
            .unwrap();
        assert!(handle.is_open());

        drop(test.into_transport());
        assert!(!handle.is_open());
        assert_eq!(handle.closes(), 1);
    }
}
