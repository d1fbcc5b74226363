//! Repeated sweep acquisition with a sample-count consistency gate.
//!
//! An [`AcquisitionSession`] keeps sweeping until it has collected the
//! required number of traces that all share the same length. The first
//! usable trace fixes that length. Later traces of a different length are
//! discarded and the sweep is retried; so are unparseable responses and
//! failed connections.

use crate::error::OsaError;
use crate::logger::Logger;
use crate::osa::SpectrumAnalyzer;
use crate::sink::TraceSink;
use crate::types::{SweepRequest, Trace};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub required_iterations: usize,
    /// Pause after every iteration, whatever its outcome
    pub inter_iteration_delay: Duration,
    /// Abort after this many failed iterations in a row; `None` or `Some(0)`
    /// never gives up
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            required_iterations: 50,
            inter_iteration_delay: Duration::from_millis(100),
            max_consecutive_failures: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Configuring,
    Sweeping,
    Receiving,
    Validating,
    Accepted,
    Discarded,
    Terminal,
}

/// Why a sweep was thrown away
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscardReason {
    MissingSentinel,
    MalformedSample { segment: String },
    Undecodable { detail: String },
    EmptyPayload,
    LengthMismatch { expected: usize, actual: usize },
}

impl DiscardReason {
    fn from_protocol_error(error: &OsaError) -> Option<Self> {
        match error {
            OsaError::MissingSentinel => Some(DiscardReason::MissingSentinel),
            OsaError::MalformedSample(segment) => Some(DiscardReason::MalformedSample {
                segment: segment.clone(),
            }),
            OsaError::Decode(detail) => Some(DiscardReason::Undecodable {
                detail: detail.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IterationOutcome {
    Accepted { iteration: usize, samples: usize },
    Discarded(DiscardReason),
    ConnectionFailed { error: String },
}

impl IterationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IterationOutcome::Accepted { .. })
    }
}

/// One line of the acquisition log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub timestamp: DateTime<Utc>,
    pub attempt: u64,
    pub outcome: IterationOutcome,
    pub target_sample_count: Option<usize>,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub required_iterations: usize,
    pub accepted: usize,
    pub discarded: u64,
    pub connection_failures: u64,
    pub attempts: u64,
    pub target_sample_count: Option<usize>,
    pub elapsed: Duration,
    pub stopped_by_user: bool,
}

impl SessionReport {
    pub fn is_complete(&self) -> bool {
        self.accepted == self.required_iterations
    }
}

pub struct AcquisitionSession<A: SpectrumAnalyzer> {
    analyzer: A,
    request: SweepRequest,
    config: SessionConfig,
    sinks: Vec<Box<dyn TraceSink>>,
    history: Option<Logger<IterationRecord>>,
    shutdown_requested: Option<Arc<AtomicBool>>,

    state: SessionState,
    current_iteration: usize,
    target_sample_count: Option<usize>,
    attempts: u64,
    discarded: u64,
    connection_failures: u64,
    consecutive_failures: u32,
}

impl<A: SpectrumAnalyzer> AcquisitionSession<A> {
    pub fn new(analyzer: A, request: SweepRequest, mut config: SessionConfig) -> Self {
        config.max_consecutive_failures = config.max_consecutive_failures.filter(|&max| max > 0);
        Self {
            analyzer,
            request,
            config,
            sinks: Vec::new(),
            history: None,
            shutdown_requested: None,
            state: SessionState::Idle,
            current_iteration: 0,
            target_sample_count: None,
            attempts: 0,
            discarded: 0,
            connection_failures: 0,
            consecutive_failures: 0,
        }
    }

    /// Add a collaborator that receives every accepted trace
    pub fn with_sink<S: TraceSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Record every iteration outcome to a JSONL log
    pub fn with_history(mut self, history: Logger<IterationRecord>) -> Self {
        self.history = Some(history);
        self
    }

    /// Set shutdown flag for graceful termination between iterations
    pub fn set_shutdown_flag(&mut self, flag: Arc<AtomicBool>) {
        self.shutdown_requested = Some(flag);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_iteration(&self) -> usize {
        self.current_iteration
    }

    pub fn target_sample_count(&self) -> Option<usize> {
        self.target_sample_count
    }

    pub fn is_complete(&self) -> bool {
        self.current_iteration >= self.config.required_iterations
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn acquire(&mut self) -> Result<Trace, OsaError> {
        self.transition(SessionState::Configuring);
        self.analyzer.configure(&self.request)?;

        self.transition(SessionState::Sweeping);
        self.transition(SessionState::Receiving);
        self.analyzer.acquire_trace()
    }

    fn discard(&mut self, reason: DiscardReason) -> IterationOutcome {
        self.transition(SessionState::Discarded);
        match &reason {
            DiscardReason::LengthMismatch { expected, actual } => warn!(
                "Data length mismatch: expected {expected}, got {actual}. Discarding this data."
            ),
            other => warn!("No valid data received ({other:?}). Skipping iteration."),
        }
        self.discarded += 1;
        self.consecutive_failures += 1;
        IterationOutcome::Discarded(reason)
    }

    fn accept(&mut self, trace: Trace) -> Result<IterationOutcome, OsaError> {
        self.transition(SessionState::Accepted);
        let iteration = self.current_iteration + 1;
        for sink in &mut self.sinks {
            sink.handle(&trace, iteration)?;
        }
        self.current_iteration = iteration;
        self.consecutive_failures = 0;
        info!(
            "Accepted iteration {}/{} ({} samples)",
            iteration,
            self.config.required_iterations,
            trace.len()
        );
        Ok(IterationOutcome::Accepted {
            iteration,
            samples: trace.len(),
        })
    }

    /// Consistency gate. A trace with no samples is discarded and never
    /// fixes the target sample count.
    fn validate(&mut self, trace: Trace) -> Result<IterationOutcome, OsaError> {
        self.transition(SessionState::Validating);
        let actual = trace.len();
        if actual == 0 {
            return Ok(self.discard(DiscardReason::EmptyPayload));
        }

        match self.target_sample_count {
            None => {
                info!("Target sample count established: {actual}");
                self.target_sample_count = Some(actual);
                self.accept(trace)
            }
            Some(expected) if expected == actual => self.accept(trace),
            Some(expected) => Ok(self.discard(DiscardReason::LengthMismatch { expected, actual })),
        }
    }

    /// Run a single iteration: one connection, one sweep, one verdict
    pub fn step(&mut self) -> Result<IterationOutcome, OsaError> {
        if self.is_complete() {
            return Err(OsaError::SessionComplete);
        }
        self.attempts += 1;

        let acquired = self.acquire();
        self.analyzer.abort();

        let outcome = match acquired {
            Ok(trace) => self.validate(trace)?,
            Err(e) if e.is_protocol() => {
                self.transition(SessionState::Validating);
                match DiscardReason::from_protocol_error(&e) {
                    Some(reason) => self.discard(reason),
                    None => return Err(e),
                }
            }
            Err(e) if e.is_connection() => {
                warn!("Connection failed on attempt {}: {e}", self.attempts);
                self.connection_failures += 1;
                self.consecutive_failures += 1;
                IterationOutcome::ConnectionFailed {
                    error: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };

        if let Some(history) = self.history.as_mut() {
            history.add(IterationRecord {
                timestamp: Utc::now(),
                attempt: self.attempts,
                outcome: outcome.clone(),
                target_sample_count: self.target_sample_count,
            })?;
        }

        if let Some(max) = self.config.max_consecutive_failures {
            if !outcome.is_accepted() && self.consecutive_failures >= max {
                return Err(OsaError::TooManyFailures(self.consecutive_failures));
            }
        }

        if self.is_complete() {
            self.transition(SessionState::Terminal);
        }
        Ok(outcome)
    }

    fn report(&self, started: Instant, stopped_by_user: bool) -> SessionReport {
        SessionReport {
            required_iterations: self.config.required_iterations,
            accepted: self.current_iteration,
            discarded: self.discarded,
            connection_failures: self.connection_failures,
            attempts: self.attempts,
            target_sample_count: self.target_sample_count,
            elapsed: started.elapsed(),
            stopped_by_user,
        }
    }

    /// Acquire until `required_iterations` consistent traces were accepted.
    ///
    /// Consumes the session; a new run needs a new session.
    pub fn run(mut self) -> Result<SessionReport, OsaError> {
        let started = Instant::now();
        let mut stopped_by_user = false;
        info!(
            "Acquiring {} sweeps of {:.2} to {:.2} nm",
            self.config.required_iterations, self.request.range.start_nm, self.request.range.stop_nm
        );

        while !self.is_complete() {
            if self.is_shutdown_requested() {
                info!("Shutdown requested after {} accepted sweeps", self.current_iteration);
                stopped_by_user = true;
                break;
            }

            if let Err(e) = self.step() {
                error!("Acquisition aborted: {e}");
                return Err(e);
            }

            if !self.config.inter_iteration_delay.is_zero() {
                thread::sleep(self.config.inter_iteration_delay);
            }
        }

        self.transition(SessionState::Terminal);
        if let Some(history) = self.history.as_mut() {
            history.finalize_as_json()?;
        }

        let report = self.report(started, stopped_by_user);
        info!(
            "Session finished: {} accepted, {} discarded, {} connection failures in {:.2} s",
            report.accepted,
            report.discarded,
            report.connection_failures,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }
}
